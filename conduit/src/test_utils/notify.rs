use std::time::Duration;
use std::{fmt, sync::Arc};

use tokio::sync::Notify;
use tokio::time::timeout;

/// Default time a test waits for a notification.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// [`Notify`] whose waits panic after a deadline instead of hanging the test.
#[derive(Clone)]
pub struct TimedNotify {
    notify: Arc<Notify>,
    timeout_duration: Duration,
}

impl TimedNotify {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_NOTIFY_TIMEOUT)
    }

    pub fn with_timeout(timeout_duration: Duration) -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            timeout_duration,
        }
    }

    /// Wakes the current waiter, or the next one if nobody waits yet.
    pub fn notify(&self) {
        self.notify.notify_one();
    }

    /// Waits for a notification.
    ///
    /// # Panics
    ///
    /// Panics when no notification arrives within the timeout.
    pub async fn notified(&self) {
        if timeout(self.timeout_duration, self.notify.notified())
            .await
            .is_err()
        {
            panic!(
                "notification not received within {:?}, the awaited state was never reached",
                self.timeout_duration
            );
        }
    }
}

impl Default for TimedNotify {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimedNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedNotify")
            .field("timeout_duration", &self.timeout_duration)
            .finish()
    }
}
