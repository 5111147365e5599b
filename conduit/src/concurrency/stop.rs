//! Cooperative stop signal shared by a pipe and every stream it hands out.
//!
//! The flag is sticky: once raised it stays raised until [`StopSignal::resume`] is called,
//! so a pipe restarted while stopped fails immediately instead of running again.

use tokio::sync::watch;

/// Raise/lower handle over a `watch` channel holding the stop flag.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Sender<bool>);

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self(tx)
    }

    /// Raises the flag. Succeeds even when nobody is subscribed.
    pub fn stop(&self) {
        self.0.send_replace(true);
    }

    /// Lowers the flag so the owner can run again.
    pub fn resume(&self) {
        self.0.send_replace(false);
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the flag is raised, immediately if it already is.
    pub async fn stopped(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
