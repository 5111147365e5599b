use std::error::Error;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::config::RetryLimits;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;

/// Returns whether `error` signals a timeout.
///
/// Either the error, or one of the errors it aggregates, has kind [`ErrorKind::Timeout`],
/// or a description, detail or source message mentions "timeout" in any letter case.
pub fn is_timeout(error: &EtlError) -> bool {
    if error.kinds().contains(&ErrorKind::Timeout) {
        return true;
    }

    let errors = error.errors();
    if !std::ptr::eq(errors.as_ptr(), error) {
        return errors.iter().any(is_timeout);
    }

    if error.description().is_some_and(mentions_timeout)
        || error.detail().is_some_and(mentions_timeout)
    {
        return true;
    }

    let mut source = error.source();
    while let Some(cause) = source {
        if mentions_timeout(&cause.to_string()) {
            return true;
        }
        source = cause.source();
    }

    false
}

fn mentions_timeout(text: &str) -> bool {
    text.to_ascii_lowercase().contains("timeout")
}

/// Retries operations that time out, within a job-wide and a per-operation budget.
///
/// Every timeout, whichever operation hit it, counts against the job-wide budget. Errors
/// that are not timeouts are returned on first occurrence.
#[derive(Debug)]
pub struct TimeoutRetry {
    limits: RetryLimits,
    timeouts: AtomicU64,
}

impl TimeoutRetry {
    pub fn new(limits: RetryLimits) -> Self {
        Self {
            limits,
            timeouts: AtomicU64::new(0),
        }
    }

    /// Timeouts observed so far across every operation.
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::SeqCst)
    }

    /// Runs `attempt` until it succeeds, fails with a non-timeout error or a budget runs
    /// out.
    ///
    /// Each attempt is bounded by [`RetryLimits::attempt_timeout`] when set.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> EtlResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EtlResult<T>>,
    {
        let mut attempts: u64 = 0;

        loop {
            let result = match self.limits.attempt_timeout {
                Some(deadline) => match tokio::time::timeout(deadline, attempt()).await {
                    Ok(result) => result,
                    Err(elapsed) => Err(etl_error!(
                        ErrorKind::Timeout,
                        "Operation exceeded its deadline",
                        format!("{operation} did not complete within {deadline:?}"),
                        source: elapsed
                    )),
                },
                None => attempt().await,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) if is_timeout(&err) => err,
                Err(err) => return Err(err),
            };

            let total = self.timeouts.fetch_add(1, Ordering::SeqCst) + 1;
            attempts += 1;

            if self.limits.total.is_some_and(|limit| total >= limit) {
                warn!(operation, total, "job timeout budget exhausted");
                return Err(err);
            }

            if self.limits.per_operation.is_some_and(|limit| attempts >= limit) {
                warn!(operation, attempts, "operation timeout budget exhausted");
                return Err(err);
            }

            warn!(operation, attempts, total, error = %err, "operation timed out, retrying");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    fn limits(total: Option<u64>, per_operation: Option<u64>) -> RetryLimits {
        RetryLimits {
            total,
            per_operation,
            attempt_timeout: None,
        }
    }

    #[test]
    fn classifies_timeouts() {
        assert!(is_timeout(&etl_error!(ErrorKind::Timeout, "Deadline")));
        assert!(is_timeout(&etl_error!(
            ErrorKind::SourceError,
            "Read failed",
            "Connection Timeout"
        )));
        assert!(is_timeout(
            &etl_error!(ErrorKind::SourceError, "Read failed")
                .with_source(io::Error::other("socket TIMEOUT"))
        ));
        assert!(!is_timeout(&etl_error!(ErrorKind::SourceError, "Read failed")));

        let aggregate = EtlError::from(vec![
            etl_error!(ErrorKind::DestinationError, "Write failed"),
            etl_error!(ErrorKind::SourceError, "Read failed", "query timeout"),
        ]);
        assert!(is_timeout(&aggregate));
    }

    async fn flaky(calls: &AtomicUsize, failures: usize) -> EtlResult<usize> {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        if call < failures {
            Err(etl_error!(ErrorKind::SourceError, "Read failed", "Connection Timeout"))
        } else {
            Ok(call)
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let retry = TimeoutRetry::new(limits(None, Some(3)));
        let calls = AtomicUsize::new(0);

        let value = retry.run("read", || flaky(&calls, 2)).await.unwrap();
        assert_eq!(value, 2);
        assert_eq!(retry.timeouts(), 2);
    }

    #[tokio::test]
    async fn per_operation_budget_stops_retries() {
        let retry = TimeoutRetry::new(limits(None, Some(2)));
        let calls = AtomicUsize::new(0);

        let err = retry.run("read", || flaky(&calls, 2)).await.unwrap_err();
        assert!(is_timeout(&err));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn job_budget_is_shared() {
        let retry = TimeoutRetry::new(limits(Some(3), None));
        let first = AtomicUsize::new(0);
        let second = AtomicUsize::new(0);

        retry.run("first", || flaky(&first, 2)).await.unwrap();
        let err = retry.run("second", || flaky(&second, 5)).await.unwrap_err();
        assert!(is_timeout(&err));
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let retry = TimeoutRetry::new(limits(None, None));
        let calls = AtomicUsize::new(0);

        let err = retry
            .run("write", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(etl_error!(ErrorKind::DestinationError, "Write failed"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_into_timeout() {
        let retry = TimeoutRetry::new(RetryLimits {
            total: None,
            per_operation: Some(1),
            attempt_timeout: Some(Duration::from_millis(100)),
        });

        let err = retry
            .run("size", || async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
