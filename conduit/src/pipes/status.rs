use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::bail;
use crate::concurrency::stop::StopSignal;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;

/// Lifecycle state of a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeStatus {
    Created,
    /// Idle between runs, for example a polling pipe sleeping until its next cycle.
    Waiting,
    Working,
    Stopped,
    Errored,
    Finished,
}

impl PipeStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipeStatus::Created,
            1 => PipeStatus::Waiting,
            2 => PipeStatus::Working,
            3 => PipeStatus::Stopped,
            4 => PipeStatus::Errored,
            _ => PipeStatus::Finished,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PipeStatus::Created => 0,
            PipeStatus::Waiting => 1,
            PipeStatus::Working => 2,
            PipeStatus::Stopped => 3,
            PipeStatus::Errored => 4,
            PipeStatus::Finished => 5,
        }
    }
}

impl fmt::Display for PipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipeStatus::Created => "created",
            PipeStatus::Waiting => "waiting",
            PipeStatus::Working => "working",
            PipeStatus::Stopped => "stopped",
            PipeStatus::Errored => "errored",
            PipeStatus::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Combines the statuses of the constituents of a composite pipe.
///
/// Priority is `Errored`, `Working`, `Waiting`, `Stopped`, then `Finished` when every
/// constituent finished and `Created` when none has started. Any other mix, such as some
/// constituents finished while others were never started, is an
/// [`ErrorKind::InvalidStatusChain`] error.
pub fn aggregate_status<I>(statuses: I) -> EtlResult<PipeStatus>
where
    I: IntoIterator<Item = PipeStatus>,
{
    let statuses: Vec<PipeStatus> = statuses.into_iter().collect();
    if statuses.is_empty() {
        return Ok(PipeStatus::Created);
    }

    for candidate in [
        PipeStatus::Errored,
        PipeStatus::Working,
        PipeStatus::Waiting,
        PipeStatus::Stopped,
    ] {
        if statuses.contains(&candidate) {
            return Ok(candidate);
        }
    }

    for uniform in [PipeStatus::Finished, PipeStatus::Created] {
        if statuses.iter().all(|status| *status == uniform) {
            return Ok(uniform);
        }
    }

    let chain = statuses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ");
    bail!(
        ErrorKind::InvalidStatusChain,
        "Pipe statuses cannot be combined",
        chain
    )
}

/// Error yielded by a pipe pulled while its stop flag is raised.
#[track_caller]
pub(crate) fn pipe_stopped() -> EtlError {
    etl_error!(ErrorKind::PipeStopped, "Pipe was stopped")
}

/// Status cell and stop flag owned by a primitive pipe.
///
/// Cloning shares both, which is how the streams and futures handed out by a pipe update
/// the pipe they came from.
#[derive(Debug, Clone, Default)]
pub struct PipeControl {
    status: Arc<AtomicU8>,
    stop: StopSignal,
}

impl PipeControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> PipeStatus {
        PipeStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: PipeStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    /// Records the outcome of a run.
    ///
    /// A [`ErrorKind::PipeStopped`] failure settles to `Stopped` rather than `Errored`.
    pub fn settle<T>(&self, result: &EtlResult<T>) {
        let status = match result {
            Ok(_) => PipeStatus::Finished,
            Err(err) if err.kind() == ErrorKind::PipeStopped => PipeStatus::Stopped,
            Err(_) => PipeStatus::Errored,
        };
        self.set_status(status);
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn resume(&self) {
        self.stop.resume();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipeStatus::*;

    #[test]
    fn errored_wins_over_everything() {
        let status = aggregate_status([Finished, Working, Errored, Created]).unwrap();
        assert_eq!(status, Errored);
    }

    #[test]
    fn priority_order_is_respected() {
        assert_eq!(aggregate_status([Stopped, Working]).unwrap(), Working);
        assert_eq!(aggregate_status([Stopped, Waiting]).unwrap(), Waiting);
        assert_eq!(aggregate_status([Finished, Stopped]).unwrap(), Stopped);
        assert_eq!(aggregate_status([Created, Stopped]).unwrap(), Stopped);
    }

    #[test]
    fn uniform_chains_keep_their_status() {
        assert_eq!(aggregate_status([Finished, Finished]).unwrap(), Finished);
        assert_eq!(aggregate_status([Created, Created]).unwrap(), Created);
    }

    #[test]
    fn mixed_created_and_finished_is_invalid() {
        let err = aggregate_status([Finished, Created]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatusChain);
        assert_eq!(err.detail(), Some("finished -> created"));
    }

    #[test]
    fn control_settles_results() {
        let control = PipeControl::new();
        assert_eq!(control.status(), Created);

        control.settle::<()>(&Err(pipe_stopped()));
        assert_eq!(control.status(), Stopped);

        control.settle(&Ok(()));
        assert_eq!(control.status(), Finished);

        control.settle::<()>(&Err(etl_error!(ErrorKind::SourceError, "boom")));
        assert_eq!(control.status(), Errored);
    }
}
