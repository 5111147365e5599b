use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;

use crate::error::EtlResult;
use crate::tracker::Tracker;

/// Lifecycle of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum JobState {
    Created = 0,
    Initializing = 1,
    Processing = 2,
    Finished = 3,
    Errored = 4,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => JobState::Initializing,
            2 => JobState::Processing,
            3 => JobState::Finished,
            4 => JobState::Errored,
            _ => JobState::Created,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Created => "created",
            JobState::Initializing => "initializing",
            JobState::Processing => "processing",
            JobState::Finished => "finished",
            JobState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Atomic [`JobState`] cell.
#[derive(Debug)]
pub(crate) struct JobStateCell(AtomicU8);

impl JobStateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(JobState::Created as u8))
    }

    pub(crate) fn get(&self) -> JobState {
        JobState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: JobState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Schedulable unit of ETL work.
///
/// Failures of [`Job::process`] are reported to the job's tracker before being returned.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    fn tracker(&self) -> &Tracker;

    fn state(&self) -> JobState;

    /// Validates the job and moves all of its data.
    async fn process(&self) -> EtlResult<()>;

    /// Releases the job's collaborators.
    async fn close(&self) -> EtlResult<()>;
}
