//! Paged extract, transform and load jobs.

mod base;
mod composite;
mod retry;
mod step;

pub use base::{Job, JobState};
pub use composite::CompositeStep;
pub use retry::{TimeoutRetry, is_timeout};
pub use step::Step;
