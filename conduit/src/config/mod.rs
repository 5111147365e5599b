//! Configuration used by pipes and jobs.
//!
//! Re-exports the shared configuration types and converts the raw [`Setting`] limits into
//! the typed values the core works with.

mod limits;

pub use conduit_config::shared::*;
pub use limits::{PageSize, Parallelism, RetryLimits};
