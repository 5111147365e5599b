//! Shared configuration types for conduit jobs and trackers.

mod base;
mod job;
mod setting;
mod tracker;

pub use base::ValidationError;
pub use job::JobConfig;
pub use setting::Setting;
pub use tracker::TrackerConfig;
