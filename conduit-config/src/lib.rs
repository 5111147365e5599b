//! Configuration management for conduit applications.
//!
//! Provides environment detection, layered configuration loading from YAML/JSON files
//! and environment variables, and the shared configuration types consumed by jobs and
//! trackers.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
