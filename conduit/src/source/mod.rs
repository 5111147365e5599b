//! Paged data sources.

mod base;
pub mod memory;

pub use base::Reader;
