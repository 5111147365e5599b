//! Destinations receiving the output of jobs and write pipes.

mod base;
pub mod memory;

pub use base::Writer;
