//! Paged data movement.
//!
//! Two ways of moving data from a [`source::Reader`] through [`mapper::Mapper`]s into a
//! [`destination::Writer`] are offered:
//!
//! - [`pipes`]: composable, restartable and stoppable stream stages, with threaded,
//!   read-ahead and polling adapters.
//! - [`job`]: a paged job processing pages in parallel with a timeout retry policy.
//!
//! Both report progress through a hierarchical [`tracker::Tracker`].

pub mod concurrency;
pub mod config;
pub mod destination;
pub mod error;
pub mod job;
mod macros;
pub mod mapper;
pub mod pipes;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tracker;
