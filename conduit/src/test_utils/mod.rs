//! Collaborators and reporters for exercising pipes, trackers and jobs in tests.
//!
//! - [`reporter`] records tracker notifications for later assertions.
//! - [`source`] and [`destination`] provide readers and writers that time out, sleep or
//!   signal progress.
//! - [`notify`] waits for those signals without hanging a failing test.

pub mod destination;
pub mod notify;
pub mod reporter;
pub mod source;
