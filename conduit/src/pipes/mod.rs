//! Composable streaming stages.
//!
//! A pipe plays one of four roles: a [`Producer`] emits a stream, a [`Transformer`] turns
//! one stream into another, a [`Consumer`] drains a stream and a [`Closed`] pipe is a
//! producer already wired to a consumer. Pipes are joined with [`Then::then`], wrapped by
//! the [`fanout`] adapters to run on background tasks, and re-run on a schedule by
//! [`poll::PollingProducer`].
//!
//! Every primitive pipe tracks a [`PipeStatus`] and a sticky stop flag; composites derive
//! their status from their flat list of constituents.

mod base;
pub mod compose;
pub mod fanout;
pub mod lambda;
pub mod map;
pub mod poll;
pub mod read;
mod status;
mod stream;
pub mod write;

pub use base::{Closed, Consumer, Pipe, PipeStream, Producer, Transformer};
pub use compose::Then;
pub use status::{PipeControl, PipeStatus, aggregate_status};
pub use stream::TrackedStream;
