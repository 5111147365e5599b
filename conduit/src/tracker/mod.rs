//! Hierarchical progress tracking.

mod base;
mod dispatch;
mod reporter;

pub use base::{PieceScope, Tracker, WholeScope};
pub use reporter::{ErrorReporter, StateReporter, TracingReporter};
