//! Concurrency primitives shared by pipes and jobs.
//!
//! [`stop`] holds the cooperative stop flag every pipe carries. [`cadence`] computes the
//! sleep between runs of the polling adapter.

pub mod cadence;
pub mod stop;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// Guarded state in this crate is always left consistent between statements, so a
/// poisoned lock carries no torn data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
