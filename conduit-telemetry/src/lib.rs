//! Tracing initialization shared by conduit binaries and tests.

pub mod tracing;
