use tracing::{error, info};

use crate::error::EtlError;

/// Receives start and finish notifications of wholes or pieces.
pub trait StateReporter: Send + Sync {
    fn report_start(&self, message: &str, percent: f64, errored: bool);

    fn report_finish(&self, message: &str, percent: f64, errored: bool);
}

/// Receives errors reported on a tracker.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &EtlError, description: &str);
}

/// Reporter emitting every notification as a `tracing` event.
///
/// Thread ids, timestamps and output format come from the installed subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl StateReporter for TracingReporter {
    fn report_start(&self, message: &str, percent: f64, errored: bool) {
        info!(message, percent, errored, "progress started");
    }

    fn report_finish(&self, message: &str, percent: f64, errored: bool) {
        if errored {
            error!(message, percent, "progress finished with errors");
        } else {
            info!(message, percent, "progress finished");
        }
    }
}

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &EtlError, description: &str) {
        error!(
            description,
            kind = ?error.kind(),
            error = %error,
            "error reported"
        );
    }
}
