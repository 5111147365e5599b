use std::sync::Mutex;

use crate::concurrency::lock;
use crate::error::{ErrorKind, EtlError};
use crate::tracker::{ErrorReporter, StateReporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Finish,
}

/// One notification received by a [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEvent {
    pub phase: Phase,
    pub message: String,
    pub percent: f64,
    pub errored: bool,
}

/// State reporter keeping every notification in arrival order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        lock(&self.events).clone()
    }

    /// Percents of the finish notifications, in arrival order.
    pub fn finish_percents(&self) -> Vec<f64> {
        lock(&self.events)
            .iter()
            .filter(|event| event.phase == Phase::Finish)
            .map(|event| event.percent)
            .collect()
    }

    fn record(&self, phase: Phase, message: &str, percent: f64, errored: bool) {
        lock(&self.events).push(ReportEvent {
            phase,
            message: message.to_owned(),
            percent,
            errored,
        });
    }
}

impl StateReporter for RecordingReporter {
    fn report_start(&self, message: &str, percent: f64, errored: bool) {
        self.record(Phase::Start, message, percent, errored);
    }

    fn report_finish(&self, message: &str, percent: f64, errored: bool) {
        self.record(Phase::Finish, message, percent, errored);
    }
}

/// Error reporter keeping every reported error with its description.
#[derive(Debug, Default)]
pub struct RecordingErrorReporter {
    errors: Mutex<Vec<(EtlError, String)>>,
}

impl RecordingErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        lock(&self.errors).iter().map(|(err, _)| err.kind()).collect()
    }

    pub fn descriptions(&self) -> Vec<String> {
        lock(&self.errors)
            .iter()
            .map(|(_, description)| description.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.errors).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorReporter for RecordingErrorReporter {
    fn report(&self, error: &EtlError, description: &str) {
        lock(&self.errors).push((error.clone(), description.to_owned()));
    }
}
