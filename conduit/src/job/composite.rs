use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::{EtlError, EtlResult};
use crate::job::base::{Job, JobState, JobStateCell};
use crate::tracker::Tracker;

/// Runs child jobs one after another.
///
/// The composite's tracker reports the mean progress of the children's trackers and
/// receives their piece notifications. The first failing child stops the run.
pub struct CompositeStep {
    name: String,
    steps: Vec<Arc<dyn Job>>,
    tracker: Tracker,
    state: JobStateCell,
}

impl CompositeStep {
    pub fn new(name: impl Into<String>, steps: Vec<Arc<dyn Job>>) -> Self {
        Self {
            name: name.into(),
            steps,
            tracker: Tracker::default(),
            state: JobStateCell::new(),
        }
    }

    pub fn with_tracker(mut self, tracker: Tracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn steps(&self) -> &[Arc<dyn Job>] {
        &self.steps
    }
}

#[async_trait]
impl Job for CompositeStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    fn state(&self) -> JobState {
        self.state.get()
    }

    async fn process(&self) -> EtlResult<()> {
        self.state.set(JobState::Initializing);
        let children = self
            .steps
            .iter()
            .map(|step| step.tracker().clone())
            .collect();
        let whole = self.tracker.whole_of(children, self.name.clone());

        self.state.set(JobState::Processing);
        for step in &self.steps {
            info!(composite = %self.name, step = step.name(), "starting step");

            if let Err(err) = step.process().await {
                error!(composite = %self.name, step = step.name(), error = %err, "step failed");
                self.state.set(JobState::Errored);
                self.tracker
                    .error(&err, format!("{} failed at step {}", self.name, step.name()));
                whole.finish().await;

                return Err(err);
            }
        }

        whole.finish().await;
        self.state.set(JobState::Finished);

        Ok(())
    }

    async fn close(&self) -> EtlResult<()> {
        let mut errors: Vec<EtlError> = Vec::new();
        for step in &self.steps {
            if let Err(err) = step.close().await {
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}
