use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tracing::{debug, info};

use crate::concurrency::cadence::Cadence;
use crate::error::EtlResult;
use crate::pipes::base::{Pipe, PipeStream, Producer};
use crate::pipes::status::{PipeControl, PipeStatus, pipe_stopped};
use crate::pipes::stream::TrackedStream;

/// Producer re-running another producer forever on a [`Cadence`].
///
/// The wrapped producer runs immediately, then again after every sleep. The status is
/// [`PipeStatus::Waiting`] while sleeping. Stopping interrupts the sleep and ends the
/// stream with a stopped error. A failed run ends the stream with that failure.
pub struct PollingProducer<P> {
    inner: Arc<dyn Producer<P>>,
    cadence: Cadence,
    control: PipeControl,
}

impl<P> PollingProducer<P>
where
    P: Send + 'static,
{
    pub fn new(inner: Arc<dyn Producer<P>>, cadence: Cadence) -> Self {
        Self {
            inner,
            cadence,
            control: PipeControl::new(),
        }
    }
}

#[async_trait]
impl<P> Pipe for PollingProducer<P>
where
    P: Send + 'static,
{
    fn status(&self) -> EtlResult<PipeStatus> {
        Ok(self.control.status())
    }

    fn stop(&self) {
        self.control.stop();
        self.inner.stop();
    }

    fn resume(&self) {
        self.control.resume();
        self.inner.resume();
    }

    async fn close(&self) -> EtlResult<()> {
        self.inner.close().await
    }
}

impl<P> Producer<P> for PollingProducer<P>
where
    P: Send + 'static,
{
    fn produces(&self) -> PipeStream<P> {
        let inner = self.inner.clone();
        let cadence = self.cadence;
        let control = self.control.clone();

        let cycles = stream::unfold(0u64, move |cycle| {
            let inner = inner.clone();
            let control = control.clone();

            async move {
                if cycle > 0 {
                    let delay = cadence.delay_from_now();
                    debug!(cycle, ?delay, "polling producer sleeping until next cycle");
                    control.set_status(PipeStatus::Waiting);

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = control.stop_signal().stopped() => {
                            let stopped: PipeStream<P> = stream::iter([Err(pipe_stopped())]).boxed();
                            return Some((stopped, cycle + 1));
                        }
                    }

                    control.set_status(PipeStatus::Working);
                }

                info!(cycle, "polling producer starting run");
                Some((inner.produces(), cycle + 1))
            }
        });

        TrackedStream::new(cycles.flatten(), self.control.clone()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::pipes::lambda::LambdaProducer;

    fn counting_producer(runs: Arc<AtomicUsize>) -> Arc<dyn Producer<usize>> {
        Arc::new(LambdaProducer::new(move || {
            let run = runs.fetch_add(1, Ordering::SeqCst);
            stream::iter([Ok(run)]).boxed()
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn reruns_after_each_cycle() {
        let runs = Arc::new(AtomicUsize::new(0));
        let polling = PollingProducer::new(
            counting_producer(runs.clone()),
            Cadence::every(Duration::from_secs(60)).unwrap(),
        );

        let values: Vec<usize> = polling
            .produces()
            .take(3)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(values, vec![0, 1, 2]);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_runs_and_stops_while_sleeping() {
        let runs = Arc::new(AtomicUsize::new(0));
        let polling = Arc::new(PollingProducer::new(
            counting_producer(runs.clone()),
            Cadence::every(Duration::from_secs(3600)).unwrap(),
        ));

        let mut stream = polling.produces();
        assert_eq!(stream.next().await.unwrap().unwrap(), 0);

        let next = tokio::spawn(async move { stream.next().await });
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(polling.status().unwrap(), PipeStatus::Waiting);

        polling.stop();
        let err = next.await.unwrap().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PipeStopped);
        assert_eq!(polling.status().unwrap(), PipeStatus::Stopped);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
