//! Adapters running pipes on background tasks.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::Fuse;
use futures::{FutureExt, StreamExt, stream};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

use crate::concurrency::lock;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::pipes::base::{Closed, Pipe, PipeStream, Transformer};
use crate::pipes::status::{PipeControl, PipeStatus};
use crate::pipes::stream::TrackedStream;

fn worker_panic(err: JoinError) -> EtlError {
    etl_error!(
        ErrorKind::WorkerPanic,
        "Pipe worker panicked",
        err.to_string()
    )
}

/// One fan-out run: the queue every reader drains and whether its workers are done.
///
/// Only readers hold the run strongly. Once the last one is dropped the queue closes and
/// the workers stop pulling from the upstream.
struct FanOutRun<P> {
    queue: tokio::sync::Mutex<mpsc::UnboundedReceiver<EtlResult<P>>>,
    complete: AtomicBool,
}

impl<P> FanOutRun<P>
where
    P: Send + 'static,
{
    fn drain(self: Arc<Self>) -> PipeStream<P> {
        stream::unfold(self, |run| async move {
            let next = run.queue.lock().await.recv().await;
            next.map(|item| (item, run))
        })
        .boxed()
    }
}

struct FanOutShared<C, P> {
    inner: Arc<dyn Transformer<C, P>>,
    workers: NonZeroUsize,
    control: PipeControl,
    current: Mutex<Weak<FanOutRun<P>>>,
}

impl<C, P> FanOutShared<C, P>
where
    C: Send + 'static,
    P: Send + 'static,
{
    /// Returns the in-flight run, starting one over `upstream` when there is none.
    fn join_or_start(self: &Arc<Self>, upstream: PipeStream<C>) -> Arc<FanOutRun<P>> {
        let mut current = lock(&self.current);
        if let Some(run) = current.upgrade()
            && !run.complete.load(Ordering::Acquire)
        {
            debug!("joining in-flight fan-out run");
            return run;
        }

        let run = self.start(upstream);
        *current = Arc::downgrade(&run);
        run
    }

    fn start(self: &Arc<Self>, upstream: PipeStream<C>) -> Arc<FanOutRun<P>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let run = Arc::new(FanOutRun {
            queue: tokio::sync::Mutex::new(rx),
            complete: AtomicBool::new(false),
        });

        let upstream = Arc::new(tokio::sync::Mutex::new(upstream.fuse()));
        let mut join_set = JoinSet::new();
        for worker_id in 0..self.workers.get() {
            let mut output = self.inner.transform(share(upstream.clone()));
            let tx = tx.clone();
            let control = self.control.clone();

            join_set.spawn(async move {
                loop {
                    let item = tokio::select! {
                        item = output.next() => item,
                        () = tx.closed() => break,
                    };
                    let Some(item) = item else {
                        break;
                    };

                    let failed = item.is_err();
                    // A raised stop flag keeps the adapter `Stopped`.
                    if failed && !control.is_stopped() {
                        control.settle(&item);
                    }
                    if tx.send(item).is_err() || failed {
                        break;
                    }
                }
                debug!(worker_id, "fan-out worker finished");
            });
        }

        let supervisor_run = Arc::downgrade(&run);
        let control = self.control.clone();
        tokio::spawn(async move {
            while let Some(result) = join_set.join_next().await {
                if let Err(err) = result {
                    error!(error = %err, "fan-out worker panicked");
                    if !control.is_stopped() {
                        control.set_status(PipeStatus::Errored);
                    }
                    let _ = tx.send(Err(worker_panic(err)));
                }
            }
            if let Some(run) = supervisor_run.upgrade() {
                run.complete.store(true, Ordering::Release);
            }
            // Dropping the last sender closes the queue for every reader.
            drop(tx);
        });

        run
    }
}

/// Exposes a stream shared between workers; each pull takes the next upstream element.
fn share<C>(upstream: Arc<tokio::sync::Mutex<Fuse<PipeStream<C>>>>) -> PipeStream<C>
where
    C: Send + 'static,
{
    stream::unfold(upstream, |upstream| async move {
        let next = upstream.lock().await.next().await;
        next.map(|item| (item, upstream))
    })
    .boxed()
}

/// Runs a transformer on a pool of background workers.
///
/// The first pull with no run in flight spawns `workers` tasks. Each applies the wrapped
/// transformer to the shared upstream and pushes results into one unbounded queue, so
/// output order across workers is not preserved. `transform` calls made while that run is
/// in flight read the same queue and their own upstream is ignored. Once every worker
/// finished the queue closes, and the next call starts a fresh run.
///
/// A worker failure marks the adapter [`PipeStatus::Errored`] and is delivered through the
/// queue; the other workers keep running. After [`Pipe::stop`] the adapter stays
/// [`PipeStatus::Stopped`] while its workers wind down. Dropping every reader of a run
/// ends its workers.
pub struct ThreadedTransformer<C, P> {
    shared: Arc<FanOutShared<C, P>>,
}

impl<C, P> ThreadedTransformer<C, P>
where
    C: Send + 'static,
    P: Send + 'static,
{
    pub fn new(inner: Arc<dyn Transformer<C, P>>, workers: NonZeroUsize) -> Self {
        Self {
            shared: Arc::new(FanOutShared {
                inner,
                workers,
                control: PipeControl::new(),
                current: Mutex::new(Weak::new()),
            }),
        }
    }
}

#[async_trait]
impl<C, P> Pipe for ThreadedTransformer<C, P>
where
    C: Send + 'static,
    P: Send + 'static,
{
    fn status(&self) -> EtlResult<PipeStatus> {
        Ok(self.shared.control.status())
    }

    fn stop(&self) {
        self.shared.control.stop();
        self.shared.inner.stop();
    }

    fn resume(&self) {
        self.shared.control.resume();
        self.shared.inner.resume();
    }

    async fn close(&self) -> EtlResult<()> {
        self.shared.inner.close().await
    }
}

impl<C, P> Transformer<C, P> for ThreadedTransformer<C, P>
where
    C: Send + 'static,
    P: Send + 'static,
{
    fn transform(&self, consumes: PipeStream<C>) -> PipeStream<P> {
        let shared = self.shared.clone();
        let output = stream::once(async move { shared.join_or_start(consumes) })
            .flat_map(FanOutRun::drain)
            .boxed();

        TrackedStream::new(output, self.shared.control.clone()).boxed()
    }
}

/// Runs a transformer on a single background worker that reads ahead of the consumer.
pub struct AsyncTransformer<C, P>(ThreadedTransformer<C, P>);

impl<C, P> AsyncTransformer<C, P>
where
    C: Send + 'static,
    P: Send + 'static,
{
    pub fn new(inner: Arc<dyn Transformer<C, P>>) -> Self {
        Self(ThreadedTransformer::new(inner, NonZeroUsize::MIN))
    }
}

#[async_trait]
impl<C, P> Pipe for AsyncTransformer<C, P>
where
    C: Send + 'static,
    P: Send + 'static,
{
    fn status(&self) -> EtlResult<PipeStatus> {
        self.0.status()
    }

    fn stop(&self) {
        self.0.stop();
    }

    fn resume(&self) {
        self.0.resume();
    }

    async fn close(&self) -> EtlResult<()> {
        self.0.close().await
    }
}

impl<C, P> Transformer<C, P> for AsyncTransformer<C, P>
where
    C: Send + 'static,
    P: Send + 'static,
{
    fn transform(&self, consumes: PipeStream<C>) -> PipeStream<P> {
        self.0.transform(consumes)
    }
}

/// Starts several copies of a closed pipe at once and waits for all of them.
///
/// Every copy is wired before any of them is polled, so producers that hand out work
/// from a shared cursor (such as [`crate::pipes::read::ReadPipe`]) split it between the
/// copies. Failures from all copies are aggregated.
pub struct ThreadedClosed {
    inner: Arc<dyn Closed>,
    copies: NonZeroUsize,
    control: PipeControl,
}

impl ThreadedClosed {
    pub fn new(inner: Arc<dyn Closed>, copies: NonZeroUsize) -> Self {
        Self {
            inner,
            copies,
            control: PipeControl::new(),
        }
    }
}

#[async_trait]
impl Pipe for ThreadedClosed {
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

impl Closed for ThreadedClosed {
    fn start(&self) -> BoxFuture<'static, EtlResult<()>> {
        let runs: Vec<_> = (0..self.copies.get())
            .map(|_| self.inner.start())
            .collect();
        let control = self.control.clone();

        async move {
            control.set_status(PipeStatus::Working);

            let mut join_set = JoinSet::new();
            for run in runs {
                join_set.spawn(run);
            }

            let mut errors = Vec::new();
            while let Some(result) = join_set.join_next().await {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => errors.push(err),
                    Err(err) => errors.push(worker_panic(err)),
                }
            }

            let result = if errors.is_empty() {
                Ok(())
            } else {
                Err(EtlError::from(errors))
            };
            control.settle(&result);
            result
        }
        .boxed()
    }
}
