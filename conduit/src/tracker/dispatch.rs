use std::future::poll_fn;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::concurrency::lock;

/// Deferred reporter invocation.
pub(crate) type Report = Box<dyn FnOnce() + Send>;

type Queue = Arc<Mutex<mpsc::UnboundedReceiver<Report>>>;

/// Single background consumer running reports in the order they were queued.
///
/// A report runs while the queue lock is held, so whoever drains the queue next, the
/// worker or [`Dispatcher::drain_blocking`], starts after it.
pub(crate) struct Dispatcher {
    tx: mpsc::UnboundedSender<Report>,
    queue: Queue,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawns the consumer on the current runtime, or returns `None` outside of one.
    pub(crate) fn spawn() -> Option<Self> {
        let Ok(handle) = Handle::try_current() else {
            warn!("no tokio runtime available, reporting inline");
            return None;
        };

        let (tx, rx) = mpsc::unbounded_channel::<Report>();
        let queue: Queue = Arc::new(Mutex::new(rx));
        let worker = handle.spawn(run_reports(queue.clone()));

        Some(Self { tx, queue, worker })
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<Report> {
        self.tx.clone()
    }

    /// Closes the queue and waits until every queued report ran.
    pub(crate) async fn drain(self) {
        let Self { tx, queue, worker } = self;
        drop(tx);
        drop(queue);

        if let Err(err) = worker.await {
            warn!(error = %err, "tracker report worker failed");
        }
    }

    /// Closes the queue and runs the reports still in it on the calling thread.
    ///
    /// Returns once the report the worker may be running has completed and the queue is
    /// empty; the worker then exits on its next poll.
    pub(crate) fn drain_blocking(self) {
        let Self { tx, queue, worker } = self;
        drop(tx);

        let mut rx = lock(&queue);
        let mut inline = 0usize;
        while let Ok(report) = rx.try_recv() {
            report();
            inline += 1;
        }
        drop(rx);

        if inline > 0 {
            debug!(inline, "ran queued tracker reports on scope exit");
        }
        drop(worker);
    }
}

async fn run_reports(queue: Queue) {
    while poll_fn(|cx| run_next(&queue, cx)).await {}
}

/// Runs the next queued report, resolving to `false` once the queue is closed and empty.
fn run_next(queue: &Queue, cx: &mut Context<'_>) -> Poll<bool> {
    let mut rx = lock(queue);
    match rx.poll_recv(cx) {
        Poll::Ready(Some(report)) => {
            report();
            Poll::Ready(true)
        }
        Poll::Ready(None) => Poll::Ready(false),
        Poll::Pending => Poll::Pending,
    }
}
