use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tracing::warn;

use crate::concurrency::lock;
use crate::config::TrackerConfig;
use crate::error::EtlError;
use crate::tracker::dispatch::{Dispatcher, Report};
use crate::tracker::reporter::{ErrorReporter, StateReporter};

/// Upward link a child tracker uses to tell its parent about piece progress.
pub(crate) trait ProgressParent: Send + Sync {
    fn notify_piece_start(&self, message: &str);

    fn notify_piece_finish(&self, message: &str);
}

#[derive(Default)]
struct Reporters {
    whole: Vec<Arc<dyn StateReporter>>,
    piece: Vec<Arc<dyn StateReporter>>,
    error: Vec<Arc<dyn ErrorReporter>>,
}

#[derive(Default)]
struct Shape {
    /// Declared number of pieces, unknown until a whole starts.
    part_count: Option<usize>,
    children: Vec<Tracker>,
}

struct TrackerInner {
    config: TrackerConfig,
    shape: Mutex<Shape>,
    finished: AtomicUsize,
    errored: AtomicBool,
    reporters: Mutex<Reporters>,
    parent: OnceLock<Weak<dyn ProgressParent>>,
    dispatcher: Mutex<Option<Dispatcher>>,
    /// Serializes counter updates with their reports so percents arrive in order.
    progress: Mutex<()>,
}

/// Hierarchical progress tracker.
///
/// A tracker describes one *whole* made of a known number of *pieces*, or a whole made of
/// child trackers. Reporters registered on it are told when the whole and each piece
/// start and finish, together with the percent complete at that moment. Cloning a
/// tracker yields another handle to the same progress.
///
/// When [`TrackerConfig::report_async`] is set, reports issued while a whole scope is
/// open are run by a background task in issue order, so slow reporters never block the
/// reporting worker.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                config,
                shape: Mutex::new(Shape::default()),
                finished: AtomicUsize::new(0),
                errored: AtomicBool::new(false),
                reporters: Mutex::new(Reporters::default()),
                parent: OnceLock::new(),
                dispatcher: Mutex::new(None),
                progress: Mutex::new(()),
            }),
        }
    }

    pub fn with_async_reporting() -> Self {
        Self::new(TrackerConfig { report_async: true })
    }

    pub fn add_whole_reporter(&self, reporter: Arc<dyn StateReporter>) {
        lock(&self.inner.reporters).whole.push(reporter);
    }

    pub fn add_piece_reporter(&self, reporter: Arc<dyn StateReporter>) {
        lock(&self.inner.reporters).piece.push(reporter);
    }

    pub fn add_error_reporter(&self, reporter: Arc<dyn ErrorReporter>) {
        lock(&self.inner.reporters).error.push(reporter);
    }

    /// Starts a whole made of `part_count` pieces.
    ///
    /// Resets the finished counter and the errored flag. The returned scope reports the
    /// finish of the whole when finished or dropped.
    pub fn whole(&self, part_count: usize, description: impl Into<String>) -> WholeScope {
        {
            let mut shape = lock(&self.inner.shape);
            shape.part_count = Some(part_count);
            shape.children.clear();
        }

        self.begin_whole(description.into())
    }

    /// Starts a whole whose progress is the mean progress of `children`.
    ///
    /// Piece notifications of every child are forwarded to this tracker's piece
    /// reporters. A child can belong to a single parent.
    pub fn whole_of(&self, children: Vec<Tracker>, description: impl Into<String>) -> WholeScope {
        let parent: Weak<dyn ProgressParent> = Arc::downgrade(&self.inner) as Weak<dyn ProgressParent>;
        for child in &children {
            if child.inner.parent.set(parent.clone()).is_err() && !child.has_parent(&self.inner) {
                warn!("tracker already has a different parent, piece progress will not be forwarded");
            }
        }

        {
            let mut shape = lock(&self.inner.shape);
            shape.part_count = None;
            shape.children = children;
        }

        self.begin_whole(description.into())
    }

    /// Starts a piece of the current whole.
    ///
    /// The piece counts as finished once the returned scope is dropped.
    pub fn piece(&self, description: impl Into<String>) -> PieceScope {
        let description = description.into();
        self.inner.piece_started(&description);

        PieceScope {
            tracker: self.clone(),
            description,
        }
    }

    /// Marks the whole as errored and hands `error` to every error reporter.
    pub fn error(&self, error: &EtlError, description: impl Into<String>) {
        self.inner.errored.store(true, Ordering::SeqCst);

        let reporters = lock(&self.inner.reporters).error.clone();
        let error = error.clone();
        let description = description.into();
        self.inner.dispatch(Box::new(move || {
            for reporter in &reporters {
                reporter.report(&error, &description);
            }
        }));
    }

    /// Percent complete, between 0 and 100.
    ///
    /// With children it is their mean percent. Otherwise it is the share of finished
    /// pieces, 0 while the piece count is unknown and 100 for a whole of zero pieces.
    pub fn percent(&self) -> f64 {
        self.inner.percent()
    }

    pub fn is_errored(&self) -> bool {
        self.inner.errored.load(Ordering::SeqCst)
    }

    pub fn finished_pieces(&self) -> usize {
        self.inner.finished.load(Ordering::SeqCst)
    }

    fn has_parent(&self, parent: &Arc<TrackerInner>) -> bool {
        let Some(current) = self.inner.parent.get() else {
            return false;
        };

        match current.upgrade() {
            Some(current) => std::ptr::addr_eq(Arc::as_ptr(&current), Arc::as_ptr(parent)),
            None => false,
        }
    }

    fn begin_whole(&self, description: String) -> WholeScope {
        self.inner.finished.store(0, Ordering::SeqCst);
        self.inner.errored.store(false, Ordering::SeqCst);

        if self.inner.config.report_async {
            let mut dispatcher = lock(&self.inner.dispatcher);
            if dispatcher.is_none() {
                *dispatcher = Dispatcher::spawn();
            }
        }

        let percent = self.inner.percent();
        let reporters = lock(&self.inner.reporters).whole.clone();
        let message = description.clone();
        self.inner.dispatch(Box::new(move || {
            for reporter in &reporters {
                reporter.report_start(&message, percent, false);
            }
        }));

        WholeScope {
            tracker: self.clone(),
            description,
            done: false,
        }
    }

    fn end_whole(&self, description: &str) -> Option<Dispatcher> {
        let percent = self.inner.percent();
        let errored = self.is_errored();
        let reporters = lock(&self.inner.reporters).whole.clone();
        let message = description.to_owned();
        self.inner.dispatch(Box::new(move || {
            for reporter in &reporters {
                reporter.report_finish(&message, percent, errored);
            }
        }));

        lock(&self.inner.dispatcher).take()
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("percent", &self.percent())
            .field("errored", &self.is_errored())
            .finish()
    }
}

impl TrackerInner {
    fn percent(&self) -> f64 {
        let (part_count, children) = {
            let shape = lock(&self.shape);
            (shape.part_count, shape.children.clone())
        };

        if !children.is_empty() {
            let total: f64 = children.iter().map(Tracker::percent).sum();
            return total / children.len() as f64;
        }

        match part_count {
            None => 0.0,
            Some(0) => 100.0,
            Some(parts) => {
                let finished = self.finished.load(Ordering::SeqCst);
                (100.0 * finished as f64 / parts as f64).min(100.0)
            }
        }
    }

    fn dispatch(&self, report: Report) {
        let sender = lock(&self.dispatcher).as_ref().map(Dispatcher::sender);

        match sender {
            Some(sender) => {
                if let Err(rejected) = sender.send(report) {
                    (rejected.0)();
                }
            }
            None => report(),
        }
    }

    fn report_piece(&self, message: &str, finish: bool) {
        let percent = self.percent();
        let errored = self.errored.load(Ordering::SeqCst);
        let reporters = lock(&self.reporters).piece.clone();
        let message = message.to_owned();

        self.dispatch(Box::new(move || {
            for reporter in &reporters {
                if finish {
                    reporter.report_finish(&message, percent, errored);
                } else {
                    reporter.report_start(&message, percent, errored);
                }
            }
        }));
    }

    fn parent(&self) -> Option<Arc<dyn ProgressParent>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    fn piece_started(&self, message: &str) {
        {
            let _ordered = lock(&self.progress);
            self.report_piece(message, false);
        }

        if let Some(parent) = self.parent() {
            parent.notify_piece_start(message);
        }
    }

    fn piece_finished(&self, message: &str) {
        {
            let _ordered = lock(&self.progress);
            self.finished.fetch_add(1, Ordering::SeqCst);
            self.report_piece(message, true);
        }

        if let Some(parent) = self.parent() {
            parent.notify_piece_finish(message);
        }
    }
}

impl ProgressParent for TrackerInner {
    fn notify_piece_start(&self, message: &str) {
        {
            let _ordered = lock(&self.progress);
            self.report_piece(message, false);
        }

        if let Some(parent) = self.parent() {
            parent.notify_piece_start(message);
        }
    }

    fn notify_piece_finish(&self, message: &str) {
        {
            let _ordered = lock(&self.progress);
            self.report_piece(message, true);
        }

        if let Some(parent) = self.parent() {
            parent.notify_piece_finish(message);
        }
    }
}

/// Open whole of a [`Tracker`].
///
/// Dropping the scope reports the finish of the whole and returns once every queued
/// report ran, running the leftovers on the dropping thread. [`WholeScope::finish`]
/// waits for the background worker instead.
#[must_use = "the whole finishes when the scope is dropped"]
pub struct WholeScope {
    tracker: Tracker,
    description: String,
    done: bool,
}

impl WholeScope {
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Reports the finish of the whole and waits until every queued report ran.
    pub async fn finish(mut self) {
        self.done = true;
        if let Some(dispatcher) = self.tracker.end_whole(&self.description) {
            dispatcher.drain().await;
        }
    }
}

impl Drop for WholeScope {
    fn drop(&mut self) {
        if !self.done
            && let Some(dispatcher) = self.tracker.end_whole(&self.description)
        {
            dispatcher.drain_blocking();
        }
    }
}

/// Open piece of a [`Tracker`], finished on drop.
#[must_use = "the piece finishes when the scope is dropped"]
pub struct PieceScope {
    tracker: Tracker,
    description: String,
}

impl PieceScope {
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Drop for PieceScope {
    fn drop(&mut self) {
        self.tracker.inner.piece_finished(&self.description);
    }
}
