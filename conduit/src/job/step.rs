use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::bail;
use crate::config::{JobConfig, PageSize, Parallelism, RetryLimits, Setting};
use crate::destination::Writer;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::job::base::{Job, JobState, JobStateCell};
use crate::job::retry::TimeoutRetry;
use crate::mapper::{IdentityMapper, Mapper};
use crate::source::Reader;
use crate::tracker::Tracker;

type Mappers<S, D> = Vec<Arc<dyn Mapper<S, D>>>;

/// Paged extract, transform and load job.
///
/// Pages of the reader are processed by a pool of at most `max_degree_of_parallelism`
/// workers, each claiming the next page index until none is left. Each page is read, passed
/// through every mapper in order, and every mapped output is written, each operation
/// counting as one tracker piece and going through the timeout retry policy. A job
/// without mappers copies pages as they are, which requires `S` and `D` to be the same
/// type.
pub struct Step<S, D> {
    name: String,
    reader: Arc<dyn Reader<S>>,
    writer: Arc<dyn Writer<D>>,
    mappers: Mappers<S, D>,
    setting: Setting,
    tracker: Tracker,
    state: JobStateCell,
}

impl<S, D> Step<S, D>
where
    S: Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        reader: Arc<dyn Reader<S>>,
        writer: Arc<dyn Writer<D>>,
    ) -> Self {
        Self {
            name: name.into(),
            reader,
            writer,
            mappers: Vec::new(),
            setting: Setting::default(),
            tracker: Tracker::default(),
            state: JobStateCell::new(),
        }
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper<S, D>>) -> Self {
        self.mappers.push(mapper);
        self
    }

    pub fn with_setting(mut self, setting: Setting) -> Self {
        self.setting = setting;
        self
    }

    pub fn with_tracker(mut self, tracker: Tracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Applies the setting and tracker options of `config`.
    pub fn with_config(self, config: &JobConfig) -> Self {
        self.with_setting(config.setting.clone())
            .with_tracker(Tracker::new(config.tracker.clone()))
    }

    pub fn setting(&self) -> &Setting {
        &self.setting
    }

    fn initializing(&self) -> EtlResult<Mappers<S, D>> {
        if !self.mappers.is_empty() {
            return Ok(self.mappers.clone());
        }

        match IdentityMapper::<S, D>::for_types() {
            Some(identity) => {
                debug!(step = %self.name, "no mapper given, copying pages unchanged");
                let identity: Arc<dyn Mapper<S, D>> = Arc::new(identity);
                Ok(vec![identity])
            }
            None => bail!(
                ErrorKind::InvalidArgument,
                "A mapper is required when source and destination types differ",
                format!(
                    "{} -> {}",
                    std::any::type_name::<S>(),
                    std::any::type_name::<D>()
                )
            ),
        }
    }

    async fn processing(&self, mappers: Mappers<S, D>) -> EtlResult<()> {
        let page_size = PageSize::from_setting(self.setting.max_page_size)
            .map_err(|err| self.fail(err, "reading settings"))?;
        let parallelism = Parallelism::from_setting(self.setting.max_degree_of_parallelism)
            .map_err(|err| self.fail(err, "reading settings"))?;
        let retry = Arc::new(TimeoutRetry::new(RetryLimits::from_setting(&self.setting)));

        let reader = &self.reader;
        let size = retry
            .run("size", || reader.size())
            .await
            .map_err(|err| self.fail(err, "sizing the source"))?;

        let page_count = page_size.page_count(size);
        let piece_count = page_count * (1 + 2 * mappers.len());
        info!(
            step = %self.name,
            size,
            page_count,
            piece_count,
            ?parallelism,
            "processing step"
        );

        let whole = self.tracker.whole(piece_count, self.name.clone());
        let pages = Arc::new(Pages {
            next: AtomicUsize::new(0),
            count: page_count,
            size,
            page_size,
            reader: self.reader.clone(),
            writer: self.writer.clone(),
            mappers,
            retry: retry.clone(),
            tracker: self.tracker.clone(),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..parallelism.workers(page_count) {
            let pages = pages.clone();
            workers.spawn(async move { pages.work(worker_id).await });
        }

        let mut errors = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(failed) => errors.extend(failed),
                Err(join_err) => errors.push(etl_error!(
                    ErrorKind::WorkerPanic,
                    "Page worker failed",
                    join_err
                )),
            }
        }

        if errors.is_empty() {
            info!(step = %self.name, timeouts = retry.timeouts(), "step finished");
            whole.finish().await;
            return Ok(());
        }

        let err = self.fail(EtlError::from(errors), "processing pages");
        whole.finish().await;

        Err(err)
    }

    fn fail(&self, err: EtlError, phase: &str) -> EtlError {
        error!(step = %self.name, phase, error = %err, "step failed");
        self.state.set(JobState::Errored);
        self.tracker
            .error(&err, format!("{} failed while {phase}", self.name));

        err
    }
}

#[async_trait]
impl<S, D> Job for Step<S, D>
where
    S: Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
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
        let mappers = self
            .initializing()
            .map_err(|err| self.fail(err, "initializing"))?;

        self.state.set(JobState::Processing);
        self.processing(mappers).await?;

        self.state.set(JobState::Finished);
        Ok(())
    }

    async fn close(&self) -> EtlResult<()> {
        let mut errors = Vec::new();
        if let Err(err) = self.reader.close().await {
            errors.push(err);
        }
        if let Err(err) = self.writer.close().await {
            errors.push(err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

/// Pages of one processing run, claimed by workers through a shared cursor.
struct Pages<S, D> {
    next: AtomicUsize,
    count: usize,
    size: usize,
    page_size: PageSize,
    reader: Arc<dyn Reader<S>>,
    writer: Arc<dyn Writer<D>>,
    mappers: Mappers<S, D>,
    retry: Arc<TimeoutRetry>,
    tracker: Tracker,
}

impl<S, D> Pages<S, D>
where
    S: Send + Sync + 'static,
    D: Clone + Send + 'static,
{
    /// Processes pages until none is left; a failed page does not stop the worker.
    async fn work(&self, worker_id: usize) -> Vec<EtlError> {
        let mut errors = Vec::new();
        loop {
            let index = self.next.fetch_add(1, Ordering::SeqCst);
            if index >= self.count {
                break;
            }
            if let Err(err) = self.run(index).await {
                debug!(worker_id, index, error = %err, "page failed");
                errors.push(err);
            }
        }

        errors
    }

    async fn run(&self, index: usize) -> EtlResult<()> {
        let (skip, take) = self.page_size.window(index, self.size);
        let retry = &self.retry;

        let source = {
            let _piece = self.tracker.piece(format!("extract page {index}"));
            retry
                .run(&format!("read page {index}"), || self.reader.read(skip, take))
                .await?
        };

        let mut outputs = Vec::with_capacity(self.mappers.len());
        for (position, mapper) in self.mappers.iter().enumerate() {
            let _piece = self
                .tracker
                .piece(format!("transform page {index} with mapper {position}"));
            let output = retry
                .run(&format!("map page {index} with mapper {position}"), || {
                    mapper.map(&source)
                })
                .await?;
            outputs.push(output);
        }

        for (position, output) in outputs.into_iter().enumerate() {
            let _piece = self
                .tracker
                .piece(format!("load page {index} output {position}"));
            retry
                .run(&format!("write page {index} output {position}"), || {
                    self.writer.write(output.clone())
                })
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::destination::memory::MemoryWriter;
    use crate::source::memory::MemoryReader;

    struct Render;

    #[async_trait]
    impl Mapper<Vec<u32>, String> for Render {
        async fn map(&self, source: &Vec<u32>) -> EtlResult<String> {
            Ok(source
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(","))
        }
    }

    fn setting(max_page_size: i64, max_degree_of_parallelism: i64) -> Setting {
        Setting {
            max_page_size,
            max_degree_of_parallelism,
            ..Setting::default()
        }
    }

    #[tokio::test]
    async fn copies_pages_without_mapper() {
        let writer = MemoryWriter::<Vec<u32>>::new();
        let step = Step::<Vec<u32>, Vec<u32>>::new(
            "copy",
            Arc::new(MemoryReader::new((0..5).collect::<Vec<u32>>())),
            Arc::new(writer.clone()),
        )
        .with_setting(setting(2, 1));

        step.process().await.unwrap();

        assert_eq!(step.state(), JobState::Finished);
        assert_eq!(writer.written().await, vec![vec![0, 1], vec![2, 3], vec![4]]);
        assert_eq!(step.tracker().percent(), 100.0);
    }

    #[tokio::test]
    async fn maps_pages() {
        let writer = MemoryWriter::<String>::new();
        let step = Step::<Vec<u32>, String>::new(
            "render",
            Arc::new(MemoryReader::new(vec![1u32, 2, 3])),
            Arc::new(writer.clone()),
        )
        .with_mapper(Arc::new(Render));

        step.process().await.unwrap();
        assert_eq!(writer.written().await, vec!["1,2,3".to_owned()]);
    }

    #[tokio::test]
    async fn requires_mapper_for_different_types() {
        let step = Step::<Vec<u32>, String>::new(
            "missing mapper",
            Arc::new(MemoryReader::new(vec![1u32])),
            Arc::new(MemoryWriter::new()),
        );

        let err = step.process().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(step.state(), JobState::Errored);
        assert!(step.tracker().is_errored());
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let step = Step::<Vec<u32>, Vec<u32>>::new(
            "zero",
            Arc::new(MemoryReader::new(vec![1u32])),
            Arc::new(MemoryWriter::<Vec<u32>>::new()),
        )
        .with_setting(setting(0, 1));

        let err = step.process().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    /// Reader recording how many reads overlap.
    struct Gauge {
        inner: MemoryReader<u32>,
        live: AtomicUsize,
        peak: AtomicUsize,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl Reader<Vec<u32>> for Gauge {
        async fn size(&self) -> EtlResult<usize> {
            self.inner.size().await
        }

        async fn read(&self, skip: usize, take: usize) -> EtlResult<Vec<u32>> {
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(live, Ordering::SeqCst);
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.inner.read(skip, take).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pages_never_exceed_parallelism() {
        let gauge = Arc::new(Gauge {
            inner: MemoryReader::new((0..20).collect::<Vec<u32>>()),
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        });
        let writer = MemoryWriter::<Vec<u32>>::new();
        let step = Step::<Vec<u32>, Vec<u32>>::new("gauge", gauge.clone(), Arc::new(writer.clone()))
            .with_setting(setting(2, 2));

        step.process().await.unwrap();

        assert_eq!(gauge.reads.load(Ordering::SeqCst), 10);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(writer.written().await.len(), 10);
    }

    #[tokio::test]
    async fn failed_pages_do_not_stop_the_others() {
        let writer = MemoryWriter::<Vec<u32>>::new();
        let reader = Arc::new(MemoryReader::new((0..4).collect::<Vec<u32>>()));
        let step = Step::<Vec<u32>, Vec<u32>>::new("partial", reader, Arc::new(writer.clone()))
            .with_mapper(Arc::new(RejectFirst))
            .with_setting(setting(1, 1));

        let err = step.process().await.unwrap_err();

        assert_eq!(err.kinds(), vec![ErrorKind::MappingError]);
        assert_eq!(writer.written().await, vec![vec![1], vec![2], vec![3]]);
    }

    struct RejectFirst;

    #[async_trait]
    impl Mapper<Vec<u32>, Vec<u32>> for RejectFirst {
        async fn map(&self, source: &Vec<u32>) -> EtlResult<Vec<u32>> {
            if source.first() == Some(&0) {
                bail!(ErrorKind::MappingError, "Page rejected");
            }
            Ok(source.clone())
        }
    }

    #[tokio::test]
    async fn close_releases_writer() {
        let writer = MemoryWriter::<Vec<u32>>::new();
        let step = Step::<Vec<u32>, Vec<u32>>::new(
            "close",
            Arc::new(MemoryReader::new(vec![1u32])),
            Arc::new(writer.clone()),
        );

        step.close().await.unwrap();
        assert!(writer.is_closed().await);
    }
}
