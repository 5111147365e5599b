//! Example: paged in-memory copy
//!
//! Copies generated rows from a [`MemoryReader`] to a [`MemoryWriter`], summing each page
//! on the way. The copy runs either as a paged [`Step`] or as a composed pipe pipeline,
//! optionally polled on a fixed cycle until Ctrl+C.

use std::error::Error;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use conduit::concurrency::cadence::Cadence;
use conduit::config::{JobConfig, PageSize};
use conduit::destination::memory::MemoryWriter;
use conduit::error::{ErrorKind, EtlResult};
use conduit::job::{Job, Step};
use conduit::mapper::Mapper;
use conduit::pipes::fanout::ThreadedTransformer;
use conduit::pipes::map::MapPipe;
use conduit::pipes::poll::PollingProducer;
use conduit::pipes::read::ReadPipe;
use conduit::pipes::write::WritePipe;
use conduit::pipes::{Closed, Consumer, Pipe, Producer, Then, Transformer};
use conduit::source::Reader;
use conduit::source::memory::MemoryReader;
use conduit::tracker::{Tracker, TracingReporter};
use conduit_config::load_config_from;
use conduit_telemetry::tracing::init_tracing;
use tracing::info;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Paged job with retries and progress tracking.
    Step,
    /// Composed read, map and write pipes.
    Pipe,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// How the copy is driven.
    #[arg(long, value_enum, default_value_t = Mode::Step)]
    mode: Mode,

    /// Number of generated rows.
    #[arg(long, default_value = "1000")]
    rows: u64,

    /// Directory holding `base.yaml` and environment overlays.
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Overrides `setting.max_page_size`.
    #[arg(long)]
    page_size: Option<i64>,

    /// Overrides `setting.max_degree_of_parallelism`.
    #[arg(long)]
    parallelism: Option<i64>,

    /// Re-runs the pipe copy every this many seconds until Ctrl+C.
    #[arg(long)]
    poll_every_secs: Option<u64>,
}

struct PageTotal;

#[async_trait]
impl Mapper<Vec<u64>, u64> for PageTotal {
    async fn map(&self, source: &Vec<u64>) -> EtlResult<u64> {
        Ok(source.iter().sum())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _log_flusher = init_tracing("conduit-copy")?;

    main_impl().await
}

async fn main_impl() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mut config = match &args.config_dir {
        Some(dir) => load_config_from::<JobConfig>(dir)?,
        None => JobConfig::default(),
    };
    if let Some(page_size) = args.page_size {
        config.setting.max_page_size = page_size;
    }
    if let Some(parallelism) = args.parallelism {
        config.setting.max_degree_of_parallelism = parallelism;
    }
    config.validate()?;

    info!(
        mode = ?args.mode,
        rows = args.rows,
        max_page_size = config.setting.max_page_size,
        max_degree_of_parallelism = config.setting.max_degree_of_parallelism,
        "starting copy"
    );

    let reader: Arc<dyn Reader<Vec<u64>>> =
        Arc::new(MemoryReader::new((1..=args.rows).collect::<Vec<u64>>()));
    let writer = MemoryWriter::<u64>::new();

    match args.mode {
        Mode::Step => run_step(&config, reader, writer.clone()).await?,
        Mode::Pipe => run_pipes(&config, reader, writer.clone(), args.poll_every_secs).await?,
    }

    let totals = writer.written().await;
    info!(
        pages = totals.len(),
        total = totals.iter().sum::<u64>(),
        "copy complete"
    );

    Ok(())
}

async fn run_step(
    config: &JobConfig,
    reader: Arc<dyn Reader<Vec<u64>>>,
    writer: MemoryWriter<u64>,
) -> EtlResult<()> {
    let tracker = Tracker::new(config.tracker.clone());
    tracker.add_whole_reporter(Arc::new(TracingReporter));
    tracker.add_piece_reporter(Arc::new(TracingReporter));
    tracker.add_error_reporter(Arc::new(TracingReporter));

    let step = Step::new("copy", reader, Arc::new(writer))
        .with_mapper(Arc::new(PageTotal))
        .with_setting(config.setting.clone())
        .with_tracker(tracker);

    let result = step.process().await;
    step.close().await?;

    result
}

async fn run_pipes(
    config: &JobConfig,
    reader: Arc<dyn Reader<Vec<u64>>>,
    writer: MemoryWriter<u64>,
    poll_every_secs: Option<u64>,
) -> EtlResult<()> {
    let page_size = PageSize::from_setting(config.setting.max_page_size)?;
    let workers = usize::try_from(config.setting.max_degree_of_parallelism)
        .ok()
        .and_then(NonZeroUsize::new)
        .unwrap_or(NonZeroUsize::MIN);

    let mut read: Arc<dyn Producer<Vec<u64>>> = Arc::new(ReadPipe::new(reader, page_size));
    if let Some(secs) = poll_every_secs {
        let cadence = Cadence::every(Duration::from_secs(secs))?;
        read = Arc::new(PollingProducer::new(read, cadence));
    }

    let mappers: Vec<Arc<dyn Mapper<Vec<u64>, u64>>> = vec![Arc::new(PageTotal)];
    let map: Arc<dyn Transformer<Vec<u64>, u64>> = Arc::new(MapPipe::new(mappers));
    let threaded: Arc<dyn Transformer<Vec<u64>, u64>> =
        Arc::new(ThreadedTransformer::new(map, workers));
    let write: Arc<dyn Consumer<u64>> = Arc::new(WritePipe::new(Arc::new(writer)));

    let pipeline = read.then(threaded).then(write);

    let result = if poll_every_secs.is_some() {
        let mut run = pipeline.start();

        tokio::select! {
            result = &mut run => result,
            _ = tokio::signal::ctrl_c() => {
                info!("stopping polling pipeline");
                pipeline.stop();
                match run.await {
                    Err(err) if err.kind() == ErrorKind::PipeStopped => Ok(()),
                    other => other,
                }
            }
        }
    } else {
        pipeline.start().await
    };

    info!(status = %pipeline.status()?, "pipeline done");
    pipeline.close().await?;

    result
}
