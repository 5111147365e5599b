use std::{
    backtrace::{Backtrace, BacktraceStatus},
    io,
    panic::PanicHookInfo,
    sync::Once,
};

use conduit_config::Environment;
use thiserror::Error;
use tracing::field::display;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, InitError},
};
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::{EnvFilter, FmtSubscriber, Registry, fmt, layer::SubscriberExt};

/// Directory receiving rolling log files in production.
const LOG_DIR: &str = "logs";

/// Number of daily log files kept on disk.
const MAX_LOG_FILES: usize = 5;

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build rolling file appender: {0}")]
    InitAppender(#[from] InitError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("an io error occurred: {0}")]
    Io(#[from] io::Error),
}

/// Keeps the non-blocking file writer alive; dropping it flushes buffered lines.
#[must_use]
pub enum LogFlusher {
    Flusher(WorkerGuard),
    NullFlusher,
}

static INIT_TEST_TRACING: Once = Once::new();

/// Enables console tracing in tests when `ENABLE_TRACING` is set:
///
/// ENABLE_TRACING=1 cargo test <test_name>
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            Environment::Dev.set();
            let _log_flusher =
                init_tracing("test").expect("Failed to initialize tracing for tests");
        }
    });
}

/// Installs the global subscriber for `app_name`.
///
/// Production writes JSON lines to daily rolling files under `logs/`; every other
/// environment prints human-readable output to the terminal. The filter comes from
/// `RUST_LOG` and defaults to `info`. Events from the `log` crate are bridged in and
/// panics are logged before the previous hook runs.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    LogTracer::init()?;

    let is_prod = Environment::load()?.is_prod();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_flusher = if is_prod {
        configure_prod_tracing(filter, app_name)?
    } else {
        configure_dev_tracing(filter)?
    };

    set_tracing_panic_hook();

    Ok(log_flusher)
}

fn configure_prod_tracing(filter: EnvFilter, app_name: &str) -> Result<LogFlusher, TracingError> {
    let file_appender = rolling::Builder::new()
        .filename_prefix(app_name)
        .filename_suffix("log")
        .rotation(rolling::Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .build(LOG_DIR)?;

    let (file_appender, guard) = tracing_appender::non_blocking(file_appender);

    let format = fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(true);

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .event_format(format)
            .with_writer(file_appender)
            .json()
            .with_current_span(true)
            .with_span_list(true),
    );

    set_global_default(subscriber)?;

    Ok(LogFlusher::Flusher(guard))
}

fn configure_dev_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    let format = fmt::format()
        .with_level(true)
        .with_ansi(true)
        .with_thread_ids(true)
        .pretty()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(filter)
        .finish();

    set_global_default(subscriber)?;

    Ok(LogFlusher::NullFlusher)
}

fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

/// Logs the panic payload, location and backtrace as one structured event.
fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        panic.location = location,
        panic.backtrace = backtrace.map(display),
        panic.note = note,
        "a panic occurred",
    );
}
