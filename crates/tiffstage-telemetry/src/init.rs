//! Telemetry initialisation primitives and logging configuration.
//!
//! # Design
//! - Centralises logging setup (fmt or JSON) with a single entry point.
//! - Optionally mirrors every event into a plain-text log file for the run.
//! - Records the active log file once so callers can report where it went.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Result, TelemetryError};

/// Default logging target when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const RUN_LOG_SUFFIX: &str = "tiff_compression.log";

static ACTIVE_LOG_FILE: OnceCell<PathBuf> = OnceCell::new();

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Log level string (e.g., `info`, `debug`).
    pub level: &'a str,
    /// Output format selection for the console subscriber.
    pub format: LogFormat,
    /// Optional file receiving a plain-text copy of every event.
    pub log_file: Option<&'a Path>,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            log_file: None,
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Emit logs as structured JSON objects.
    Json,
    /// Emit human-readable logs.
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or the tracing subscriber
/// cannot be installed (for example, because another subscriber has already
/// been set globally).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let file = config.log_file.map(open_log_file).transpose()?;

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(build_env_filter(config.level))
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .with(file_layer(file))
            .try_init()
            .map_err(|source| TelemetryError::SubscriberInstall { source })?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(build_env_filter(config.level))
            .with(fmt::layer().with_target(false).with_thread_ids(false))
            .with(file_layer(file))
            .try_init()
            .map_err(|source| TelemetryError::SubscriberInstall { source })?,
    }

    if let Some(path) = config.log_file {
        ACTIVE_LOG_FILE.set(path.to_path_buf()).ok().or(Some(()));
    }
    Ok(())
}

/// Log file installed by [`init_logging`], if any.
#[must_use]
pub fn active_log_file() -> Option<&'static Path> {
    ACTIVE_LOG_FILE.get().map(PathBuf::as_path)
}

/// Timestamped file name for a run log, e.g. `2024-Mar-05-141502-tiff_compression.log`.
#[must_use]
pub fn run_log_file_name(started_at: DateTime<Local>) -> String {
    format!("{}-{RUN_LOG_SUFFIX}", started_at.format("%Y-%b-%d-%H%M%S"))
}

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|source| TelemetryError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

type FileLayer<S> =
    fmt::Layer<S, fmt::format::DefaultFields, fmt::format::Format, Mutex<File>>;

fn file_layer<S>(file: Option<File>) -> Option<FileLayer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    })
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
