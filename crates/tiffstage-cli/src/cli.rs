//! Argument parsing and the run sequence behind the `tiffstage` binary.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local};
use clap::{ArgGroup, Parser, ValueEnum};
use tiffstage_config::{
    Algorithm, CommitMode, DEFAULT_CODEC_PROGRAM, DEFAULT_QUALITY, DEFAULT_RATIO_THRESHOLD,
    DEFAULT_STAGE_CAPACITY, DEFAULT_STALL_TIMEOUT, EncodeSettings, InputTarget, PipelineConfig,
};
use tiffstage_pipeline::{CommandCodec, Pipeline, error_chain};
use tiffstage_telemetry::{
    DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, active_log_file, init_logging, run_log_file_name,
};
use tracing::{error, info, warn};

use crate::error::{CliError, CliResult};
use crate::output::render_summary;

/// Parses CLI arguments, runs the pipeline, and renders the summary.
/// Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    match execute(cli, Local::now()).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn execute(cli: Cli, started_at: DateTime<Local>) -> CliResult<()> {
    let config = cli.pipeline_config()?;
    config.validate()?;

    let log_file = cli.log_file_path(&config, started_at);
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format.map_or_else(LogFormat::infer, LogFormat::from),
        log_file: log_file.as_deref(),
    };
    init_logging(&logging)
        .context("failed to initialise logging")
        .map_err(CliError::failure)?;
    if let Some(path) = active_log_file() {
        info!(log_file = %path.display(), "writing run log");
    }

    let codec = Arc::new(CommandCodec::new(config.codec_program.clone()));
    info!(
        encoder = %codec.program().display(),
        algorithm = config.encode.algorithm.as_str(),
        "using external encoder"
    );
    let pipeline = Pipeline::new(config, codec);
    let shutdown = pipeline.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current file");
            shutdown.trigger();
        }
    });

    let summary = pipeline.run().await.map_err(|err| {
        if err.is_stall() {
            error!(
                error = %error_chain(&err),
                "run aborted: no file reached the cache in time; check that the remote share is reachable"
            );
        } else {
            error!(error = %error_chain(&err), "run aborted");
        }
        CliError::failure(err)
    })?;
    render_summary(&summary, cli.output)
}

#[derive(Debug, Parser)]
#[command(
    name = "tiffstage",
    version,
    about = "Compress TIFF files on network storage through a bounded local cache"
)]
#[command(group(ArgGroup::new("target").required(true).args(["folder", "file"])))]
pub(crate) struct Cli {
    /// Compress every TIFF file below this folder.
    #[arg(short = 'd', long, value_name = "DIR")]
    folder: Option<PathBuf>,
    /// Compress a single TIFF file.
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,
    /// Compression algorithm.
    #[arg(short = 'C', long, value_enum, default_value_t = CompressionArg::Jpeg2000Lossy)]
    compression: CompressionArg,
    /// Quality percentage for the lossy algorithm.
    #[arg(
        short = 'Q',
        long,
        default_value_t = DEFAULT_QUALITY,
        value_parser = clap::value_parser!(u8).range(0..=100)
    )]
    quality: u8,
    /// Worker threads the encoder may use.
    #[arg(long)]
    threads: Option<NonZeroUsize>,
    /// Fast local directory used to stage files.
    #[arg(long, env = "TIFFSTAGE_CACHE_DIR", default_value = ".")]
    cache_dir: PathBuf,
    /// Write outputs into `_compressed_files` beside each original instead of replacing it.
    #[arg(long)]
    do_not_replace: bool,
    /// Maximum number of files staged in the cache at once.
    #[arg(long, default_value_t = DEFAULT_STAGE_CAPACITY)]
    capacity: usize,
    /// Outputs must compress better than this ratio to be committed.
    #[arg(long, default_value_t = DEFAULT_RATIO_THRESHOLD, conflicts_with = "no_ratio_gate")]
    min_ratio: f64,
    /// Commit every successful output regardless of ratio.
    #[arg(long)]
    no_ratio_gate: bool,
    /// Abort when no staged file arrives for this many seconds.
    #[arg(long, default_value_t = DEFAULT_STALL_TIMEOUT.as_secs())]
    stall_timeout_secs: u64,
    /// Encoder program invoked for each file.
    #[arg(long, env = "TIFFSTAGE_CODEC", default_value = DEFAULT_CODEC_PROGRAM)]
    codec_program: PathBuf,
    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, env = "TIFFSTAGE_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
    /// Console log format; defaults to pretty in debug builds and JSON otherwise.
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,
    /// Run log location; defaults to a timestamped file at the scan root.
    #[arg(long, value_name = "PATH", conflicts_with = "no_log_file")]
    log_file: Option<PathBuf>,
    /// Do not write a run log file.
    #[arg(long)]
    no_log_file: bool,
    /// Format of the final run summary.
    #[arg(long = "output", value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CompressionArg {
    #[value(name = "jpeg_2000_lossy")]
    Jpeg2000Lossy,
    #[value(name = "zlib")]
    Zlib,
    #[value(name = "lzw")]
    Lzw,
}

impl From<CompressionArg> for Algorithm {
    fn from(value: CompressionArg) -> Self {
        match value {
            CompressionArg::Jpeg2000Lossy => Self::LossyWavelet,
            CompressionArg::Zlib => Self::Deflate,
            CompressionArg::Lzw => Self::Lzw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    fn target(&self) -> CliResult<InputTarget> {
        match (&self.folder, &self.file) {
            (Some(folder), None) => Ok(InputTarget::Folder(folder.clone())),
            (None, Some(file)) => Ok(InputTarget::File(file.clone())),
            _ => Err(CliError::validation(
                "exactly one of --folder or --file must be given",
            )),
        }
    }

    fn pipeline_config(&self) -> CliResult<PipelineConfig> {
        let stage_capacity = NonZeroUsize::new(self.capacity)
            .ok_or_else(|| CliError::validation("--capacity must be at least 1"))?;

        let mut config = PipelineConfig::new(self.target()?);
        config.cache_dir.clone_from(&self.cache_dir);
        config.stage_capacity = stage_capacity;
        config.ratio_gate = (!self.no_ratio_gate).then_some(self.min_ratio);
        config.stall_timeout = Duration::from_secs(self.stall_timeout_secs);
        config.commit_mode = if self.do_not_replace {
            CommitMode::PreserveBeside
        } else {
            CommitMode::Replace
        };
        config.encode = EncodeSettings {
            algorithm: self.compression.into(),
            quality: self.quality,
            max_workers: self.threads,
        };
        config.codec_program.clone_from(&self.codec_program);
        Ok(config)
    }

    fn log_file_path(
        &self,
        config: &PipelineConfig,
        started_at: DateTime<Local>,
    ) -> Option<PathBuf> {
        if self.no_log_file {
            return None;
        }
        Some(self.log_file.clone().unwrap_or_else(|| {
            config.root().join(run_log_file_name(started_at))
        }))
    }
}
