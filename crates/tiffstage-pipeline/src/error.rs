//! # Design
//!
//! - Provide structured, constant-message errors for the pipeline.
//! - Separate fatal run errors (`PipelineError`) from per-file errors (`FileError`),
//!   which are logged at the file boundary and never abort the run.
//! - Preserve source errors without interpolating context into error messages.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for run-level pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that terminate a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// IO failures outside any single file's processing.
    #[error("pipeline io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The ledger could not be opened, repaired, or appended to.
    #[error("ledger unavailable")]
    Ledger {
        /// Operation that triggered the ledger failure.
        operation: &'static str,
        /// Ledger file path.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The scan root could not be traversed.
    #[error("directory walk failed")]
    Walkdir {
        /// Operation that triggered the walkdir failure.
        operation: &'static str,
        /// Path involved in the walkdir failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// A path cannot be stored as one ledger line (not UTF-8, or contains a line break).
    #[error("path cannot be recorded in the ledger")]
    PathNotRecordable {
        /// Offending path.
        path: PathBuf,
    },
    /// No staged file became available within the stall bound while work remained.
    #[error("compressor stalled waiting for staged files")]
    StallTimeout {
        /// How long the compressor waited.
        waited: Duration,
        /// Files still without a terminal outcome.
        outstanding: usize,
    },
    /// The stager went away before every scheduled file was handed over.
    #[error("stager exited with work outstanding")]
    StagerDisconnected {
        /// Files still without a terminal outcome.
        outstanding: usize,
    },
    /// A worker task panicked or was aborted.
    #[error("pipeline worker failed")]
    Worker {
        /// Worker name.
        worker: &'static str,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
}

impl PipelineError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn ledger(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::Ledger {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Whether this error is the fatal stall condition.
    #[must_use]
    pub const fn is_stall(&self) -> bool {
        matches!(self, Self::StallTimeout { .. })
    }
}

/// Errors confined to a single file; the file is retried on the next run.
#[derive(Debug, Error)]
pub enum FileError {
    /// Copying the remote file into the staging cache failed.
    #[error("failed to stage file into cache")]
    Transfer {
        /// Remote file that could not be staged.
        remote: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The encoder failed.
    #[error("encoder failed")]
    Codec {
        /// Remote file being compressed.
        remote: PathBuf,
        /// Underlying codec error.
        source: CodecError,
    },
    /// The accepted output could not be committed to its destination.
    #[error("failed to commit compressed output")]
    Commit {
        /// Final destination of the output.
        destination: PathBuf,
        /// Underlying commit error.
        source: CommitError,
    },
    /// Other IO failures while handling a staged file.
    #[error("file io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl FileError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Failures reported by the codec boundary.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The encoder program could not be started.
    #[error("failed to start encoder")]
    Spawn {
        /// Program that failed to start.
        program: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The encoder exited unsuccessfully.
    #[error("encoder exited with status {status:?}: {stderr}")]
    Exited {
        /// Exit code, absent when the process was killed by a signal.
        status: Option<i32>,
        /// Tail of the encoder's standard error.
        stderr: String,
    },
    /// The encoder reported success but wrote no output.
    #[error("encoder produced no output")]
    MissingOutput {
        /// Expected output path.
        output: PathBuf,
    },
    /// The encoder wrote a zero-byte output.
    #[error("encoder produced an empty output")]
    EmptyOutput {
        /// Output path.
        output: PathBuf,
    },
    /// Any other encoder failure.
    #[error("encoder failure: {message}")]
    Other {
        /// Description of the failure.
        message: String,
    },
}

/// Failures while moving an accepted output into place.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The destination filesystem rejected the attribute-preserving copy.
    #[error("destination filesystem does not support the attribute-preserving copy")]
    UnsupportedFilesystemOperation {
        /// Destination-side temporary path.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// IO failures during the commit.
    #[error("commit io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl CommitError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Render an error and its sources as one `outer: inner: root` line for log output.
#[must_use]
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut current = error.source();
    while let Some(source) = current {
        rendered.push_str(": ");
        rendered.push_str(&source.to_string());
        current = source.source();
    }
    rendered
}
