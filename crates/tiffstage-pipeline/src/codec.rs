//! Boundary to the external image encoder.
//!
//! # Design
//! - The pipeline only needs "encode this staged file into that output path";
//!   pixel handling stays outside the process.
//! - `CommandCodec` drives an encoder program with a fixed argument contract:
//!   `--input <in> --output <out> --compression <name> [--quality <q>] [--threads <n>]`.
//!   `--quality` is only passed for the lossy algorithm.

use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tiffstage_config::{Algorithm, EncodeSettings};
use tokio::process::Command;

use crate::error::CodecError;

const STDERR_TAIL_BYTES: usize = 512;

/// Inputs for one encode call.
#[derive(Debug, Clone, Copy)]
pub struct EncodeRequest<'a> {
    /// Staged uncompressed file.
    pub input: &'a Path,
    /// Where the encoder must write its output.
    pub output: &'a Path,
    /// Compression algorithm.
    pub algorithm: Algorithm,
    /// Quality percentage; only meaningful for the lossy algorithm.
    pub quality: u8,
    /// Upper bound on encoder worker threads.
    pub max_workers: Option<NonZeroUsize>,
}

impl<'a> EncodeRequest<'a> {
    /// Build a request from the run's encode settings.
    #[must_use]
    pub const fn new(input: &'a Path, output: &'a Path, settings: &EncodeSettings) -> Self {
        Self {
            input,
            output,
            algorithm: settings.algorithm,
            quality: settings.quality,
            max_workers: settings.max_workers,
        }
    }
}

/// Encoder abstraction used by the compressor.
#[async_trait]
pub trait Codec: Send + Sync {
    /// Encode `request.input` into `request.output`.
    ///
    /// Implementations may leave a partial output behind on failure; the caller
    /// removes it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the output could not be produced.
    async fn encode(&self, request: &EncodeRequest<'_>) -> Result<(), CodecError>;
}

/// Codec that runs an external encoder program per file.
#[derive(Debug, Clone)]
pub struct CommandCodec {
    program: PathBuf,
}

impl CommandCodec {
    /// Codec invoking `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Program this codec runs.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl Codec for CommandCodec {
    async fn encode(&self, request: &EncodeRequest<'_>) -> Result<(), CodecError> {
        let output = Command::new(&self.program)
            .args(encoder_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CodecError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CodecError::Exited {
                status: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            })
        }
    }
}

/// Arguments passed to the encoder program for `request`.
#[must_use]
pub fn encoder_args(request: &EncodeRequest<'_>) -> Vec<OsString> {
    let mut args = vec![
        OsString::from("--input"),
        request.input.as_os_str().to_owned(),
        OsString::from("--output"),
        request.output.as_os_str().to_owned(),
        OsString::from("--compression"),
        OsString::from(request.algorithm.as_str()),
    ];
    if request.algorithm.is_lossy() {
        args.push(OsString::from("--quality"));
        args.push(OsString::from(request.quality.to_string()));
    }
    if let Some(workers) = request.max_workers {
        args.push(OsString::from("--threads"));
        args.push(OsString::from(workers.to_string()));
    }
    args
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}
