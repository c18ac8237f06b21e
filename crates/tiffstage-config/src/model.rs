//! Typed configuration models.
//!
//! # Design
//! - One immutable `PipelineConfig` value is built per run and handed to the coordinator.
//! - Enums replace the stringly switches of the command line.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults::{
    DEFAULT_CODEC_PROGRAM, DEFAULT_QUALITY, DEFAULT_RATIO_THRESHOLD, DEFAULT_STAGE_CAPACITY,
    DEFAULT_STALL_TIMEOUT,
};

/// Compression algorithm handed to the external encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Lossy wavelet coding (JPEG 2000); the only algorithm that uses `quality`.
    LossyWavelet,
    /// Deflate (zlib) coding.
    Deflate,
    /// Lempel-Ziv-Welch coding.
    Lzw,
}

impl Algorithm {
    /// Name understood by the encoder program and the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LossyWavelet => "jpeg_2000_lossy",
            Self::Deflate => "zlib",
            Self::Lzw => "lzw",
        }
    }

    /// Whether the quality parameter is meaningful for this algorithm.
    #[must_use]
    pub const fn is_lossy(self) -> bool {
        matches!(self, Self::LossyWavelet)
    }
}

/// Where an accepted output is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Replace the remote original in place.
    Replace,
    /// Keep the original and write the output into a sibling output directory.
    PreserveBeside,
}

/// What the run operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputTarget {
    /// Every raster file below a directory tree.
    Folder(PathBuf),
    /// A single raster file.
    File(PathBuf),
}

impl InputTarget {
    /// Directory holding the ledger for this target.
    #[must_use]
    pub fn root(&self) -> &Path {
        match self {
            Self::Folder(path) => path,
            Self::File(path) => path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new(".")),
        }
    }

    /// Path provided by the caller.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Folder(path) | Self::File(path) => path,
        }
    }
}

/// Parameters forwarded to the codec for every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    /// Compression algorithm.
    pub algorithm: Algorithm,
    /// Quality percentage, meaningful only for the lossy algorithm.
    pub quality: u8,
    /// Upper bound on encoder worker threads; `None` leaves the choice to the encoder.
    pub max_workers: Option<NonZeroUsize>,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::LossyWavelet,
            quality: DEFAULT_QUALITY,
            max_workers: None,
        }
    }
}

/// Complete configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Folder or file to compress.
    pub target: InputTarget,
    /// Fast local directory used to stage files.
    pub cache_dir: PathBuf,
    /// Maximum number of files resident in the cache at once.
    pub stage_capacity: NonZeroUsize,
    /// Minimum ratio an output must exceed to be committed; `None` accepts everything.
    pub ratio_gate: Option<f64>,
    /// How long the compressor may wait for a staged file while work remains.
    pub stall_timeout: Duration,
    /// Replace originals or write beside them.
    pub commit_mode: CommitMode,
    /// Codec parameters.
    pub encode: EncodeSettings,
    /// Encoder program invoked by the command codec.
    pub codec_program: PathBuf,
}

impl PipelineConfig {
    /// Configuration with default tunables for the given target.
    #[must_use]
    pub fn new(target: InputTarget) -> Self {
        Self {
            target,
            cache_dir: PathBuf::from("."),
            stage_capacity: NonZeroUsize::new(DEFAULT_STAGE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ratio_gate: Some(DEFAULT_RATIO_THRESHOLD),
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            commit_mode: CommitMode::Replace,
            encode: EncodeSettings::default(),
            codec_program: PathBuf::from(DEFAULT_CODEC_PROGRAM),
        }
    }

    /// Directory holding the ledger and the per-run log.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.target.root()
    }
}
