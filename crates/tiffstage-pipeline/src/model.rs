//! Domain models for the staged compression pipeline.
//!
//! # Design
//! - `FileTask` carries one file through `Discovered → Staged → Compressed →
//!   {Accepted | Rejected | Failed} → Recorded`.
//! - `CompressionOutcome::evaluate` is the ratio gate; it is pure so it can be
//!   checked without touching the filesystem.
//! - `RunSummary` is the only value a run hands back to its caller.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tiffstage_config::{
    CACHE_SEQUENCE_WIDTH, COMPRESSED_DIR_NAME, CommitMode, PART_SUFFIX, STAGING_DIR_NAME,
    has_raster_extension,
};
use uuid::Uuid;

/// Lifecycle state of a [`FileTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Found by the scanner.
    Discovered,
    /// Copied into the staging cache.
    Staged,
    /// Encoded into a temporary output.
    Compressed,
    /// Output committed to its destination.
    Accepted,
    /// Output discarded by the ratio gate.
    Rejected,
    /// Staging, encoding, or committing failed.
    Failed,
    /// Written to the ledger.
    Recorded,
}

impl TaskState {
    /// Stable label for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Staged => "staged",
            Self::Compressed => "compressed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Recorded => "recorded",
        }
    }

    /// Whether moving from `self` to `next` follows the task lifecycle.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Discovered | Self::Staged | Self::Compressed, Self::Failed)
                | (Self::Discovered, Self::Staged)
                | (Self::Staged, Self::Compressed)
                | (Self::Compressed, Self::Accepted | Self::Rejected)
                | (Self::Accepted | Self::Rejected, Self::Recorded)
        )
    }
}

/// One unit of work: a remote file and its slot-sized footprint in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    index: usize,
    remote_path: PathBuf,
    cache_path: PathBuf,
    state: TaskState,
}

impl FileTask {
    /// Create a discovered task. The cache path is the remote base name prefixed
    /// with the scan index, so equal base names never collide in the cache.
    #[must_use]
    pub fn new(index: usize, remote_path: PathBuf, cache_dir: &Path) -> Self {
        let base = remote_path
            .file_name()
            .map_or_else(|| OsString::from("unnamed"), ToOwned::to_owned);
        let mut cache_name = OsString::from(format!(
            "{index:0width$}-",
            width = CACHE_SEQUENCE_WIDTH
        ));
        cache_name.push(base);
        Self {
            index,
            cache_path: cache_dir.join(cache_name),
            remote_path,
            state: TaskState::Discovered,
        }
    }

    /// Position of the task in scan order.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Absolute path of the original file.
    #[must_use]
    pub fn remote_path(&self) -> &Path {
        &self.remote_path
    }

    /// Path of the staged copy inside the cache.
    #[must_use]
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid task transition {} -> {}",
            self.state.as_str(),
            next.as_str()
        );
        tracing::trace!(
            remote = %self.remote_path.display(),
            from = self.state.as_str(),
            to = next.as_str(),
            "task state changed"
        );
        self.state = next;
    }
}

/// Append the uncommitted-output marker to a path.
#[must_use]
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Directory inside `cache_dir` that only the pipeline writes to.
#[must_use]
pub fn staging_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join(STAGING_DIR_NAME)
}

/// Whether `name` is a staged copy or encoder temporary written by this pipeline
/// (`000042-scan.tif`, `000042-scan.tif.part`).
#[must_use]
pub fn is_cache_artifact(name: &str) -> bool {
    let name = name.strip_suffix(PART_SUFFIX).unwrap_or(name);
    name.split_once('-').is_some_and(|(sequence, base)| {
        sequence.len() == CACHE_SEQUENCE_WIDTH
            && sequence.bytes().all(|byte| byte.is_ascii_digit())
            && has_raster_extension(Path::new(base))
    })
}

/// Final location of an accepted output for `remote` under `mode`.
#[must_use]
pub fn destination_for(remote: &Path, mode: CommitMode) -> PathBuf {
    match mode {
        CommitMode::Replace => remote.to_path_buf(),
        CommitMode::PreserveBeside => {
            let parent = remote.parent().unwrap_or_else(|| Path::new("."));
            let name = remote.file_name().unwrap_or(remote.as_os_str());
            parent.join(COMPRESSED_DIR_NAME).join(name)
        }
    }
}

/// Policy outcome for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionDecision {
    /// Ratio exceeded the gate; output committed.
    Accepted,
    /// Ratio at or below the gate; original kept.
    Rejected,
    /// Processing failed; file retried on the next run.
    Failed,
}

impl CompressionDecision {
    /// Stable label for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

/// Ratio gate result for an encoded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioVerdict {
    /// Commit the output.
    Accept,
    /// Discard the output and keep the original.
    Reject,
}

impl RatioVerdict {
    /// Run outcome this verdict leads to once the file is handled.
    #[must_use]
    pub const fn decision(self) -> CompressionDecision {
        match self {
            Self::Accept => CompressionDecision::Accepted,
            Self::Reject => CompressionDecision::Rejected,
        }
    }
}

/// Sizes and gate verdict computed for one compressed file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompressionOutcome {
    /// Size of the staged original in bytes.
    pub original_size: u64,
    /// Size of the encoder output in bytes.
    pub compressed_size: u64,
    /// `original_size / compressed_size`.
    pub ratio: f64,
    /// Gate verdict.
    pub verdict: RatioVerdict,
}

impl CompressionOutcome {
    /// Apply the ratio gate. A ratio at or below `gate` is rejected; `None` accepts every output.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(original_size: u64, compressed_size: u64, gate: Option<f64>) -> Self {
        let ratio = if compressed_size == 0 {
            f64::INFINITY
        } else {
            original_size as f64 / compressed_size as f64
        };
        let verdict = match gate {
            Some(threshold) if ratio <= threshold => RatioVerdict::Reject,
            _ => RatioVerdict::Accept,
        };
        Self {
            original_size,
            compressed_size,
            ratio,
            verdict,
        }
    }

    /// Ratio rounded to two decimals for display.
    #[must_use]
    pub fn display_ratio(&self) -> f64 {
        (self.ratio * 100.0).round() / 100.0
    }
}

/// Aggregate result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Identifier attached to every log line of the run.
    pub run_id: Uuid,
    /// Canonical scan root.
    pub root: PathBuf,
    /// Candidates found, including files already in the ledger.
    pub total: usize,
    /// Candidates skipped because the ledger already records them.
    pub already_done: usize,
    /// Files handed to the stager.
    pub scheduled: usize,
    /// Leftover destination-side temporaries removed before staging.
    pub stale_parts_removed: usize,
    /// Files committed.
    pub accepted: usize,
    /// Files kept because the ratio gate rejected the output.
    pub rejected: usize,
    /// Files that failed and will be retried.
    pub failed: usize,
    /// Whether the run stopped early on request.
    pub cancelled: bool,
}

impl RunSummary {
    /// Empty summary for a run over `root`.
    #[must_use]
    pub const fn new(run_id: Uuid, root: PathBuf) -> Self {
        Self {
            run_id,
            root,
            total: 0,
            already_done: 0,
            scheduled: 0,
            stale_parts_removed: 0,
            accepted: 0,
            rejected: 0,
            failed: 0,
            cancelled: false,
        }
    }

    /// Count one terminal outcome.
    pub const fn record(&mut self, decision: CompressionDecision) {
        match decision {
            CompressionDecision::Accepted => self.accepted += 1,
            CompressionDecision::Rejected => self.rejected += 1,
            CompressionDecision::Failed => self.failed += 1,
        }
    }

    /// Files that reached a terminal outcome this run.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.accepted + self.rejected + self.failed
    }
}
