//! Run orchestration: ledger, scan, and the two concurrent workers.
//!
//! # Design
//! - Ledger loading, scanning, and stale-temporary cleanup happen before any
//!   worker starts; the stager and compressor then share one bounded stage.
//! - The run resolves once the compressor has an outcome for every scheduled
//!   file, a stall is detected, or cancellation is requested.
//! - Every log line of a run sits inside a `run` span carrying its `run_id`.
//! - Staged copies live in a dedicated directory inside the cache, so leftovers
//!   of a crashed run can be swept without touching anything the user keeps
//!   in the cache directory, even when that directory is the scan root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tiffstage_config::{InputTarget, PipelineConfig};
use tokio::fs;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::codec::Codec;
use crate::compressor::Compressor;
use crate::error::{PipelineError, PipelineResult};
use crate::ledger::Ledger;
use crate::model::{
    FileTask, RunSummary, destination_for, is_cache_artifact, part_path, staging_dir,
};
use crate::scanner::{ScanReport, scan};
use crate::shutdown::ShutdownSignal;
use crate::stage::{bounded_stage, remove_if_present};
use crate::stager::CacheStager;

/// Staged compression pipeline over one folder or file.
#[derive(Debug)]
pub struct Pipeline<C: Codec + ?Sized + 'static> {
    config: Arc<PipelineConfig>,
    codec: Arc<C>,
    shutdown: ShutdownSignal,
}

impl<C: Codec + ?Sized + 'static> Pipeline<C> {
    /// Build a pipeline. `config` is expected to have passed validation.
    #[must_use]
    pub fn new(config: PipelineConfig, codec: Arc<C>) -> Self {
        Self {
            config: Arc::new(config),
            codec,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Share an existing stop signal instead of the pipeline's own.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Handle that stops the run cooperatively when triggered.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run to completion.
    ///
    /// Files that fail are counted in the summary and left for the next run;
    /// they never make the run itself fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or cache cannot be prepared, the ledger is
    /// unavailable, the scan root cannot be read, a worker panics, or the
    /// compressor stalls.
    pub async fn run(&self) -> PipelineResult<RunSummary> {
        let run_id = Uuid::new_v4();
        let target = self.config.target.path();
        let target = target
            .canonicalize()
            .map_err(|source| PipelineError::io("run.resolve_target", target, source))?;
        let root = match &self.config.target {
            InputTarget::Folder(_) => target.clone(),
            InputTarget::File(_) => target
                .parent()
                .map_or_else(|| target.clone(), Path::to_path_buf),
        };

        let span = info_span!("run", %run_id, root = %root.display());
        self.execute(run_id, root, target).instrument(span).await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        root: PathBuf,
        target: PathBuf,
    ) -> PipelineResult<RunSummary> {
        let cache_dir = &self.config.cache_dir;
        fs::create_dir_all(cache_dir)
            .await
            .map_err(|source| PipelineError::io("cache.create", cache_dir, source))?;
        let cache_dir = cache_dir
            .canonicalize()
            .map_err(|source| PipelineError::io("cache.resolve", cache_dir, source))?;
        let staging = staging_dir(&cache_dir);
        fs::create_dir_all(&staging)
            .await
            .map_err(|source| PipelineError::io("cache.create_staging", &staging, source))?;

        clear_cache_leftovers(&staging).await;

        let summary = self
            .schedule(run_id, root, target, &cache_dir, &staging)
            .await?;
        release_staging_dir(&staging).await;
        Ok(summary)
    }

    async fn schedule(
        &self,
        run_id: Uuid,
        root: PathBuf,
        target: PathBuf,
        cache_dir: &Path,
        staging: &Path,
    ) -> PipelineResult<RunSummary> {
        let ledger = Ledger::open(&root)?;
        let report = match self.config.target {
            InputTarget::Folder(_) => scan(&root, &ledger, cache_dir)?,
            InputTarget::File(_) => self.plan_single(&target, &ledger),
        };

        let mut summary = RunSummary::new(run_id, root);
        summary.total = report.total();
        summary.already_done = report.already_done;
        summary.scheduled = report.candidates.len();
        summary.stale_parts_removed = remove_stale_parts(&report.stale_parts).await;
        info!(
            total = summary.total,
            already_done = summary.already_done,
            scheduled = summary.scheduled,
            stale_parts_removed = summary.stale_parts_removed,
            "scan complete"
        );

        if summary.scheduled == 0 {
            info!("nothing to compress");
            return Ok(summary);
        }

        let tasks = report
            .candidates
            .into_iter()
            .enumerate()
            .map(|(index, remote)| FileTask::new(index, remote, staging))
            .collect();
        let (sender, receiver) = bounded_stage(self.config.stage_capacity);

        let stager = tokio::spawn(
            CacheStager::new(tasks, sender, self.shutdown.clone())
                .run()
                .in_current_span(),
        );
        let compressor = tokio::spawn(
            Compressor::new(
                Arc::clone(&self.codec),
                Arc::clone(&self.config),
                ledger,
                receiver,
                self.shutdown.clone(),
                summary,
            )
            .run()
            .in_current_span(),
        );

        let outcome = compressor
            .await
            .map_err(|source| PipelineError::Worker {
                worker: "compressor",
                source,
            })
            .and_then(|result| result);
        let summary = match outcome {
            Ok(summary) => summary,
            Err(err) => {
                stager.abort();
                return Err(err);
            }
        };

        let staged = stager.await.map_err(|source| PipelineError::Worker {
            worker: "stager",
            source,
        })?;
        debug!(
            staged = staged.staged,
            transfer_failures = staged.failed,
            "stager joined"
        );

        info!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "run complete"
        );
        Ok(summary)
    }

    fn plan_single(&self, file: &Path, ledger: &Ledger) -> ScanReport {
        let mut report = ScanReport::default();
        let stale = part_path(&destination_for(file, self.config.commit_mode));
        if stale.is_file() {
            report.stale_parts.push(stale);
        }
        if ledger.contains(file) {
            info!(remote = %file.display(), "file already listed in ledger; skipping");
            report.already_done = 1;
        } else {
            report.candidates.push(file.to_path_buf());
        }
        report
    }
}

async fn clear_cache_leftovers(staging: &Path) {
    let mut entries = match fs::read_dir(staging).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(staging = %staging.display(), error = %err, "failed to list staging directory");
            return;
        }
    };
    let mut removed = 0_usize;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry
            .file_type()
            .await
            .is_ok_and(|kind| kind.is_file());
        let name = entry.file_name();
        if is_file && name.to_str().is_some_and(is_cache_artifact) {
            remove_if_present(&entry.path()).await;
            removed += 1;
        }
    }
    if removed > 0 {
        info!(
            staging = %staging.display(),
            removed,
            "removed staged copies left by an earlier run"
        );
    }
}

async fn release_staging_dir(staging: &Path) {
    if let Err(err) = fs::remove_dir(staging).await {
        debug!(staging = %staging.display(), error = %err, "staging directory left in place");
    }
}

async fn remove_stale_parts(stale: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in stale {
        match fs::remove_file(path).await {
            Ok(()) => {
                info!(path = %path.display(), "removed leftover temporary from interrupted commit");
                removed += 1;
            }
            Err(err) => warn!(
                path = %path.display(),
                error = %err,
                "failed to remove leftover temporary"
            ),
        }
    }
    removed
}
