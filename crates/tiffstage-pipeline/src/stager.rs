//! Producer half of the pipeline: copies remote files into the staging cache.
//!
//! # Design
//! - Files are staged strictly in scan order; a slot is claimed before any byte
//!   is written to the cache.
//! - A failed copy gives its slot back before reporting, then staging moves on.
//! - The stager never waits for the compressor beyond the slot and channel bounds.

use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::FileError;
use crate::model::{FileTask, TaskState};
use crate::shutdown::ShutdownSignal;
use crate::stage::{StageMessage, StageSender, StagedFile, remove_if_present};

/// Counters reported by a finished stager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagerReport {
    /// Files copied into the cache and handed over.
    pub staged: usize,
    /// Files whose copy failed.
    pub failed: usize,
    /// Whether staging stopped before every task was attempted.
    pub stopped_early: bool,
}

/// Copies each scheduled remote file into the cache and hands it to the compressor.
#[derive(Debug)]
pub struct CacheStager {
    tasks: Vec<FileTask>,
    sender: StageSender,
    shutdown: ShutdownSignal,
}

impl CacheStager {
    /// Build a stager over `tasks`, which must already be in scan order.
    #[must_use]
    pub const fn new(tasks: Vec<FileTask>, sender: StageSender, shutdown: ShutdownSignal) -> Self {
        Self {
            tasks,
            sender,
            shutdown,
        }
    }

    /// Attempt every task once, then drop the sender so the compressor sees the end.
    pub async fn run(self) -> StagerReport {
        let Self {
            tasks,
            sender,
            shutdown,
        } = self;
        let mut report = StagerReport::default();

        for mut task in tasks {
            let slot = tokio::select! {
                biased;
                () = shutdown.cancelled() => None,
                slot = sender.acquire_slot() => slot,
            };
            let Some(slot) = slot else {
                report.stopped_early = true;
                break;
            };

            let message = match fs::copy(task.remote_path(), task.cache_path()).await {
                Ok(bytes) => {
                    debug!(
                        remote = %task.remote_path().display(),
                        cache = %task.cache_path().display(),
                        bytes,
                        "staged file"
                    );
                    task.advance(TaskState::Staged);
                    report.staged += 1;
                    StageMessage::Staged(StagedFile::new(task, slot))
                }
                Err(source) => {
                    remove_if_present(task.cache_path()).await;
                    slot.release();
                    warn!(
                        remote = %task.remote_path().display(),
                        error = %source,
                        "failed to stage file; it will be retried on the next run"
                    );
                    let error = FileError::Transfer {
                        remote: task.remote_path().to_path_buf(),
                        source,
                    };
                    task.advance(TaskState::Failed);
                    report.failed += 1;
                    StageMessage::TransferFailed { task, error }
                }
            };

            if let Err(returned) = sender.enqueue(message).await {
                if let StageMessage::Staged(staged) = returned {
                    staged.discard().await;
                }
                report.stopped_early = true;
                break;
            }
        }

        if report.stopped_early {
            info!(
                staged = report.staged,
                failed = report.failed,
                "stager stopped before attempting every file"
            );
        } else {
            debug!(staged = report.staged, failed = report.failed, "stager finished");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Dequeue, bounded_stage};
    use anyhow::{Result, bail};
    use std::num::NonZeroUsize;
    use std::time::Duration;

    fn capacity(value: usize) -> Result<NonZeroUsize> {
        NonZeroUsize::new(value).ok_or_else(|| anyhow::anyhow!("zero capacity"))
    }

    #[tokio::test]
    async fn stages_in_order_and_reports_missing_files() -> Result<()> {
        let remote = tempfile::tempdir()?;
        let cache = tempfile::tempdir()?;
        let present = remote.path().join("a.tif");
        std::fs::write(&present, b"raster")?;
        let tasks = vec![
            FileTask::new(0, present.clone(), cache.path()),
            FileTask::new(1, remote.path().join("gone.tif"), cache.path()),
        ];
        let (sender, mut receiver) = bounded_stage(capacity(2)?);

        let report = CacheStager::new(tasks, sender, ShutdownSignal::new())
            .run()
            .await;
        assert_eq!(report.staged, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.stopped_early);

        match receiver.dequeue(Duration::from_secs(1)).await {
            Dequeue::Message(StageMessage::Staged(staged)) => {
                assert_eq!(staged.task().remote_path(), present);
                assert_eq!(std::fs::read(staged.task().cache_path())?, b"raster");
                assert_eq!(staged.task().state(), TaskState::Staged);
            }
            other => bail!("expected staged file, got {other:?}"),
        }
        match receiver.dequeue(Duration::from_secs(1)).await {
            Dequeue::Message(StageMessage::TransferFailed { task, error }) => {
                assert_eq!(task.state(), TaskState::Failed);
                assert!(matches!(error, FileError::Transfer { .. }));
                assert!(!task.cache_path().exists());
            }
            other => bail!("expected transfer failure, got {other:?}"),
        }
        assert!(matches!(
            receiver.dequeue(Duration::from_secs(1)).await,
            Dequeue::Closed
        ));
        assert_eq!(receiver.resident(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_stager_stops_without_staging() -> Result<()> {
        let remote = tempfile::tempdir()?;
        let cache = tempfile::tempdir()?;
        let file = remote.path().join("a.tif");
        std::fs::write(&file, b"raster")?;
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let (sender, mut receiver) = bounded_stage(capacity(1)?);

        let report = CacheStager::new(
            vec![FileTask::new(0, file, cache.path())],
            sender,
            shutdown,
        )
        .run()
        .await;

        assert!(report.stopped_early);
        assert_eq!(report.staged, 0);
        assert!(matches!(
            receiver.dequeue(Duration::from_secs(1)).await,
            Dequeue::Closed
        ));
        Ok(())
    }
}
