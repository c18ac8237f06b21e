//! Consumer half of the pipeline: encodes, gates, commits, and records each staged file.
//!
//! # Design
//! - Consumes the stage strictly in FIFO order until every scheduled file has a
//!   terminal outcome.
//! - Every per-file failure is converted into [`CompressionDecision::Failed`] at
//!   the file boundary; only a stall, a vanished stager, or cancellation end the loop early.
//! - The slot for a file is released only after its cache copy and temporary
//!   output are gone, so cache residency never exceeds the stage capacity.
//! - The compressor is the only ledger writer.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tiffstage_config::PipelineConfig;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::codec::{Codec, EncodeRequest};
use crate::commit::commit_output;
use crate::error::{CodecError, FileError, PipelineError, PipelineResult, error_chain};
use crate::ledger::Ledger;
use crate::model::{
    CompressionDecision, CompressionOutcome, FileTask, RatioVerdict, RunSummary, TaskState,
    destination_for, part_path,
};
use crate::shutdown::ShutdownSignal;
use crate::stage::{Dequeue, StageMessage, StageReceiver, StagedFile, remove_if_present};

/// Single consumer of the bounded stage.
#[derive(Debug)]
pub struct Compressor<C: Codec + ?Sized> {
    codec: Arc<C>,
    config: Arc<PipelineConfig>,
    ledger: Ledger,
    receiver: StageReceiver,
    shutdown: ShutdownSignal,
    summary: RunSummary,
}

impl<C: Codec + ?Sized> Compressor<C> {
    /// Build a compressor that will consume `summary.scheduled` files.
    ///
    /// `summary` arrives with the scan counters filled in; the compressor adds
    /// the per-file outcomes.
    #[must_use]
    pub const fn new(
        codec: Arc<C>,
        config: Arc<PipelineConfig>,
        ledger: Ledger,
        receiver: StageReceiver,
        shutdown: ShutdownSignal,
        summary: RunSummary,
    ) -> Self {
        Self {
            codec,
            config,
            ledger,
            receiver,
            shutdown,
            summary,
        }
    }

    /// Process staged files until every scheduled file has an outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StallTimeout`] when nothing is staged within the
    /// configured bound while files remain, and [`PipelineError::StagerDisconnected`]
    /// when the stager ends without handing over every file.
    pub async fn run(mut self) -> PipelineResult<RunSummary> {
        let wait = self.config.stall_timeout;
        let mut outstanding = self.summary.scheduled;

        while outstanding > 0 {
            let next = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => None,
                next = self.receiver.dequeue(wait) => Some(next),
            };

            match next {
                Some(Dequeue::Message(message)) => {
                    let decision = self.handle(message).await;
                    self.summary.record(decision);
                    outstanding -= 1;
                    info!(
                        processed = self.summary.already_done + self.summary.processed(),
                        total = self.summary.total,
                        resident = self.receiver.resident(),
                        "progress"
                    );
                }
                None => {
                    self.cancel(outstanding).await;
                    break;
                }
                Some(Dequeue::Closed) if self.shutdown.is_triggered() => {
                    self.cancel(outstanding).await;
                    break;
                }
                Some(Dequeue::Closed) => {
                    self.receiver.shut_down().await;
                    return Err(PipelineError::StagerDisconnected { outstanding });
                }
                Some(Dequeue::TimedOut) => {
                    self.receiver.shut_down().await;
                    return Err(PipelineError::StallTimeout {
                        waited: wait,
                        outstanding,
                    });
                }
            }
        }

        Ok(self.summary)
    }

    async fn cancel(&mut self, outstanding: usize) {
        let discarded = self.receiver.shut_down().await;
        self.summary.cancelled = true;
        info!(
            outstanding,
            discarded, "cancellation requested; stopping after the current file"
        );
    }

    async fn handle(&mut self, message: StageMessage) -> CompressionDecision {
        match message {
            StageMessage::TransferFailed { task, error } => {
                report_failure(&task, &error);
                CompressionDecision::Failed
            }
            StageMessage::Staged(staged) => self.process(staged).await,
        }
    }

    async fn process(&mut self, staged: StagedFile) -> CompressionDecision {
        let (mut task, slot) = staged.into_parts();
        let result = self.compress(&mut task).await;

        remove_if_present(task.cache_path()).await;
        remove_if_present(&part_path(task.cache_path())).await;
        slot.release();

        match result {
            Ok(outcome) => {
                self.record(&mut task, &outcome);
                outcome.verdict.decision()
            }
            Err(error) => {
                task.advance(TaskState::Failed);
                report_failure(&task, &error);
                CompressionDecision::Failed
            }
        }
    }

    async fn compress(&self, task: &mut FileTask) -> Result<CompressionOutcome, FileError> {
        let input = task.cache_path().to_path_buf();
        let output = part_path(&input);

        let original_size = fs::metadata(&input)
            .await
            .map_err(|source| FileError::io("compress.original_size", &input, source))?
            .len();

        let request = EncodeRequest::new(&input, &output, &self.config.encode);
        self.codec
            .encode(&request)
            .await
            .map_err(|source| FileError::Codec {
                remote: task.remote_path().to_path_buf(),
                source,
            })?;

        remove_if_present(&input).await;
        let compressed_size = output_size(&output)
            .await
            .map_err(|source| FileError::Codec {
                remote: task.remote_path().to_path_buf(),
                source,
            })?;
        task.advance(TaskState::Compressed);

        let outcome =
            CompressionOutcome::evaluate(original_size, compressed_size, self.config.ratio_gate);
        match outcome.verdict {
            RatioVerdict::Accept => {
                let destination = destination_for(task.remote_path(), self.config.commit_mode);
                if let Err(source) = commit_output(&output, &destination).await {
                    return Err(FileError::Commit {
                        destination,
                        source,
                    });
                }
                task.advance(TaskState::Accepted);
            }
            RatioVerdict::Reject => {
                remove_if_present(&output).await;
                task.advance(TaskState::Rejected);
            }
        }
        Ok(outcome)
    }

    fn record(&mut self, task: &mut FileTask, outcome: &CompressionOutcome) {
        let remote = task.remote_path();
        match outcome.verdict {
            RatioVerdict::Accept => info!(
                remote = %remote.display(),
                ratio = outcome.display_ratio(),
                original_size = outcome.original_size,
                compressed_size = outcome.compressed_size,
                "compressed file"
            ),
            RatioVerdict::Reject => info!(
                remote = %remote.display(),
                ratio = outcome.display_ratio(),
                threshold = ?self.config.ratio_gate,
                "compression ratio below threshold; keeping original"
            ),
        }

        match self.ledger.append(remote) {
            Ok(true) => task.advance(TaskState::Recorded),
            Ok(false) => {
                debug!(remote = %remote.display(), "file already recorded in ledger");
                task.advance(TaskState::Recorded);
            }
            Err(err) => warn!(
                remote = %remote.display(),
                error = %error_chain(&err),
                "failed to record file in ledger; it will be processed again on the next run"
            ),
        }
    }
}

async fn output_size(output: &Path) -> Result<u64, CodecError> {
    match fs::metadata(output).await {
        Ok(metadata) if metadata.len() == 0 => Err(CodecError::EmptyOutput {
            output: output.to_path_buf(),
        }),
        Ok(metadata) => Ok(metadata.len()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(CodecError::MissingOutput {
            output: output.to_path_buf(),
        }),
        Err(err) => Err(CodecError::Other {
            message: err.to_string(),
        }),
    }
}

fn report_failure(task: &FileTask, error: &FileError) {
    warn!(
        remote = %task.remote_path().display(),
        error = %error_chain(error),
        "failed to compress file"
    );
}
