//! Bounded staging area between the cache stager and the compressor.
//!
//! # Design
//! - A counting pool of `capacity` slots bounds how many files sit in the cache.
//!   A slot is an owned semaphore permit that travels with the staged file and
//!   is released when dropped, so every exit path releases it exactly once.
//! - A bounded FIFO channel of the same capacity carries the handoff messages.
//! - Transfer failures travel through the same channel so the compressor is the
//!   single place that counts outcomes.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::warn;

use crate::error::FileError;
use crate::model::FileTask;

/// One occupied place in the staging cache.
#[derive(Debug)]
pub struct StageSlot {
    _permit: OwnedSemaphorePermit,
}

impl StageSlot {
    /// Give the slot back to the pool.
    pub fn release(self) {
        drop(self);
    }
}

/// A file copied into the cache, holding its slot.
#[derive(Debug)]
pub struct StagedFile {
    task: FileTask,
    slot: StageSlot,
}

impl StagedFile {
    /// Pair a staged task with the slot it occupies.
    #[must_use]
    pub const fn new(task: FileTask, slot: StageSlot) -> Self {
        Self { task, slot }
    }

    /// The staged task.
    #[must_use]
    pub const fn task(&self) -> &FileTask {
        &self.task
    }

    /// Split into the task and its slot.
    #[must_use]
    pub fn into_parts(self) -> (FileTask, StageSlot) {
        (self.task, self.slot)
    }

    /// Delete the staged copy and release the slot without processing it.
    pub async fn discard(self) {
        let (task, slot) = self.into_parts();
        remove_if_present(task.cache_path()).await;
        slot.release();
    }
}

/// Handoff message from stager to compressor.
#[derive(Debug)]
pub enum StageMessage {
    /// A file is ready in the cache.
    Staged(StagedFile),
    /// Staging failed; the slot has already been released.
    TransferFailed {
        /// Task that could not be staged.
        task: FileTask,
        /// Reason for the failure.
        error: FileError,
    },
}

/// Result of waiting for the next message.
#[derive(Debug)]
pub enum Dequeue {
    /// The next message in FIFO order.
    Message(StageMessage),
    /// The stager finished and every message has been consumed.
    Closed,
    /// Nothing arrived within the wait bound.
    TimedOut,
}

/// Producer half of the bounded stage.
#[derive(Debug, Clone)]
pub struct StageSender {
    slots: Arc<Semaphore>,
    queue: mpsc::Sender<StageMessage>,
}

/// Consumer half of the bounded stage.
#[derive(Debug)]
pub struct StageReceiver {
    slots: Arc<Semaphore>,
    queue: mpsc::Receiver<StageMessage>,
    capacity: usize,
}

/// Create a stage that holds at most `capacity` files.
#[must_use]
pub fn bounded_stage(capacity: NonZeroUsize) -> (StageSender, StageReceiver) {
    let slots = Arc::new(Semaphore::new(capacity.get()));
    let (sender, receiver) = mpsc::channel(capacity.get());
    (
        StageSender {
            slots: Arc::clone(&slots),
            queue: sender,
        },
        StageReceiver {
            slots,
            queue: receiver,
            capacity: capacity.get(),
        },
    )
}

impl StageSender {
    /// Wait until fewer than `capacity` files are staged and claim a slot.
    ///
    /// Returns `None` once the consumer has shut the stage down.
    pub async fn acquire_slot(&self) -> Option<StageSlot> {
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .ok()
            .map(|permit| StageSlot { _permit: permit })
    }

    /// Hand a message to the compressor in FIFO order.
    ///
    /// # Errors
    ///
    /// Returns the message back when the compressor is gone.
    pub async fn enqueue(&self, message: StageMessage) -> Result<(), StageMessage> {
        self.queue.send(message).await.map_err(|err| err.0)
    }
}

impl StageReceiver {
    /// Wait up to `wait` for the next message.
    pub async fn dequeue(&mut self, wait: Duration) -> Dequeue {
        match tokio::time::timeout(wait, self.queue.recv()).await {
            Ok(Some(message)) => Dequeue::Message(message),
            Ok(None) => Dequeue::Closed,
            Err(_elapsed) => Dequeue::TimedOut,
        }
    }

    /// Number of slots currently held.
    #[must_use]
    pub fn resident(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Stop accepting work, then discard everything still queued.
    ///
    /// Closing the pool wakes a stager blocked on [`StageSender::acquire_slot`].
    pub async fn shut_down(&mut self) -> usize {
        self.slots.close();
        self.queue.close();
        let mut discarded = 0;
        while let Some(message) = self.queue.recv().await {
            if let StageMessage::Staged(staged) = message {
                staged.discard().await;
            }
            discarded += 1;
        }
        discarded
    }
}

pub(crate) async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to remove cache file");
        }
    }
}
