#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Staged, bounded, resumable batch compression of raster files on network storage.
//!
//! A scan produces the task list, a cache stager copies files into a bounded
//! local cache, and a single compressor encodes, gates, commits, and records
//! each file in the ledger so interrupted runs resume where they stopped.
//!
//! Layout: `ledger.rs`, `scanner.rs`, `stage.rs` (bounded handoff), `stager.rs`,
//! `compressor.rs`, `commit.rs` (atomic placement), `codec.rs` (encoder boundary),
//! `coordinator.rs`, `shutdown.rs`, `model.rs`, `error.rs`.

pub mod codec;
pub mod commit;
pub mod compressor;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod model;
pub mod scanner;
pub mod shutdown;
pub mod stage;
pub mod stager;

pub use codec::{Codec, CommandCodec, EncodeRequest};
pub use coordinator::Pipeline;
pub use error::{
    CodecError, CommitError, FileError, PipelineError, PipelineResult, error_chain,
};
pub use ledger::Ledger;
pub use model::{
    CompressionDecision, CompressionOutcome, FileTask, RatioVerdict, RunSummary, TaskState,
    staging_dir,
};
pub use shutdown::ShutdownSignal;
