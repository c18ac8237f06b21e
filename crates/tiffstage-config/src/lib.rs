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

//! Immutable run configuration for the staged compression pipeline.
//!
//! Layout: `model.rs` (typed configuration and enums), `defaults.rs` (fixed
//! filesystem names and tunable defaults), `validate.rs` (validation rules),
//! `error.rs` (`ConfigError`).

pub mod defaults;
pub mod error;
pub mod model;
pub mod validate;

pub use defaults::{
    CACHE_SEQUENCE_WIDTH, COMPRESSED_DIR_NAME, DEFAULT_CODEC_PROGRAM, DEFAULT_QUALITY,
    DEFAULT_RATIO_THRESHOLD, DEFAULT_STAGE_CAPACITY, DEFAULT_STALL_TIMEOUT, LEDGER_FILE_NAME,
    PART_SUFFIX, RASTER_EXTENSIONS, STAGING_DIR_NAME, has_raster_extension,
};
pub use error::{ConfigError, ConfigResult};
pub use model::{Algorithm, CommitMode, EncodeSettings, InputTarget, PipelineConfig};
