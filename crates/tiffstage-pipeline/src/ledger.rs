//! Durable, append-only record of remote files that reached a recorded outcome.
//!
//! # Design
//! - One UTF-8 path per line, each terminated by `\n`, stored at the scan root.
//! - An unterminated trailing fragment is the footprint of an interrupted append:
//!   it is ignored on load and truncated away so the next append starts on a
//!   fresh line.
//! - Every append is flushed with `sync_data` so a crash loses at most the file
//!   in flight.
//! - The compressor owns the only `Ledger` during a run; there is no locking.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tiffstage_config::LEDGER_FILE_NAME;
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};

/// Loaded ledger plus an append handle.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    file: File,
    entries: HashSet<String>,
}

impl Ledger {
    /// Open (creating if absent) the ledger stored at `root` and load its entries.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Ledger`] if the file cannot be opened, read, or repaired.
    pub fn open(root: &Path) -> PipelineResult<Self> {
        let path = root.join(LEDGER_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|source| PipelineError::ledger("ledger.open", &path, source))?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .map_err(|source| PipelineError::ledger("ledger.read", &path, source))?;

        let (entries, valid_len) = parse_entries(&raw);
        if valid_len < raw.len() {
            warn!(
                ledger = %path.display(),
                dropped_bytes = raw.len() - valid_len,
                "discarding unterminated trailing ledger entry"
            );
            file.set_len(valid_len as u64)
                .map_err(|source| PipelineError::ledger("ledger.truncate", &path, source))?;
        }

        if !entries.is_empty() {
            info!(
                ledger = %path.display(),
                recorded = entries.len(),
                "skipping files already listed in ledger"
            );
        }

        Ok(Self {
            path,
            file,
            entries,
        })
    }

    /// Location of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of recorded paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `remote` has already been recorded.
    #[must_use]
    pub fn contains(&self, remote: &Path) -> bool {
        ledger_key(remote).is_some_and(|key| self.entries.contains(key))
    }

    /// Durably append `remote`. Returns `false` when it was already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PathNotRecordable`] for paths that cannot be one
    /// ledger line, and [`PipelineError::Ledger`] if the write or flush fails.
    pub fn append(&mut self, remote: &Path) -> PipelineResult<bool> {
        let key = ledger_key(remote).ok_or_else(|| PipelineError::PathNotRecordable {
            path: remote.to_path_buf(),
        })?;
        if self.entries.contains(key) {
            return Ok(false);
        }

        let mut line = String::with_capacity(key.len() + 1);
        line.push_str(key);
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .map_err(|source| PipelineError::ledger("ledger.append", &self.path, source))?;
        self.file
            .sync_data()
            .map_err(|source| PipelineError::ledger("ledger.sync", &self.path, source))?;

        self.entries.insert(key.to_owned());
        Ok(true)
    }
}

/// Ledger representation of `path`, or `None` when it cannot be one line.
pub(crate) fn ledger_key(path: &Path) -> Option<&str> {
    path.to_str()
        .filter(|key| !key.is_empty() && !key.contains(['\n', '\r']))
}

fn parse_entries(raw: &[u8]) -> (HashSet<String>, usize) {
    let valid_len = raw
        .iter()
        .rposition(|byte| *byte == b'\n')
        .map_or(0, |position| position + 1);
    let entries = raw[..valid_len]
        .split(|byte| *byte == b'\n')
        .filter(|line| !line.is_empty())
        .filter_map(|line| std::str::from_utf8(line).ok())
        .map(ToOwned::to_owned)
        .collect();
    (entries, valid_len)
}
