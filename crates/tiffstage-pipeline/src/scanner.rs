//! Candidate discovery below a scan root.
//!
//! # Design
//! - Walk in file-name order so runs over an unchanged tree schedule files identically.
//! - Prune output directories from earlier preserve-mode runs, the pipeline's
//!   staging directory, and the cache when it lives below the root, so a run
//!   never ingests its own files.
//! - Report destination-side `.part` leftovers from interrupted commits so the
//!   coordinator can remove them.

use std::fs;
use std::path::{Path, PathBuf};

use tiffstage_config::{
    COMPRESSED_DIR_NAME, PART_SUFFIX, STAGING_DIR_NAME, has_raster_extension,
};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::error::{PipelineError, PipelineResult};
use crate::ledger::{Ledger, ledger_key};

/// Result of scanning one root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Files to process, in scan order, excluding ledger hits.
    pub candidates: Vec<PathBuf>,
    /// Matching files skipped because the ledger records them.
    pub already_done: usize,
    /// Leftover `<raster>.part` files from interrupted commits.
    pub stale_parts: Vec<PathBuf>,
}

impl ScanReport {
    /// Candidates plus ledger hits.
    #[must_use]
    pub fn total(&self) -> usize {
        self.candidates.len() + self.already_done
    }
}

/// Recursively collect raster files under `root` that the ledger does not record.
///
/// `cache_dir` is pruned when it lies below `root`; staging directories are
/// pruned wherever they appear, including when `cache_dir` is `root` itself.
///
/// # Errors
///
/// Returns [`PipelineError::Walkdir`] if the root itself cannot be read. Errors
/// below the root are logged and the affected entries skipped.
pub fn scan(root: &Path, ledger: &Ledger, cache_dir: &Path) -> PipelineResult<ScanReport> {
    let pruned_cache = cache_inside_root(root, cache_dir);
    let mut output_dirs = Vec::new();
    let mut report = ScanReport::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() || entry.depth() == 0 {
                return true;
            }
            if entry.file_name() == COMPRESSED_DIR_NAME {
                output_dirs.push(entry.path().to_path_buf());
                return false;
            }
            if entry.file_name() == STAGING_DIR_NAME {
                return false;
            }
            pruned_cache
                .as_deref()
                .is_none_or(|cache| entry.path() != cache)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(PipelineError::walkdir("scan.walk", root, err));
            }
            Err(err) => {
                warn!(
                    path = ?err.path(),
                    error = %err,
                    "skipping unreadable entry during scan"
                );
                continue;
            }
        };
        classify(&entry, ledger, &mut report);
    }

    for dir in output_dirs {
        collect_stale_parts(&dir, &mut report.stale_parts);
    }

    Ok(report)
}

fn classify(entry: &DirEntry, ledger: &Ledger, report: &mut ScanReport) {
    if !entry.file_type().is_file() {
        return;
    }
    let path = entry.path();
    if is_stale_part(path) {
        report.stale_parts.push(path.to_path_buf());
        return;
    }
    if !has_raster_extension(path) {
        return;
    }
    if ledger_key(path).is_none() {
        warn!(
            path = %path.display(),
            "skipping file whose path cannot be recorded in the ledger"
        );
        return;
    }
    if ledger.contains(path) {
        report.already_done += 1;
    } else {
        report.candidates.push(path.to_path_buf());
    }
}

/// Whether `path` is `<something>.<raster ext>.part`.
pub(crate) fn is_stale_part(path: &Path) -> bool {
    path.to_str()
        .and_then(|name| name.strip_suffix(PART_SUFFIX))
        .is_some_and(|stem| has_raster_extension(Path::new(stem)))
}

fn collect_stale_parts(dir: &Path, stale: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "failed to list output directory");
            return;
        }
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
        .map(|entry| entry.path())
        .filter(|path| is_stale_part(path))
        .collect();
    found.sort();
    stale.extend(found);
}

fn cache_inside_root(root: &Path, cache_dir: &Path) -> Option<PathBuf> {
    let root_abs = root.canonicalize().ok()?;
    let cache_abs = cache_dir.canonicalize().ok()?;
    if cache_abs == root_abs {
        return None;
    }
    let relative = cache_abs.strip_prefix(&root_abs).ok()?;
    Some(root.join(relative))
}
