//! Temporary directory trees populated with fake raster files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A scratch directory that is removed when dropped.
#[derive(Debug)]
pub struct RasterTree {
    root: TempDir,
}

impl RasterTree {
    /// Create an empty tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            root: tempfile::tempdir()?,
        })
    }

    /// Root directory as created.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Root directory with symlinks resolved, as the pipeline reports it.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be resolved.
    pub fn canonical_root(&self) -> io::Result<PathBuf> {
        self.root.path().canonicalize()
    }

    /// Write a file of `size` bytes at `relative`, creating parent directories.
    ///
    /// Content is deterministic and differs between paths, so tests can tell
    /// an untouched original from a rewritten one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parents cannot be written.
    pub fn add(&self, relative: &str, size: usize) -> io::Result<PathBuf> {
        let path = self.root.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, pattern(relative, size))?;
        Ok(path)
    }

    /// Add `count` files named `scan-000.tif`, `scan-001.tif`, … of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be written.
    pub fn add_many(&self, count: usize, size: usize) -> io::Result<Vec<PathBuf>> {
        (0..count)
            .map(|index| self.add(&format!("scan-{index:03}.tif"), size))
            .collect()
    }
}

/// Deterministic content for a fixture file.
#[must_use]
pub fn pattern(seed: &str, size: usize) -> Vec<u8> {
    let offset = seed.bytes().fold(0_u8, u8::wrapping_add);
    (0..size)
        .map(|index| offset.wrapping_add(index.to_le_bytes()[0]))
        .collect()
}

/// Every line of the ledger stored at `root`, in file order.
///
/// A missing ledger yields no lines.
///
/// # Errors
///
/// Returns an error if the ledger exists but cannot be read.
pub fn ledger_lines(root: &Path, ledger_name: &str) -> io::Result<Vec<String>> {
    match fs::read_to_string(root.join(ledger_name)) {
        Ok(raw) => Ok(raw.lines().map(ToOwned::to_owned).collect()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}
