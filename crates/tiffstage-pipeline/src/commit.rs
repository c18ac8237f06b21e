//! Atomic placement of accepted outputs at their destination.
//!
//! # Design
//! - Try a plain `rename` first; it succeeds when cache and destination share a
//!   filesystem and is atomic there.
//! - Otherwise copy into `<destination>.part` on the destination filesystem and
//!   `rename` that onto the destination, so observers only ever see the old or
//!   the complete new content.
//! - Destinations that refuse the attribute-preserving copy
//!   ([`CommitError::UnsupportedFilesystemOperation`]) get one retry as a plain
//!   content copy.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::CommitError;
use crate::model::part_path;
use crate::stage::remove_if_present;

/// Move `output` onto `destination` atomically.
///
/// On success `output` no longer exists. On failure the destination is
/// untouched and no destination-side temporary is left behind; `output` is
/// left for the caller to clean up.
///
/// # Errors
///
/// Returns [`CommitError::Io`] when the copy (including the unsupported-attribute
/// retry) or the final rename fails.
pub async fn commit_output(output: &Path, destination: &Path) -> Result<(), CommitError> {
    commit_with(output, destination, preserving_copy).await
}

type CopyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CommitError>> + Send + 'a>>;

/// First copy attempt onto the destination filesystem.
type Copier = for<'a> fn(&'a Path, &'a Path) -> CopyFuture<'a>;

fn preserving_copy<'a>(source_path: &'a Path, staging: &'a Path) -> CopyFuture<'a> {
    Box::pin(copy_preserving(source_path, staging))
}

async fn commit_with(
    output: &Path,
    destination: &Path,
    copier: Copier,
) -> Result<(), CommitError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| CommitError::io("commit.create_parent", parent, source))?;
    }

    match fs::rename(output, destination).await {
        Ok(()) => {
            debug!(destination = %destination.display(), "committed by rename");
            return Ok(());
        }
        Err(err) => {
            debug!(
                destination = %destination.display(),
                error = %err,
                "rename unavailable; committing through destination-side temporary"
            );
        }
    }

    let staging = part_path(destination);
    if let Err(err) = copy_with_fallback(output, &staging, copier).await {
        remove_if_present(&staging).await;
        return Err(err);
    }

    if let Err(source) = fs::rename(&staging, destination).await {
        remove_if_present(&staging).await;
        return Err(CommitError::io("commit.rename", destination, source));
    }

    remove_if_present(output).await;
    Ok(())
}

async fn copy_with_fallback(
    source_path: &Path,
    staging: &Path,
    copier: Copier,
) -> Result<(), CommitError> {
    match copier(source_path, staging).await {
        Ok(()) => Ok(()),
        Err(CommitError::UnsupportedFilesystemOperation { path, source }) => {
            warn!(
                path = %path.display(),
                error = %source,
                "destination does not support copying attributes; retrying content only"
            );
            remove_if_present(staging).await;
            copy_content_only(source_path, staging).await
        }
        Err(err) => Err(err),
    }
}

async fn copy_preserving(source_path: &Path, staging: &Path) -> Result<(), CommitError> {
    fs::copy(source_path, staging)
        .await
        .map_err(|source| classify_copy_error(staging, source))?;
    let file = File::open(staging)
        .await
        .map_err(|source| CommitError::io("commit.reopen", staging, source))?;
    file.sync_all()
        .await
        .map_err(|source| classify_copy_error(staging, source))
}

async fn copy_content_only(source_path: &Path, staging: &Path) -> Result<(), CommitError> {
    let mut reader = File::open(source_path)
        .await
        .map_err(|source| CommitError::io("commit.open_output", source_path, source))?;
    let mut writer = File::create(staging)
        .await
        .map_err(|source| CommitError::io("commit.create_temporary", staging, source))?;
    tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(|source| CommitError::io("commit.copy_content", staging, source))?;
    writer
        .flush()
        .await
        .map_err(|source| CommitError::io("commit.flush", staging, source))?;
    writer
        .sync_all()
        .await
        .map_err(|source| CommitError::io("commit.sync", staging, source))
}

fn classify_copy_error(staging: &Path, source: io::Error) -> CommitError {
    if is_unsupported_operation(&source) {
        CommitError::UnsupportedFilesystemOperation {
            path: staging.to_path_buf(),
            source,
        }
    } else {
        CommitError::io("commit.copy", staging, source)
    }
}

/// Whether `err` means the filesystem does not support the requested operation
/// (`EOPNOTSUPP`, as raised by SMB shares refusing permission bits).
#[must_use]
pub fn is_unsupported_operation(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::Unsupported {
        return true;
    }
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        err.raw_os_error()
            .is_some_and(|code| Errno::from_raw(code) == Errno::EOPNOTSUPP)
    }
    #[cfg(not(unix))]
    {
        false
    }
}
