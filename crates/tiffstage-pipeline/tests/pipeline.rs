//! End-to-end runs of the pipeline against temporary trees.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::{ScaledCodec, folder_config, resident_files, staging_entries};
use tiffstage_config::{COMPRESSED_DIR_NAME, CommitMode, LEDGER_FILE_NAME};
use tiffstage_pipeline::{Pipeline, ShutdownSignal};
use tiffstage_test_support::fixtures::{RasterTree, ledger_lines};

#[tokio::test]
async fn ratio_below_threshold_keeps_original_and_records_it() -> Result<()> {
    let tree = RasterTree::new()?;
    let original = tree.add("scan.tif", 1000)?;
    let before = std::fs::read(&original)?;
    let cache = tempfile::tempdir()?;
    let codec = Arc::new(ScaledCodec::new(7, 10, cache.path()));

    let summary = Pipeline::new(folder_config(tree.root(), cache.path(), 3), Arc::clone(&codec))
        .run()
        .await?;

    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.accepted, 0);
    assert_eq!(std::fs::read(&original)?, before);
    let root = tree.canonical_root()?;
    assert_eq!(
        ledger_lines(&root, LEDGER_FILE_NAME)?,
        vec![root.join("scan.tif").display().to_string()]
    );
    assert!(staging_entries(cache.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn ratio_above_threshold_replaces_original() -> Result<()> {
    let tree = RasterTree::new()?;
    let original = tree.add("scan.tif", 1000)?;
    let before = std::fs::read(&original)?;
    let cache = tempfile::tempdir()?;
    let codec = Arc::new(ScaledCodec::new(5, 10, cache.path()));

    let summary = Pipeline::new(folder_config(tree.root(), cache.path(), 3), codec)
        .run()
        .await?;

    assert_eq!(summary.accepted, 1);
    assert_eq!(std::fs::read(&original)?, before[..500]);
    assert!(!tree.root().join("scan.tif.part").exists());
    assert!(staging_entries(cache.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn second_run_over_unchanged_tree_invokes_no_codec() -> Result<()> {
    let tree = RasterTree::new()?;
    let files = tree.add_many(5, 400)?;
    let cache = tempfile::tempdir()?;

    let first = Arc::new(ScaledCodec::new(1, 2, cache.path()));
    Pipeline::new(folder_config(tree.root(), cache.path(), 2), Arc::clone(&first))
        .run()
        .await?;
    let after_first: Vec<Vec<u8>> = files
        .iter()
        .map(std::fs::read)
        .collect::<std::io::Result<_>>()?;

    let second = Arc::new(ScaledCodec::new(1, 2, cache.path()));
    let summary = Pipeline::new(folder_config(tree.root(), cache.path(), 2), Arc::clone(&second))
        .run()
        .await?;
    let after_second: Vec<Vec<u8>> = files
        .iter()
        .map(std::fs::read)
        .collect::<std::io::Result<_>>()?;

    assert_eq!(first.calls(), 5);
    assert_eq!(second.calls(), 0);
    assert_eq!(summary.already_done, 5);
    assert_eq!(summary.scheduled, 0);
    assert_eq!(after_first, after_second);
    Ok(())
}

#[tokio::test]
async fn cache_never_holds_more_than_capacity() -> Result<()> {
    let tree = RasterTree::new()?;
    tree.add_many(12, 256)?;
    let cache = tempfile::tempdir()?;
    let codec = Arc::new(
        ScaledCodec::new(1, 4, cache.path()).with_delay(Duration::from_millis(20)),
    );

    let summary = Pipeline::new(folder_config(tree.root(), cache.path(), 2), Arc::clone(&codec))
        .run()
        .await?;

    assert_eq!(summary.accepted, 12);
    assert!(codec.max_resident() >= 1);
    assert!(codec.max_resident() <= 2, "saw {} staged files", codec.max_resident());
    assert_eq!(resident_files(cache.path()), 0);
    Ok(())
}

#[tokio::test]
async fn ledger_records_terminal_files_exactly_once_and_failures_never() -> Result<()> {
    let tree = RasterTree::new()?;
    tree.add("a.tif", 1000)?;
    tree.add("b.tif", 1000)?;
    tree.add("c.tif", 1000)?;
    let cache = tempfile::tempdir()?;
    let codec = Arc::new(ScaledCodec::new(1, 2, cache.path()).failing_on(&["b.tif"]));

    let summary = Pipeline::new(folder_config(tree.root(), cache.path(), 3), codec)
        .run()
        .await?;
    assert_eq!((summary.accepted, summary.failed), (2, 1));

    let root = tree.canonical_root()?;
    let lines = ledger_lines(&root, LEDGER_FILE_NAME)?;
    assert_eq!(
        lines,
        vec![
            root.join("a.tif").display().to_string(),
            root.join("c.tif").display().to_string(),
        ]
    );
    assert_eq!(std::fs::metadata(root.join("b.tif"))?.len(), 1000);
    assert!(staging_entries(cache.path()).is_empty());

    let retry = Arc::new(ScaledCodec::new(1, 2, cache.path()));
    let summary = Pipeline::new(folder_config(tree.root(), cache.path(), 3), Arc::clone(&retry))
        .run()
        .await?;
    assert_eq!(retry.calls(), 1);
    assert_eq!(summary.accepted, 1);
    assert_eq!(ledger_lines(&root, LEDGER_FILE_NAME)?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn interrupted_run_resumes_with_remaining_files() -> Result<()> {
    let tree = RasterTree::new()?;
    let files = tree.add_many(100, 64)?;
    let root = tree.canonical_root()?;
    let mut recorded = String::new();
    for file in files.iter().take(40) {
        let name = file
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("fixture without name"))?;
        recorded.push_str(&root.join(name).display().to_string());
        recorded.push('\n');
    }
    recorded.push_str("/half/written/entry");
    std::fs::write(root.join(LEDGER_FILE_NAME), recorded)?;
    let cache = tempfile::tempdir()?;
    let codec = Arc::new(ScaledCodec::new(1, 2, cache.path()));

    let summary = Pipeline::new(folder_config(tree.root(), cache.path(), 3), Arc::clone(&codec))
        .run()
        .await?;

    assert_eq!(codec.calls(), 60);
    assert_eq!(summary.total, 100);
    assert_eq!(summary.already_done, 40);
    assert_eq!(summary.accepted, 60);
    let lines = ledger_lines(&root, LEDGER_FILE_NAME)?;
    assert_eq!(lines.len(), 100);
    assert!(!lines.iter().any(|line| line.contains("half/written")));
    Ok(())
}

#[tokio::test]
async fn preserve_mode_writes_beside_original_and_skips_outputs_later() -> Result<()> {
    let tree = RasterTree::new()?;
    let original = tree.add("maps/sheet.tif", 1000)?;
    let before = std::fs::read(&original)?;
    let cache = tempfile::tempdir()?;
    let mut config = folder_config(tree.root(), cache.path(), 3);
    config.commit_mode = CommitMode::PreserveBeside;

    let summary = Pipeline::new(config.clone(), Arc::new(ScaledCodec::new(1, 2, cache.path())))
        .run()
        .await?;
    assert_eq!(summary.accepted, 1);
    assert_eq!(std::fs::read(&original)?, before);
    let output = tree.root().join("maps").join(COMPRESSED_DIR_NAME).join("sheet.tif");
    assert_eq!(std::fs::read(&output)?, before[..500]);

    std::fs::remove_file(tree.canonical_root()?.join(LEDGER_FILE_NAME))?;
    let rescan = Arc::new(ScaledCodec::new(1, 2, cache.path()));
    let summary = Pipeline::new(config, Arc::clone(&rescan)).run().await?;
    assert_eq!(summary.total, 1);
    assert_eq!(rescan.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn leftover_commit_temporaries_are_removed() -> Result<()> {
    let tree = RasterTree::new()?;
    tree.add("a.tif", 1000)?;
    tree.add("a.tif.part", 10)?;
    tree.add("_compressed_files/b.tif.part", 10)?;
    let cache = tempfile::tempdir()?;

    let summary = Pipeline::new(
        folder_config(tree.root(), cache.path(), 3),
        Arc::new(ScaledCodec::new(1, 2, cache.path())),
    )
    .run()
    .await?;

    assert_eq!(summary.stale_parts_removed, 2);
    assert!(!tree.root().join("a.tif.part").exists());
    assert!(!tree.root().join("_compressed_files/b.tif.part").exists());
    Ok(())
}

#[tokio::test]
async fn cancellation_stops_after_current_file_and_cleans_cache() -> Result<()> {
    let tree = RasterTree::new()?;
    tree.add_many(10, 128)?;
    let cache = tempfile::tempdir()?;
    let signal = ShutdownSignal::new();
    let codec = Arc::new(ScaledCodec::new(1, 2, cache.path()).cancel_after(1, signal.clone()));

    let summary = Pipeline::new(folder_config(tree.root(), cache.path(), 2), Arc::clone(&codec))
        .with_shutdown(signal)
        .run()
        .await?;

    assert!(summary.cancelled);
    assert_eq!(summary.accepted, 1);
    assert_eq!(codec.calls(), 1);
    assert_eq!(resident_files(cache.path()), 0);
    let root = tree.canonical_root()?;
    assert_eq!(ledger_lines(&root, LEDGER_FILE_NAME)?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn single_file_mode_skips_recorded_file() -> Result<()> {
    let tree = RasterTree::new()?;
    let file = tree.add("one.tif", 1000)?;
    tree.add("two.tif", 1000)?;
    let cache = tempfile::tempdir()?;
    let mut config = folder_config(tree.root(), cache.path(), 3);
    config.target = tiffstage_config::InputTarget::File(file.clone());

    let first = Arc::new(ScaledCodec::new(1, 2, cache.path()));
    let summary = Pipeline::new(config.clone(), Arc::clone(&first)).run().await?;
    assert_eq!((summary.total, summary.accepted), (1, 1));
    assert_eq!(std::fs::metadata(tree.root().join("two.tif"))?.len(), 1000);

    let second = Arc::new(ScaledCodec::new(1, 2, cache.path()));
    let summary = Pipeline::new(config, Arc::clone(&second)).run().await?;
    assert_eq!(summary.already_done, 1);
    assert_eq!(second.calls(), 0);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn wedged_remote_read_is_a_fatal_stall() -> Result<()> {
    let tree = RasterTree::new()?;
    let wedged = tree.root().join("wedged.tif");
    let status = std::process::Command::new("mkfifo").arg(&wedged).status()?;
    anyhow::ensure!(status.success(), "mkfifo failed");
    let cache = tempfile::tempdir()?;
    let mut config = folder_config(tree.root(), cache.path(), 1);
    config.target = tiffstage_config::InputTarget::File(wedged.clone());
    config.stall_timeout = Duration::from_millis(200);
    let codec = Arc::new(ScaledCodec::new(1, 2, cache.path()));

    let result = Pipeline::new(config, Arc::clone(&codec)).run().await;

    // Give the blocked reader a writer so the copy finishes and the runtime can shut down.
    drop(std::fs::OpenOptions::new().write(true).open(&wedged)?);
    assert!(matches!(
        result,
        Err(tiffstage_pipeline::PipelineError::StallTimeout { outstanding: 1, .. })
    ));
    assert_eq!(codec.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn cache_at_scan_root_keeps_user_files_named_like_staged_copies() -> Result<()> {
    let tree = RasterTree::new()?;
    tree.add("000001-slice.tif", 1000)?;
    tree.add("plain.tif", 1000)?;
    let root = tree.canonical_root()?;
    let codec = Arc::new(ScaledCodec::new(1, 2, &root));

    let summary = Pipeline::new(folder_config(&root, &root, 3), Arc::clone(&codec))
        .run()
        .await?;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.accepted, 2);
    assert_eq!(codec.calls(), 2);
    assert_eq!(std::fs::metadata(root.join("000001-slice.tif"))?.len(), 500);
    assert_eq!(std::fs::metadata(root.join("plain.tif"))?.len(), 500);
    let mut recorded = ledger_lines(&root, LEDGER_FILE_NAME)?;
    recorded.sort();
    assert_eq!(
        recorded,
        vec![
            root.join("000001-slice.tif").display().to_string(),
            root.join("plain.tif").display().to_string(),
        ]
    );
    assert!(staging_entries(&root).is_empty());
    Ok(())
}
