//! Codecs and configuration helpers shared by the pipeline integration tests.
#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tiffstage_config::{InputTarget, PART_SUFFIX, PipelineConfig};
use tiffstage_pipeline::{Codec, CodecError, EncodeRequest, ShutdownSignal, staging_dir};

/// Writes the first `numerator / denominator` of its input as the "compressed" output.
///
/// Also records how many staged copies it saw in the cache at each call.
#[derive(Debug)]
pub struct ScaledCodec {
    numerator: u64,
    denominator: u64,
    cache_dir: PathBuf,
    failing: Vec<String>,
    delay: Duration,
    calls: AtomicUsize,
    max_resident: AtomicUsize,
    cancel_after: Mutex<Option<(usize, ShutdownSignal)>>,
}

impl ScaledCodec {
    pub fn new(numerator: u64, denominator: u64, cache_dir: &Path) -> Self {
        Self {
            numerator,
            denominator,
            cache_dir: cache_dir.to_path_buf(),
            failing: Vec::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            max_resident: AtomicUsize::new(0),
            cancel_after: Mutex::new(None),
        }
    }

    /// Fail every input whose file name ends with one of `names`.
    pub fn failing_on(mut self, names: &[&str]) -> Self {
        self.failing = names.iter().map(|name| (*name).to_owned()).collect();
        self
    }

    /// Sleep before encoding so the stager can run ahead.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Trigger `signal` during the `calls`-th encode.
    pub fn cancel_after(self, calls: usize, signal: ShutdownSignal) -> Self {
        if let Ok(mut slot) = self.cancel_after.lock() {
            *slot = Some((calls, signal));
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_resident(&self) -> usize {
        self.max_resident.load(Ordering::SeqCst)
    }

    fn observe_cache(&self) {
        let resident = resident_files(&self.cache_dir);
        self.max_resident.fetch_max(resident, Ordering::SeqCst);
    }
}

#[async_trait]
impl Codec for ScaledCodec {
    async fn encode(&self, request: &EncodeRequest<'_>) -> Result<(), CodecError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.observe_cache();

        if let Ok(slot) = self.cancel_after.lock()
            && let Some((after, signal)) = slot.as_ref()
            && *after == call
        {
            signal.trigger();
        }

        let name = request.input.to_string_lossy();
        if self.failing.iter().any(|suffix| name.ends_with(suffix.as_str())) {
            tokio::fs::write(request.output, b"partial")
                .await
                .map_err(other)?;
            return Err(CodecError::Exited {
                status: Some(1),
                stderr: "unsupported sample format".to_owned(),
            });
        }

        let bytes = tokio::fs::read(request.input).await.map_err(other)?;
        let keep = usize::try_from(bytes.len() as u64 * self.numerator / self.denominator)
            .unwrap_or(bytes.len());
        tokio::fs::write(request.output, &bytes[..keep])
            .await
            .map_err(other)
    }
}

fn other(err: std::io::Error) -> CodecError {
    CodecError::Other {
        message: err.to_string(),
    }
}

/// Staged copies currently in the cache, ignoring encoder temporaries.
pub fn resident_files(cache_dir: &Path) -> usize {
    staging_entries(cache_dir)
        .iter()
        .filter(|name| !name.ends_with(PART_SUFFIX))
        .count()
}

/// Every entry the pipeline left in its staging directory under `cache_dir`.
pub fn staging_entries(cache_dir: &Path) -> Vec<String> {
    std::fs::read_dir(staging_dir(cache_dir))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// Folder-mode configuration with the cache in `cache_dir`.
pub fn folder_config(root: &Path, cache_dir: &Path, capacity: usize) -> PipelineConfig {
    let mut config = PipelineConfig::new(InputTarget::Folder(root.to_path_buf()));
    config.cache_dir = cache_dir.to_path_buf();
    config.stage_capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    config.stall_timeout = Duration::from_secs(10);
    config
}
