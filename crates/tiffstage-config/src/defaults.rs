//! Fixed filesystem names and default tunables.
//!
//! # Design
//! - Names on disk are constants so repeated runs over one root agree on them.
//! - Tunables here only seed `PipelineConfig::new`; nothing reads them at runtime.

use std::path::Path;
use std::time::Duration;

/// Ledger file stored at the scan root.
pub const LEDGER_FILE_NAME: &str = "_already_compressed_files";
/// Output subdirectory created beside each original in preserve mode.
pub const COMPRESSED_DIR_NAME: &str = "_compressed_files";
/// Directory inside the cache that holds staged copies and encoder temporaries.
pub const STAGING_DIR_NAME: &str = ".tiffstage-staging";
/// Suffix for outputs that have not been committed yet.
pub const PART_SUFFIX: &str = ".part";
/// Recognised raster extensions, compared case-insensitively.
pub const RASTER_EXTENSIONS: [&str; 2] = ["tif", "tiff"];
/// Number of files allowed in the staging cache at once.
pub const DEFAULT_STAGE_CAPACITY: usize = 3;
/// Compression ratio at or below which outputs are discarded.
pub const DEFAULT_RATIO_THRESHOLD: f64 = 1.5;
/// Time the compressor waits for a staged file before declaring a stall.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(100);
/// Default quality for the lossy algorithm.
pub const DEFAULT_QUALITY: u8 = 85;
/// External encoder invoked by the command codec.
pub const DEFAULT_CODEC_PROGRAM: &str = "tiff-encode";
/// Zero-padded width of the scan index prefixed to cache file names.
pub const CACHE_SEQUENCE_WIDTH: usize = 6;

/// Whether `path` carries one of the recognised raster extensions.
#[must_use]
pub fn has_raster_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            RASTER_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raster_extension_matches_case_insensitively() {
        assert!(has_raster_extension(Path::new("/data/a.tif")));
        assert!(has_raster_extension(Path::new("/data/b.TIFF")));
        assert!(!has_raster_extension(Path::new("/data/a.tif.part")));
        assert!(!has_raster_extension(Path::new("/data/readme")));
        assert!(!has_raster_extension(Path::new("/data/image.png")));
    }
}
