//! Validation rules for `PipelineConfig`.

use crate::defaults::has_raster_extension;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{InputTarget, PipelineConfig};

const MAX_QUALITY: u8 = 100;

impl PipelineConfig {
    /// Check every field before the configuration is handed to the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first field that failed validation.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_target(&self.target)?;

        if self.encode.quality > MAX_QUALITY {
            return Err(ConfigError::invalid_field(
                "quality",
                "must_be_0_to_100",
                self.encode.quality,
            ));
        }

        if let Some(threshold) = self.ratio_gate
            && !(threshold.is_finite() && threshold > 0.0)
        {
            return Err(ConfigError::invalid_field(
                "ratio_gate",
                "must_be_positive",
                threshold,
            ));
        }

        if self.stall_timeout.is_zero() {
            return Err(ConfigError::invalid_field(
                "stall_timeout",
                "must_be_positive",
                self.stall_timeout.as_secs(),
            ));
        }

        if self.codec_program.as_os_str().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "codec_program",
                reason: "must_not_be_empty",
                value: None,
            });
        }

        if self.cache_dir.exists() && !self.cache_dir.is_dir() {
            return Err(ConfigError::invalid_field(
                "cache_dir",
                "not_a_directory",
                self.cache_dir.display(),
            ));
        }

        Ok(())
    }
}

fn validate_target(target: &InputTarget) -> ConfigResult<()> {
    let path = target.path();
    if !path.exists() {
        return Err(ConfigError::invalid_target(path, "not_found"));
    }
    match target {
        InputTarget::Folder(_) if !path.is_dir() => {
            Err(ConfigError::invalid_target(path, "not_a_directory"))
        }
        InputTarget::File(_) if !path.is_file() => {
            Err(ConfigError::invalid_target(path, "not_a_file"))
        }
        InputTarget::File(_) if !has_raster_extension(path) => {
            Err(ConfigError::invalid_target(path, "unsupported_extension"))
        }
        _ => Ok(()),
    }
}
