//! Error types for configuration validation.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// The input target did not exist or had the wrong kind.
    #[error("invalid input target")]
    InvalidTarget {
        /// Path provided by the caller.
        path: PathBuf,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    pub(crate) fn invalid_field(
        field: &'static str,
        reason: &'static str,
        value: impl ToString,
    ) -> Self {
        Self::InvalidField {
            field,
            reason,
            value: Some(value.to_string()),
        }
    }

    pub(crate) fn invalid_target(path: impl Into<PathBuf>, reason: &'static str) -> Self {
        Self::InvalidTarget {
            path: path.into(),
            reason,
        }
    }
}
