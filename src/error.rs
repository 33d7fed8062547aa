//! Error types for billedhenter
//!
//! The pipeline distinguishes two failure planes:
//! - Top-level errors ([`Error`]) abort the whole run before or during
//!   processing (unparseable input, no data rows, rejected credentials).
//! - Per-row failures never surface here; they become
//!   [`FetchOutcome`](crate::types::FetchOutcome) variants and are only
//!   visible in the final report.

use thiserror::Error;

/// Result type alias for billedhenter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for billedhenter
///
/// Only pre-flight and whole-run failures are represented here. A run that
/// produces per-row failures still yields an `Ok(ResultBundle)` whose report
/// enumerates every row's fate.
#[derive(Debug, Error)]
pub enum Error {
    /// Input file is not a supported tabular format or lacks the identifier column
    #[error("format error: {0}")]
    Format(String),

    /// Input file parsed cleanly but contained zero data rows
    #[error("no data rows found after the header row")]
    EmptyInput,

    /// The API client is misconfigured (e.g. credentials rejected); no record could succeed
    #[error("fatal client error: {0}")]
    FatalClient(String),

    /// More successful images than the archive is allowed to hold
    #[error("too many images for one archive: {selected} selected, limit is {limit}")]
    TooManyImages {
        /// Number of successfully retrieved images
        selected: usize,
        /// Configured maximum archive entry count
        limit: usize,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency_limit")
        key: Option<String>,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive assembly error
    #[error("archive error: {0}")]
    Archive(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Construct a configuration error for a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_carries_key() {
        let err = Error::config("must be greater than zero", "concurrency_limit");
        match err {
            Error::Config { message, key } => {
                assert_eq!(message, "must be greater than zero");
                assert_eq!(key.as_deref(), Some("concurrency_limit"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn too_many_images_display_includes_counts() {
        let err = Error::TooManyImages {
            selected: 451,
            limit: 300,
        };
        let msg = err.to_string();
        assert!(msg.contains("451"));
        assert!(msg.contains("300"));
    }

    #[test]
    fn empty_input_has_stable_message() {
        assert_eq!(
            Error::EmptyInput.to_string(),
            "no data rows found after the header row"
        );
    }
}
