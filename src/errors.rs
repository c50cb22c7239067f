//! Custom error types for the Vigil web exposure scanner.
//!
//! Provides a structured error hierarchy for better error handling
//! and more informative error messages.
//!
//! Transport-level failures (timeouts, resets, TLS) are deliberately NOT
//! represented here; they are data (`FetchOutcome::Failure`) so that a
//! single dead URL can never abort a crawl.

use std::path::PathBuf;

/// The main error type for Vigil operations.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// Invalid scan configuration (bad URL, zero budgets, etc.)
    /// Raised before any network activity begins.
    #[error("Invalid scan configuration: {0}")]
    Config(String),

    /// Invalid or unparseable target URL
    #[error("Invalid target URL '{url}': {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Regex compilation error
    #[error("Invalid detection pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (report write, permissions, etc.)
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// HTTP client construction error
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// Tokio task join error
    #[error("Async task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// A whole scan phase failed in an unexpected way
    #[error("Scan phase '{phase}' failed: {message}")]
    Phase { phase: String, message: String },
}

/// Result type alias using VigilError
pub type VigilResult<T> = Result<T, VigilError>;

impl VigilError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a URL error with the offending input attached
    pub fn url(source: url::ParseError, url: impl Into<String>) -> Self {
        Self::Url {
            url: url.into(),
            source,
        }
    }

    /// Create a regex error with pattern context
    pub fn regex(source: regex::Error, pattern: impl Into<String>) -> Self {
        Self::Regex {
            pattern: pattern.into(),
            source,
        }
    }

    /// Create an I/O error with path context
    pub fn io(source: std::io::Error, path: impl Into<Option<PathBuf>>) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a phase-boundary error
    pub fn phase(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Phase {
            phase: phase.into(),
            message: message.into(),
        }
    }
}

/// Convert from raw I/O errors (without path context)
impl From<std::io::Error> for VigilError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: None, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = VigilError::config("max_pages must be greater than zero");
        assert!(err.to_string().contains("max_pages"));
    }

    #[test]
    fn test_io_error_display() {
        let err = VigilError::io(
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            Some(PathBuf::from("/tmp/report.json")),
        );
        assert!(err.to_string().contains("/tmp/report.json"));
    }

    #[test]
    fn test_phase_error_display() {
        let err = VigilError::phase("deep_crawl", "frontier exhausted unexpectedly");
        assert!(err.to_string().contains("deep_crawl"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let vigil_err: VigilError = io_err.into();
        assert!(matches!(vigil_err, VigilError::Io { .. }));
    }
}
