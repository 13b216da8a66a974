//! Error types for the import pipeline.
//!
//! Only [`Error::Config`] and manifest-level [`Error::Fetch`] failures escape
//! a run. Everything else is caught at the file, line or record it belongs to
//! and turned into a counter plus a log line.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during an import.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (URLs, credentials, paths).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A manifest or feed file could not be downloaded.
    #[error("Fetch error for {url}: {reason}")]
    Fetch {
        /// The URL that was requested.
        url: String,
        /// What went wrong (status, timeout, empty body, ...).
        reason: String,
    },

    /// A feed file could not be opened or read.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A record was rejected before reaching the store.
    #[error("Validation error: {0}")]
    Validation(#[from] catalog_core::Error),

    /// A record could not be written.
    #[error("Store error: {0}")]
    Store(String),

    /// The search index rejected a batch or could not be reached.
    #[error("Index error: {0}")]
    Index(String),

    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn fetch(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_display() {
        let err = Error::fetch("http://feed.test/a.json.gz", "HTTP 404 Not Found");
        let msg = err.to_string();
        assert!(msg.contains("http://feed.test/a.json.gz"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn test_from_core_error_is_validation() {
        let err: Error = catalog_core::Error::MissingField("code").into();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("code"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
