//! Error types for product record handling.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding or normalizing a product record.
#[derive(Error, Debug)]
pub enum Error {
    /// A required field is absent or empty.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field is present but its value cannot be used.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// The name of the invalid field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },

    /// The line parsed, but not to a usable record.
    #[error("not a product record: {0}")]
    NotARecord(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown product status string.
    #[error("unknown product status '{0}'")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let err = Error::MissingField("code");
        assert_eq!(err.to_string(), "missing required field 'code'");
    }

    #[test]
    fn test_invalid_field_display() {
        let err = Error::InvalidField {
            field: "code",
            reason: "not numeric: abc".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("code"));
        assert!(msg.contains("not numeric"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn test_unknown_status_display() {
        let err = Error::UnknownStatus("archived".to_string());
        assert!(err.to_string().contains("archived"));
    }
}
