//! Error types and result aliases for Cairn.
//!
//! This module defines the shared error taxonomy used across all Cairn
//! components. Every error carries a stable machine-readable kind plus a
//! human-readable message; the server maps kinds onto transport status codes.

use std::fmt;

/// The result type used throughout Cairn.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Cairn operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input (bad CID string, missing fields).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A record failed canonicalization (empty variant, unsupported schema).
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Canonical bytes could not be decoded back into a record.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The record declares a schema version this build does not know.
    #[error("unsupported schema version: {version}")]
    UnsupportedVersion {
        /// The version tag found in the input.
        version: String,
    },

    /// The requested CID, sync or label is absent.
    #[error("not found: {resource} {id}")]
    NotFound {
        /// The kind of resource that was looked up.
        resource: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A duplicate resource was created where one already exists.
    ///
    /// The idempotent push path never emits this; re-pushing identical
    /// content is a success.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A record payload exceeded the maximum allowed size.
    #[error("payload too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge {
        /// Actual payload size in bytes.
        size: usize,
        /// The configured limit in bytes.
        limit: usize,
    },

    /// Stored bytes do not hash back to the CID they were stored under.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// The authorization policy denied the call.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A backend I/O operation failed; the caller may retry.
    #[error("unavailable: {message}")]
    Unavailable {
        /// Description of the backend failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The surrounding context was canceled.
    #[error("canceled")]
    Canceled,

    /// An unrecoverable server bug.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a not-found error for the given resource kind and id.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Creates an unavailable error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an unavailable error with a source cause.
    #[must_use]
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidRecord(_) => "INVALID_RECORD",
            Self::InvalidEncoding(_) => "INVALID_ENCODING",
            Self::UnsupportedVersion { .. } => "UNSUPPORTED_VERSION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::Integrity(_) => "INTEGRITY_ERROR",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::Unavailable { .. } => "UNAVAILABLE",
            Self::Canceled => "CANCELED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Reconstructs an error from a stable code and message.
    ///
    /// This is the inverse of [`Error::code`], used when per-item errors
    /// cross the wire as `(code, message)` pairs.
    #[must_use]
    pub fn from_code(code: &str, message: &str) -> Self {
        match code {
            "INVALID_REQUEST" => Self::InvalidRequest(message.to_string()),
            "INVALID_RECORD" => Self::InvalidRecord(message.to_string()),
            "INVALID_ENCODING" => Self::InvalidEncoding(message.to_string()),
            "UNSUPPORTED_VERSION" => Self::UnsupportedVersion {
                version: message.to_string(),
            },
            "NOT_FOUND" => Self::NotFound {
                resource: "resource",
                id: message.to_string(),
            },
            "ALREADY_EXISTS" => Self::AlreadyExists(message.to_string()),
            "PAYLOAD_TOO_LARGE" => Self::PayloadTooLarge { size: 0, limit: 0 },
            "INTEGRITY_ERROR" => Self::Integrity(message.to_string()),
            "PERMISSION_DENIED" => Self::PermissionDenied(message.to_string()),
            "UNAVAILABLE" => Self::Unavailable {
                message: message.to_string(),
                source: None,
            },
            "CANCELED" => Self::Canceled,
            _ => Self::Internal(message.to_string()),
        }
    }

    /// Returns true when a retry may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip_preserves_kind() {
        let errors = [
            Error::InvalidRequest("bad cid".into()),
            Error::InvalidRecord("no variant".into()),
            Error::not_found("record", "bafy123"),
            Error::PermissionDenied("external domain".into()),
            Error::unavailable("registry down"),
            Error::Canceled,
            Error::Internal("bug".into()),
        ];

        for err in errors {
            let code = err.code();
            let rebuilt = Error::from_code(code, "x");
            assert_eq!(rebuilt.code(), code, "roundtrip changed kind for {err}");
        }
    }

    #[test]
    fn payload_too_large_reports_both_sizes() {
        let err = Error::PayloadTooLarge {
            size: 5_000_000,
            limit: 4_194_304,
        };
        let msg = err.to_string();
        assert!(msg.contains("5000000"));
        assert!(msg.contains("4194304"));
    }

    #[test]
    fn only_unavailable_is_retriable() {
        assert!(Error::unavailable("io").is_retriable());
        assert!(!Error::Canceled.is_retriable());
        assert!(!Error::Internal("bug".into()).is_retriable());
    }
}
