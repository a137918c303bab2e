//! Mapping between the shared error taxonomy and transport status codes.
//!
//! Stream-level failures travel as `tonic::Status`; item-local failures
//! travel inline as [`crate::ErrorDetail`]. Both directions preserve the
//! stable machine code so clients can rebuild the original error kind.

use cairn_core::Error;
use tonic::{Code, Status};

/// Converts a domain error into a transport status.
#[must_use]
pub fn to_status(err: &Error) -> Status {
    let code = match err {
        Error::InvalidRequest(_)
        | Error::InvalidRecord(_)
        | Error::InvalidEncoding(_)
        | Error::UnsupportedVersion { .. } => Code::InvalidArgument,
        Error::NotFound { .. } => Code::NotFound,
        Error::AlreadyExists(_) => Code::AlreadyExists,
        Error::PayloadTooLarge { .. } => Code::ResourceExhausted,
        Error::Integrity(_) => Code::DataLoss,
        Error::PermissionDenied(_) => Code::PermissionDenied,
        Error::Unavailable { .. } => Code::Unavailable,
        Error::Canceled => Code::Cancelled,
        Error::Internal(_) => Code::Internal,
    };

    let mut status = Status::new(code, err.to_string());
    status
        .metadata_mut()
        .insert("cairn-error-code", err.code().parse().unwrap_or_else(|_| {
            // Stable codes are ASCII identifiers; this cannot fail.
            tonic::metadata::MetadataValue::from_static("INTERNAL")
        }));
    status
}

/// Rebuilds a domain error from a transport status.
///
/// Prefers the stable code carried in metadata; falls back to mapping the
/// transport code when the peer did not attach one.
#[must_use]
pub fn from_status(status: &Status) -> Error {
    if let Some(code) = status
        .metadata()
        .get("cairn-error-code")
        .and_then(|v| v.to_str().ok())
    {
        return Error::from_code(code, status.message());
    }

    match status.code() {
        Code::InvalidArgument => Error::InvalidRequest(status.message().to_string()),
        Code::NotFound => Error::not_found("resource", status.message()),
        Code::AlreadyExists => Error::AlreadyExists(status.message().to_string()),
        Code::ResourceExhausted => Error::PayloadTooLarge { size: 0, limit: 0 },
        Code::DataLoss => Error::Integrity(status.message().to_string()),
        Code::PermissionDenied => Error::PermissionDenied(status.message().to_string()),
        Code::Unavailable => Error::unavailable(status.message()),
        Code::Cancelled => Error::Canceled,
        _ => Error::Internal(status.message().to_string()),
    }
}
