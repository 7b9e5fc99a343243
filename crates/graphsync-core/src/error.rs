//! Engine error types.
//!
//! Validation and encode-time errors are raised before any network call is
//! made. Remote failures carry the status code and the remote error body so
//! callers can report them verbatim.

use std::fmt;

use serde_json::Value;

use crate::schema::AttrPath;
use crate::transport::{HttpMethod, TransportError};
use crate::write::{WriteProgress, WriteStep};

/// Errors that can occur while reconciling a resource.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The remote resource does not exist (or was removed externally).
    #[error("Resource not found: {uri}")]
    NotFound {
        /// URI that returned 404.
        uri: String,
    },

    /// The desired state violates the schema.
    #[error("Invalid value at {path}: {message}")]
    Validation {
        /// Position of the offending value.
        path: AttrPath,
        /// Description of the violation.
        message: String,
    },

    /// More than one variant of a polymorphic union was populated.
    #[error("Multiple variants set at {path}: {}", .variants.join(", "))]
    MultipleVariantsSet {
        /// Position of the union.
        path: AttrPath,
        /// Names of all populated variants.
        variants: Vec<String>,
    },

    /// A union that requires a variant had none populated.
    #[error("No variant set at {path}")]
    NoVariantSet {
        /// Position of the union.
        path: AttrPath,
    },

    /// The remote API answered with a non-success status.
    #[error("{method} {uri} failed (HTTP {status}): {message}")]
    RemoteRequest {
        /// Request method.
        method: HttpMethod,
        /// Request URI.
        uri: String,
        /// HTTP status code.
        status: u16,
        /// Remote error message, or the raw body when none could be extracted.
        message: String,
        /// Raw response body.
        body: Value,
    },

    /// The remote object changed since it was last read.
    #[error("Concurrency conflict on {uri} (HTTP {status}): {message}")]
    ConcurrencyConflict {
        /// Request URI.
        uri: String,
        /// HTTP status code (409 or 412).
        status: u16,
        /// Remote error message.
        message: String,
    },

    /// The transport could not complete the request.
    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),

    /// The operation deadline elapsed.
    #[error("Operation timed out")]
    Timeout,

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// A pre-write middleware rejected the payload.
    #[error("Middleware '{hook}' failed: {message}")]
    Middleware {
        /// Name of the middleware.
        hook: String,
        /// Failure description.
        message: String,
    },

    /// The remote answered with a body the engine cannot interpret.
    #[error("Unexpected response from {uri}: {message}")]
    UnexpectedResponse {
        /// Request URI.
        uri: String,
        /// What was wrong with the body.
        message: String,
    },

    /// The resource descriptor is inconsistent.
    #[error("Invalid descriptor for {type_name}: {message}")]
    InvalidDescriptor {
        /// Resource type name.
        type_name: String,
        /// Description of the inconsistency.
        message: String,
    },

    /// A write committed some steps and then failed. Committed steps are not
    /// rolled back.
    #[error("Write failed at {failed_step} after committing {}: {source}", .progress.describe())]
    PartialWrite {
        /// How far the sequence progressed.
        progress: Box<WriteProgress>,
        /// The step that failed.
        failed_step: WriteStep,
        /// The failure.
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(uri: impl Into<String>) -> Self {
        Self::NotFound { uri: uri.into() }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(path: &AttrPath, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.clone(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidDescriptor` error.
    #[must_use]
    pub fn invalid_descriptor(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnexpectedResponse` error.
    #[must_use]
    pub fn unexpected_response(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the remote resource is gone.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::ConcurrencyConflict { .. } => true,
            Self::PartialWrite { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    /// Returns `true` if re-running the same operation may succeed.
    ///
    /// The engine itself never retries; this only informs the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrencyConflict { .. } | Self::Timeout | Self::Transport(_) => true,
            Self::RemoteRequest { status, .. } => *status == 429 || *status >= 500,
            Self::PartialWrite { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Validation { .. }
            | Self::MultipleVariantsSet { .. }
            | Self::NoVariantSet { .. }
            | Self::Middleware { .. } => ErrorCategory::Validation,
            Self::RemoteRequest { .. } | Self::UnexpectedResponse { .. } => ErrorCategory::Remote,
            Self::ConcurrencyConflict { .. } => ErrorCategory::Conflict,
            Self::Transport(_) | Self::Timeout | Self::Cancelled => ErrorCategory::Transport,
            Self::InvalidDescriptor { .. } => ErrorCategory::Internal,
            Self::PartialWrite { source, .. } => source.category(),
        }
    }
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Self::Timeout,
            other => Self::Transport(other),
        }
    }
}

/// Categories of engine errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Resource not found.
    NotFound,
    /// Local validation failure; nothing was sent.
    Validation,
    /// The remote rejected a request.
    Remote,
    /// Optimistic concurrency conflict.
    Conflict,
    /// Network, timeout or cancellation.
    Transport,
    /// Programming error in a descriptor.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Validation => write!(f, "validation"),
            Self::Remote => write!(f, "remote"),
            Self::Conflict => write!(f, "conflict"),
            Self::Transport => write!(f, "transport"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PathSegment;
    use crate::write::WriteOperation;

    #[test]
    fn test_error_display() {
        let err = EngineError::not_found("/deviceManagement/scripts/1");
        assert_eq!(
            err.to_string(),
            "Resource not found: /deviceManagement/scripts/1"
        );

        let path = AttrPath::root().child(PathSegment::attribute("settings"));
        let err = EngineError::MultipleVariantsSet {
            path,
            variants: vec!["windows".into(), "macos".into()],
        };
        assert_eq!(
            err.to_string(),
            "Multiple variants set at settings: windows, macos"
        );
    }

    #[test]
    fn test_retryable() {
        let conflict = EngineError::ConcurrencyConflict {
            uri: "/x".into(),
            status: 412,
            message: "etag mismatch".into(),
        };
        assert!(conflict.is_retryable());
        assert!(conflict.is_conflict());

        let bad_request = EngineError::RemoteRequest {
            method: HttpMethod::Patch,
            uri: "/x".into(),
            status: 400,
            message: "bad".into(),
            body: Value::Null,
        };
        assert!(!bad_request.is_retryable());

        let throttled = EngineError::RemoteRequest {
            method: HttpMethod::Get,
            uri: "/x".into(),
            status: 429,
            message: "slow down".into(),
            body: Value::Null,
        };
        assert!(throttled.is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
    }

    #[test]
    fn test_partial_write_delegates() {
        let mut progress = WriteProgress::new(WriteOperation::Update);
        progress.primary_committed = true;
        let err = EngineError::PartialWrite {
            progress: Box::new(progress),
            failed_step: WriteStep::SubAction(1),
            source: Box::new(EngineError::Timeout),
        };
        assert!(err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Transport);
        assert!(err.to_string().contains("sub-action #1"));
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            EngineError::not_found("/x").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            EngineError::NoVariantSet {
                path: AttrPath::root()
            }
            .category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            EngineError::from(TransportError::Timeout).category(),
            ErrorCategory::Transport
        );
    }
}
