//! Remote error taxonomy.
//!
//! Every failure crossing the RPC seam is an [`RpcError`] carrying an
//! [`ErrorCode`]; the code decides whether the operation may be retried.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Error codes the remote service can return.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Service temporarily unreachable or overloaded.
    Unavailable,
    /// The request's deadline expired before the server finished.
    DeadlineExceeded,
    /// The transaction was aborted by the server (e.g. contention).
    TransactionAborted,
    /// Malformed or semantically invalid request.
    InvalidArgument,
    /// A precondition on existing state failed (e.g. insert over an
    /// existing key without force).
    FailedPrecondition,
    /// The referenced resource does not exist.
    NotFound,
    /// The caller lacks permission.
    PermissionDenied,
    /// Unexpected server-side failure.
    Internal,
}

impl ErrorCode {
    /// Whether a failure with this code is transient and safe to retry
    /// under the service's error taxonomy.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            ErrorCode::Unavailable | ErrorCode::DeadlineExceeded | ErrorCode::TransactionAborted
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::DeadlineExceeded => "deadline exceeded",
            ErrorCode::TransactionAborted => "transaction aborted",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::FailedPrecondition => "failed precondition",
            ErrorCode::NotFound => "not found",
            ErrorCode::PermissionDenied => "permission denied",
            ErrorCode::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A failure reported by the remote service.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedPrecondition, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Whether this failure is transient per [`ErrorCode::is_retriable`].
    pub fn is_retriable(&self) -> bool {
        self.code.is_retriable()
    }
}
