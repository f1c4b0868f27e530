//! Error types surfaced by the client core.

use alder_types::RpcError;
use snafu::Snafu;

/// Errors returned by batches, transactions, and read sequences.
///
/// Raw [`RpcError`]s never escape this crate: every exit point classifies
/// the failure into one of these variants before returning control.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClientError {
    /// Caller misuse detected before any network I/O: conflicting or
    /// duplicate keys within one call, mutating an inactive batch,
    /// submitting twice.
    #[snafu(display("invalid request: {reason}"))]
    InvalidRequest {
        /// What the caller did wrong.
        reason: String,
    },

    /// Terminal remote failure, surfaced without retry.
    #[snafu(display("service error: {source}"))]
    Service {
        /// The underlying remote error.
        source: RpcError,
    },

    /// A transient remote failure persisted through every allowed attempt.
    #[snafu(display("retries exhausted after {attempts} attempts: {source}"))]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last underlying remote error.
        source: RpcError,
    },
}

impl ClientError {
    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        ClientError::InvalidRequest { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use alder_types::ErrorCode;

    use super::*;

    #[test]
    fn display_invalid_request() {
        let err = ClientError::invalid_request("batch is no longer active");
        assert_eq!(err.to_string(), "invalid request: batch is no longer active");
    }

    #[test]
    fn display_retries_exhausted() {
        let err = ClientError::RetriesExhausted {
            attempts: 3,
            source: RpcError::new(ErrorCode::Unavailable, "node down"),
        };
        assert_eq!(err.to_string(), "retries exhausted after 3 attempts: unavailable: node down");
    }
}
