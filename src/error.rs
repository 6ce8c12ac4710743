//! Error types for client operations.

use thiserror::Error;

use crate::service::ServiceError;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced synchronously by [`HypertableClient`](crate::HypertableClient).
///
/// Failures of asynchronous writes and scans are not reported through this
/// type; they are delivered as [`FutureResult::Error`](crate::FutureResult)
/// through the owning future's queue.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection to the service is unavailable or was closed.
    #[error("connection unavailable: {0}")]
    Connection(String),

    /// No result arrived before the poll deadline. The caller may retry.
    #[error("timed out after {timeout_ms} ms waiting for a result")]
    Timeout {
        /// The poll timeout that elapsed.
        timeout_ms: u64,
    },

    /// The future or handle was closed.
    #[error("{0} is closed")]
    Closed(String),

    /// The handle is closed, unknown, or bound to a cancelled future.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// A mutator was closed while flushes were still in flight.
    #[error("mutator {mutator} has {pending} flush(es) in flight")]
    FlushInFlight {
        /// Raw id of the mutator handle.
        mutator: u64,
        /// Number of flushes that have not produced a result yet.
        pending: usize,
    },

    /// The service rejected or failed a synchronous operation.
    #[error("remote operation failed (code {code}): {message}")]
    RemoteOperation {
        /// Service-specific error code, 0 when unknown.
        code: i32,
        /// Message reported by the service.
        message: String,
    },

    /// A cell given in array form could not be converted.
    #[error("malformed cell array: {0}")]
    MalformedCell(String),

    /// A serialized cell buffer could not be decoded.
    #[error("malformed serialized cells: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl Error {
    /// Returns `true` for poll timeouts, which callers are expected to retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

impl From<ServiceError> for Error {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(message) => Error::Connection(message),
            ServiceError::Remote { code, message } => Error::RemoteOperation { code, message },
        }
    }
}
