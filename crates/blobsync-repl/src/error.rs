//! Error types for the replication pipeline.

use thiserror::Error;

/// Errors reported by object-store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object exists under the key.
    #[error("object not found: {container}/{key}")]
    NotFound {
        /// Container name.
        container: String,
        /// Object key.
        key: String,
    },

    /// The caller lacks permission for the operation.
    #[error("permission denied: {msg}")]
    PermissionDenied {
        /// Error message from the backend.
        msg: String,
    },

    /// The backend is temporarily unreachable or refused the request.
    #[error("store unavailable: {msg}")]
    Unavailable {
        /// Error message from the backend.
        msg: String,
    },

    /// The key cannot be represented by this backend.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey {
        /// Offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while moving bytes between the source and destination stores.
///
/// Every variant is treated as transient by the retry controller: a fresh
/// attempt re-opens the source and starts a new destination write.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The source object could not be opened for reading.
    #[error("failed to open source {container}/{key}: {msg}")]
    SourceOpen {
        /// Source container name.
        container: String,
        /// Object key.
        key: String,
        /// Error message from the source store.
        msg: String,
    },

    /// A read from the source stream failed mid-transfer.
    #[error("source read failed after {bytes_read} bytes: {source}")]
    SourceRead {
        /// Bytes read successfully before the failure.
        bytes_read: u64,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The destination write stream could not be opened.
    #[error("failed to open destination writer for {key}: {msg}")]
    DestinationOpen {
        /// Destination key.
        key: String,
        /// Error message from the destination store.
        msg: String,
    },

    /// Writing a chunk to the destination failed.
    #[error("destination write failed after {bytes_written} bytes: {msg}")]
    DestinationWrite {
        /// Bytes accepted by the destination before the failure.
        bytes_written: u64,
        /// Error message from the destination store.
        msg: String,
    },

    /// Finalising the destination object failed.
    #[error("destination commit failed for {key}: {msg}")]
    Commit {
        /// Destination key.
        key: String,
        /// Error message from the destination store.
        msg: String,
    },

    /// The object key cannot be mapped onto the store.
    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey {
        /// Offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors that can occur in the replication subsystem.
#[derive(Debug, Error)]
pub enum ReplError {
    /// The trigger payload does not have the expected shape.
    #[error("malformed event: {msg}")]
    MalformedEvent {
        /// What was missing or mistyped.
        msg: String,
    },

    /// Startup configuration is missing or invalid.
    #[error("configuration error: {msg}")]
    Configuration {
        /// Error message describing the issue.
        msg: String,
    },

    /// The destination existence check failed. Never fatal.
    #[error("idempotency check failed for {key}: {msg}")]
    IdempotencyCheckFailed {
        /// Object key being checked.
        key: String,
        /// Error message from the destination store.
        msg: String,
    },

    /// The credential provider could not produce a destination handle.
    #[error("credential error: {msg}")]
    Credential {
        /// Error message describing the issue.
        msg: String,
    },

    /// Every permitted transfer attempt failed.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last_error: TransferError,
    },
}

impl ReplError {
    /// Whether the failure is the caller's fault rather than the system's.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ReplError::MalformedEvent { .. })
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ReplError::MalformedEvent { msg: msg.into() }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        ReplError::Configuration { msg: msg.into() }
    }
}

/// Result alias for the replication subsystem.
pub type Result<T> = std::result::Result<T, ReplError>;
