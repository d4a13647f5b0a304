//! Per-event results and their translation to an external response.

use serde::{Deserialize, Serialize};

use crate::error::ReplError;

/// HTTP-style status for success or skip.
pub const STATUS_OK: u16 = 200;
/// HTTP-style status for a malformed request.
pub const STATUS_BAD_REQUEST: u16 = 400;
/// HTTP-style status for an unrecoverable failure.
pub const STATUS_SERVER_ERROR: u16 = 500;

/// The single result of handling one event.
#[derive(Debug)]
pub enum TransferOutcome {
    /// The destination already holds the object.
    Skipped {
        /// Why the transfer was unnecessary.
        reason: String,
    },
    /// The object was streamed and committed.
    Succeeded {
        /// Bytes written to the destination.
        bytes_written: u64,
    },
    /// The event could not be replicated.
    Failed {
        /// Terminal error.
        error: ReplError,
        /// Transfer attempts made before giving up (0 if none started).
        attempts: u32,
    },
}

impl TransferOutcome {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            TransferOutcome::Skipped { .. } => "skipped",
            TransferOutcome::Succeeded { .. } => "succeeded",
            TransferOutcome::Failed { .. } => "failed",
        }
    }

    /// Whether the outcome counts as success for the trigger.
    pub fn is_success(&self) -> bool {
        !matches!(self, TransferOutcome::Failed { .. })
    }

    /// Translate into the boundary response shape.
    pub fn to_response(&self) -> OutcomeResponse {
        match self {
            TransferOutcome::Skipped { .. } => OutcomeResponse {
                status_code: STATUS_OK,
                body: "Skipped - file already exists".to_string(),
            },
            TransferOutcome::Succeeded { .. } => OutcomeResponse {
                status_code: STATUS_OK,
                body: "Replication successful".to_string(),
            },
            TransferOutcome::Failed { error, .. } => OutcomeResponse {
                status_code: if error.is_client_error() {
                    STATUS_BAD_REQUEST
                } else {
                    STATUS_SERVER_ERROR
                },
                body: error.to_string(),
            },
        }
    }
}

/// Function-runtime style response: `{"statusCode": 200, "body": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeResponse {
    /// HTTP-style status code.
    pub status_code: u16,
    /// Human-readable message.
    pub body: String,
}
