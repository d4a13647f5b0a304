#![warn(missing_docs)]

//! blobsync replication core: event normalization, idempotency gate, chunked
//! streaming transfer, and bounded retry with linear backoff.

pub mod config;
pub mod credentials;
pub mod error;
pub mod event;
pub mod fs;
pub mod gate;
pub mod memory;
pub mod orchestrator;
pub mod outcome;
pub mod retry;
pub mod store;
pub mod transfer;

pub use config::ReplConfig;
pub use credentials::{CredentialMaterial, CredentialProvider, ServiceAccountKey, StaticProvider};
pub use error::{ReplError, StoreError, TransferError};
pub use event::{normalize, ReplicationRequest};
pub use orchestrator::{Orchestrator, OrchestratorStats};
pub use outcome::{OutcomeResponse, TransferOutcome};
pub use retry::{RetryController, RetryPolicy};
pub use store::{DestinationHandle, DestinationStore, ObjectStat, ObjectWriter, SourceStore};
pub use transfer::TransferEngine;
