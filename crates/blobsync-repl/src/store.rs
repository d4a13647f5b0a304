//! Object-store capabilities consumed by the replication core.
//!
//! Concrete clients live behind these traits. The core never talks to a
//! storage SDK directly; it only opens readers, opens writers, and stats keys.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::StoreError;

/// A streaming reader over one source object.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// A shared, read-only capability bound to one destination container.
pub type DestinationHandle = Arc<dyn DestinationStore>;

/// Metadata recorded for a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStat {
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

/// Read side: where objects are replicated from.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Open a fresh read stream positioned at the start of the object.
    async fn open_read(&self, container: &str, key: &str) -> Result<ObjectReader, StoreError>;

    /// Look up object metadata. `Ok(None)` means the object does not exist.
    async fn stat(&self, container: &str, key: &str) -> Result<Option<ObjectStat>, StoreError>;
}

/// Write side: the container objects are replicated into.
///
/// Implementations must provide atomic commit-on-close: bytes handed to an
/// [`ObjectWriter`] become visible under the key only when
/// [`ObjectWriter::commit`] succeeds, never in a partial state. Aborted or
/// dropped writers must leave the previous object (if any) untouched.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Name of the container this handle is bound to.
    fn container(&self) -> &str;

    /// Look up object metadata. `Ok(None)` means the object does not exist.
    async fn stat(&self, key: &str) -> Result<Option<ObjectStat>, StoreError>;

    /// Begin a new write for `key`.
    async fn open_write(&self, key: &str) -> Result<Box<dyn ObjectWriter>, StoreError>;
}

/// An open, uncommitted destination write.
#[async_trait]
pub trait ObjectWriter: Send {
    /// Append one chunk. Returns once the chunk has been accepted.
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StoreError>;

    /// Finalise the object and make it visible. Returns the committed size.
    async fn commit(self: Box<Self>) -> Result<u64, StoreError>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>);
}
