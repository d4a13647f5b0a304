//! Chunked streaming copy from source to destination.
//!
//! Each attempt opens a fresh source stream and a fresh destination writer.
//! One buffer of `chunk_size` bytes is reused for the whole object: a chunk
//! is fully written before the next one is read, so memory use does not
//! depend on object size. The writer is committed only after the source
//! reports end-of-stream and is aborted on any error. If the transfer future
//! is dropped mid-flight, the writer is dropped uncommitted.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::config::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::error::{StoreError, TransferError};
use crate::event::ReplicationRequest;
use crate::store::{DestinationStore, SourceStore};

/// Streams one object per call.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    chunk_size: usize,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl TransferEngine {
    /// Create an engine using `chunk_size` byte chunks, clamped to
    /// `1..=MAX_CHUNK_SIZE`.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
        }
    }

    /// Copy `request.object_key` from the source container into `destination`
    /// under the same key. Returns the number of bytes written.
    pub async fn transfer(
        &self,
        request: &ReplicationRequest,
        source: &dyn SourceStore,
        destination: &dyn DestinationStore,
    ) -> Result<u64, TransferError> {
        let key = request.object_key.as_str();

        let mut reader = source
            .open_read(&request.source_container, key)
            .await
            .map_err(|e| match e {
                StoreError::InvalidKey { key, reason } => TransferError::InvalidKey { key, reason },
                e => TransferError::SourceOpen {
                    container: request.source_container.clone(),
                    key: key.to_string(),
                    msg: e.to_string(),
                },
            })?;

        let mut writer = destination
            .open_write(key)
            .await
            .map_err(|e| TransferError::DestinationOpen {
                key: key.to_string(),
                msg: e.to_string(),
            })?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut total: u64 = 0;

        loop {
            let n = match read_chunk(&mut reader, &mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    writer.abort().await;
                    return Err(TransferError::SourceRead {
                        bytes_read: total,
                        source: e,
                    });
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.write_chunk(&buf[..n]).await {
                writer.abort().await;
                return Err(TransferError::DestinationWrite {
                    bytes_written: total,
                    msg: e.to_string(),
                });
            }
            total += n as u64;
            debug!(key, chunk = n, total, "chunk written");
        }
        drop(reader);

        let committed = writer.commit().await.map_err(|e| TransferError::Commit {
            key: key.to_string(),
            msg: e.to_string(),
        })?;
        if committed != total {
            return Err(TransferError::Commit {
                key: key.to_string(),
                msg: format!("committed {} of {} bytes", committed, total),
            });
        }

        debug!(
            source_container = %request.source_container,
            key,
            destination = destination.container(),
            bytes = total,
            "object streamed"
        );
        Ok(total)
    }
}

/// Fill `buf` from `reader`, stopping early only at end-of-stream.
/// Returns the number of bytes placed in `buf`; `0` means end-of-stream.
async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFsStore;
    use crate::memory::MemoryStore;
    use crate::store::{ObjectStat, ObjectWriter};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Destination whose commit reports half of what was written.
    struct HalfCommit;

    struct HalfCommitWriter {
        len: u64,
    }

    #[async_trait]
    impl DestinationStore for HalfCommit {
        fn container(&self) -> &str {
            "dst"
        }

        async fn stat(&self, _key: &str) -> Result<Option<ObjectStat>, StoreError> {
            Ok(None)
        }

        async fn open_write(&self, _key: &str) -> Result<Box<dyn ObjectWriter>, StoreError> {
            Ok(Box::new(HalfCommitWriter { len: 0 }))
        }
    }

    #[async_trait]
    impl ObjectWriter for HalfCommitWriter {
        async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StoreError> {
            self.len += chunk.len() as u64;
            Ok(())
        }

        async fn commit(self: Box<Self>) -> Result<u64, StoreError> {
            Ok(self.len / 2)
        }

        async fn abort(self: Box<Self>) {}
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn setup(data: Vec<u8>) -> (Arc<MemoryStore>, ReplicationRequest) {
        let store = Arc::new(MemoryStore::new());
        let size = data.len() as u64;
        store.put("src", "obj", data);
        (store, ReplicationRequest::new("src", "obj", Some(size)))
    }

    #[test]
    fn test_chunk_size_is_clamped() {
        assert_eq!(TransferEngine::new(0).chunk_size, 1);
        assert_eq!(TransferEngine::new(usize::MAX).chunk_size, MAX_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_copies_bytes_exactly() {
        let data = payload(10_000);
        let (store, req) = setup(data.clone());
        let dest = store.destination("dst");

        let written = TransferEngine::new(1024)
            .transfer(&req, store.as_ref(), &dest)
            .await
            .unwrap();

        assert_eq!(written, 10_000);
        assert_eq!(store.get("dst", "obj").unwrap().as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_chunks_bounded_by_chunk_size() {
        let (store, req) = setup(payload(5000));
        let dest = store.destination("dst");

        TransferEngine::new(1000)
            .transfer(&req, store.as_ref(), &dest)
            .await
            .unwrap();

        let stats = store.stats();
        assert_eq!(stats.chunks_written, 5);
        assert_eq!(stats.largest_chunk, 1000);
        assert_eq!(stats.commits, 1);
    }

    #[tokio::test]
    async fn test_empty_object_committed() {
        let (store, req) = setup(Vec::new());
        let dest = store.destination("dst");

        let written = TransferEngine::default()
            .transfer(&req, store.as_ref(), &dest)
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert_eq!(store.get("dst", "obj").unwrap().len(), 0);
        assert_eq!(store.stats().chunks_written, 0);
    }

    #[tokio::test]
    async fn test_read_failure_aborts_without_commit() {
        let (store, req) = setup(payload(4096));
        store.fail_next_reads(1, 2048);
        let dest = store.destination("dst");

        let err = TransferEngine::new(1024)
            .transfer(&req, store.as_ref(), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::SourceRead { bytes_read: 2048, .. }));
        assert!(store.get("dst", "obj").is_none());
        assert_eq!(store.stats().aborts, 1);
        assert_eq!(store.stats().commits, 0);
    }

    #[tokio::test]
    async fn test_write_failure_aborts() {
        let (store, req) = setup(payload(100));
        store.fail_next_writes(1);
        let dest = store.destination("dst");

        let err = TransferEngine::new(64)
            .transfer(&req, store.as_ref(), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::DestinationWrite { bytes_written: 0, .. }));
        assert!(store.get("dst", "obj").is_none());
        assert_eq!(store.stats().aborts, 1);
    }

    #[tokio::test]
    async fn test_commit_failure_surfaces() {
        let (store, req) = setup(payload(100));
        store.fail_next_commits(1);
        let dest = store.destination("dst");

        let err = TransferEngine::new(64)
            .transfer(&req, store.as_ref(), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Commit { .. }));
        assert!(store.get("dst", "obj").is_none());
    }

    #[tokio::test]
    async fn test_short_commit_is_an_error() {
        let (store, req) = setup(payload(1000));

        let err = TransferEngine::new(100)
            .transfer(&req, store.as_ref(), &HalfCommit)
            .await
            .unwrap_err();

        match err {
            TransferError::Commit { key, msg } => {
                assert_eq!(key, "obj");
                assert!(msg.contains("500 of 1000"));
            }
            other => panic!("expected commit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_source() {
        let store = Arc::new(MemoryStore::new());
        let dest = store.destination("dst");
        let req = ReplicationRequest::new("src", "ghost", None);

        let err = TransferEngine::default()
            .transfer(&req, store.as_ref(), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::SourceOpen { .. }));
        assert_eq!(store.stats().writes_opened, 0);
    }

    #[tokio::test]
    async fn test_traversal_key_rejected_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalFsStore::new(dir.path());
        let store = Arc::new(MemoryStore::new());
        let dest = store.destination("dst");
        let req = ReplicationRequest::new("src", "../escape.txt", None);

        let err = TransferEngine::default()
            .transfer(&req, &source, &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidKey { .. }));
        assert_eq!(store.stats().writes_opened, 0);
    }

    #[tokio::test]
    async fn test_read_chunk_fills_across_short_reads() {
        let (client, mut server) = tokio::io::duplex(16);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            for _ in 0..8 {
                server.write_all(&[9u8; 10]).await.unwrap();
            }
        });

        let mut reader = client;
        let mut buf = vec![0u8; 50];
        let n = read_chunk(&mut reader, &mut buf).await.unwrap();
        assert_eq!(n, 50);
        let n = read_chunk(&mut reader, &mut buf).await.unwrap();
        assert_eq!(n, 30);
        writer.await.unwrap();
        assert_eq!(read_chunk(&mut reader, &mut buf).await.unwrap(), 0);
    }
}
