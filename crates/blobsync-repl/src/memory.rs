//! In-process object store with fault injection.
//!
//! Serves as both a [`SourceStore`] and, through [`MemoryStore::destination`],
//! a [`DestinationStore`]. Writes are staged in the writer and only inserted
//! into the map on commit.

use std::collections::HashMap;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::error::StoreError;
use crate::store::{DestinationStore, ObjectReader, ObjectStat, ObjectWriter, SourceStore};

/// Internal counters with atomic fields for lock-free updates.
#[derive(Debug, Default)]
struct MemoryStatsInner {
    reads_opened: AtomicU64,
    writes_opened: AtomicU64,
    chunks_written: AtomicU64,
    commits: AtomicU64,
    aborts: AtomicU64,
    largest_chunk: AtomicU64,
}

/// Snapshot of store activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Source read streams opened.
    pub reads_opened: u64,
    /// Destination writers opened.
    pub writes_opened: u64,
    /// Chunks accepted by destination writers.
    pub chunks_written: u64,
    /// Successful commits.
    pub commits: u64,
    /// Writers aborted.
    pub aborts: u64,
    /// Largest single chunk accepted, in bytes.
    pub largest_chunk: u64,
}

#[derive(Debug, Default)]
struct Faults {
    open: AtomicU32,
    read: AtomicU32,
    read_after_bytes: AtomicU64,
    write: AtomicU32,
    commit: AtomicU32,
    stat: AtomicU32,
}

/// Consume one pending fault from `counter`, if any.
fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn injected(msg: &str) -> StoreError {
    StoreError::Unavailable {
        msg: format!("injected {}", msg),
    }
}

/// Object store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    containers: RwLock<HashMap<String, HashMap<String, Bytes>>>,
    faults: Faults,
    stats: MemoryStatsInner,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A destination handle bound to `container`.
    pub fn destination(self: &Arc<Self>, container: &str) -> MemoryDestination {
        MemoryDestination {
            store: Arc::clone(self),
            container: container.to_string(),
        }
    }

    /// Insert an object directly, bypassing writers and counters.
    pub fn put(&self, container: &str, key: &str, data: impl Into<Bytes>) {
        let mut containers = self.containers.write().unwrap_or_else(|e| e.into_inner());
        containers
            .entry(container.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    /// Fetch an object's bytes.
    pub fn get(&self, container: &str, key: &str) -> Option<Bytes> {
        let containers = self.containers.read().unwrap_or_else(|e| e.into_inner());
        containers.get(container).and_then(|c| c.get(key)).cloned()
    }

    /// Fail the next `n` calls to [`SourceStore::open_read`].
    pub fn fail_next_opens(&self, n: u32) {
        self.faults.open.store(n, Ordering::SeqCst);
    }

    /// Break the next `n` read streams after `after_bytes` bytes.
    pub fn fail_next_reads(&self, n: u32, after_bytes: u64) {
        self.faults.read_after_bytes.store(after_bytes, Ordering::SeqCst);
        self.faults.read.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` chunk writes.
    pub fn fail_next_writes(&self, n: u32) {
        self.faults.write.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` commits.
    pub fn fail_next_commits(&self, n: u32) {
        self.faults.commit.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` stat calls (source or destination).
    pub fn fail_next_stats(&self, n: u32) {
        self.faults.stat.store(n, Ordering::SeqCst);
    }

    /// Get a snapshot of current statistics.
    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            reads_opened: self.stats.reads_opened.load(Ordering::Relaxed),
            writes_opened: self.stats.writes_opened.load(Ordering::Relaxed),
            chunks_written: self.stats.chunks_written.load(Ordering::Relaxed),
            commits: self.stats.commits.load(Ordering::Relaxed),
            aborts: self.stats.aborts.load(Ordering::Relaxed),
            largest_chunk: self.stats.largest_chunk.load(Ordering::Relaxed),
        }
    }

    fn stat_object(&self, container: &str, key: &str) -> Result<Option<ObjectStat>, StoreError> {
        if take_fault(&self.faults.stat) {
            return Err(injected("stat failure"));
        }
        Ok(self.get(container, key).map(|data| ObjectStat {
            key: key.to_string(),
            size: data.len() as u64,
        }))
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn open_read(&self, container: &str, key: &str) -> Result<ObjectReader, StoreError> {
        if take_fault(&self.faults.open) {
            return Err(injected("open failure"));
        }
        let data = self.get(container, key).ok_or_else(|| StoreError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        })?;
        self.stats.reads_opened.fetch_add(1, Ordering::Relaxed);

        if take_fault(&self.faults.read) {
            let cut = self.faults.read_after_bytes.load(Ordering::SeqCst).min(data.len() as u64);
            let prefix = data.slice(..cut as usize);
            return Ok(Box::new(Cursor::new(prefix).chain(BrokenStream)));
        }
        Ok(Box::new(Cursor::new(data)))
    }

    async fn stat(&self, container: &str, key: &str) -> Result<Option<ObjectStat>, StoreError> {
        self.stat_object(container, key)
    }
}

/// A reader that fails on first poll.
struct BrokenStream;

impl AsyncRead for BrokenStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "injected read failure",
        )))
    }
}

/// Destination handle over a [`MemoryStore`] container.
#[derive(Debug, Clone)]
pub struct MemoryDestination {
    store: Arc<MemoryStore>,
    container: String,
}

#[async_trait]
impl DestinationStore for MemoryDestination {
    fn container(&self) -> &str {
        &self.container
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectStat>, StoreError> {
        self.store.stat_object(&self.container, key)
    }

    async fn open_write(&self, key: &str) -> Result<Box<dyn ObjectWriter>, StoreError> {
        self.store.stats.writes_opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryWriter {
            store: Arc::clone(&self.store),
            container: self.container.clone(),
            key: key.to_string(),
            staged: Vec::new(),
        }))
    }
}

struct MemoryWriter {
    store: Arc<MemoryStore>,
    container: String,
    key: String,
    staged: Vec<u8>,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StoreError> {
        if take_fault(&self.store.faults.write) {
            return Err(injected("write failure"));
        }
        self.staged.extend_from_slice(chunk);
        let stats = &self.store.stats;
        stats.chunks_written.fetch_add(1, Ordering::Relaxed);
        stats.largest_chunk.fetch_max(chunk.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<u64, StoreError> {
        if take_fault(&self.store.faults.commit) {
            return Err(injected("commit failure"));
        }
        let size = self.staged.len() as u64;
        let MemoryWriter {
            store,
            container,
            key,
            staged,
        } = *self;
        store.put(&container, &key, staged);
        store.stats.commits.fetch_add(1, Ordering::Relaxed);
        Ok(size)
    }

    async fn abort(self: Box<Self>) {
        self.store.stats.aborts.fetch_add(1, Ordering::Relaxed);
    }
}
