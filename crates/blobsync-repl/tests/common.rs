//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use blobsync_repl::store::ObjectReader;
use blobsync_repl::{DestinationStore, ObjectStat, ObjectWriter, SourceStore, StoreError};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, ReadBuf};

/// Storage notification for one object.
pub fn notification(bucket: &str, key: &str, size: Option<u64>) -> Value {
    let mut object = json!({ "key": key });
    if let Some(size) = size {
        object["size"] = json!(size);
    }
    json!({"Records": [{"s3": {"bucket": {"name": bucket}, "object": object}}]})
}

/// Byte at `offset` of a generated object.
pub fn pattern_byte(offset: u64) -> u8 {
    (offset.wrapping_mul(31).wrapping_add(offset >> 13) % 251) as u8
}

/// FNV-1a over a byte stream, fed incrementally.
#[derive(Debug, Clone, Copy)]
pub struct Fnv(pub u64);

impl Default for Fnv {
    fn default() -> Self {
        Fnv(0xcbf2_9ce4_8422_2325)
    }
}

impl Fnv {
    pub fn update(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 ^= *b as u64;
            self.0 = self.0.wrapping_mul(0x0100_0000_01b3);
        }
    }
}

/// Expected digest of a generated object of `len` bytes.
pub fn pattern_digest(len: u64) -> u64 {
    let mut fnv = Fnv::default();
    let mut buf = vec![0u8; 64 * 1024];
    let mut offset = 0u64;
    while offset < len {
        let n = ((len - offset) as usize).min(buf.len());
        for (i, b) in buf[..n].iter_mut().enumerate() {
            *b = pattern_byte(offset + i as u64);
        }
        fnv.update(&buf[..n]);
        offset += n as u64;
    }
    fnv.0
}

/// Source that synthesises objects of a fixed size without storing them.
pub struct PatternSource {
    pub size: u64,
    pub opens: AtomicU64,
}

impl PatternSource {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            opens: AtomicU64::new(0),
        }
    }
}

struct PatternReader {
    offset: u64,
    len: u64,
}

impl AsyncRead for PatternReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        // Short reads on purpose: at most 1 MiB per poll.
        let remaining = self.len - self.offset;
        let n = (buf.remaining() as u64).min(remaining).min(1024 * 1024) as usize;
        let start = self.offset;
        let dst = buf.initialize_unfilled_to(n);
        for (i, b) in dst.iter_mut().enumerate() {
            *b = pattern_byte(start + i as u64);
        }
        buf.advance(n);
        self.offset += n as u64;
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl SourceStore for PatternSource {
    async fn open_read(&self, _container: &str, _key: &str) -> Result<ObjectReader, StoreError> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(PatternReader {
            offset: 0,
            len: self.size,
        }))
    }

    async fn stat(&self, _container: &str, key: &str) -> Result<Option<ObjectStat>, StoreError> {
        Ok(Some(ObjectStat {
            key: key.to_string(),
            size: self.size,
        }))
    }
}

/// Destination that digests bytes instead of storing them.
#[derive(Clone, Default)]
pub struct DigestSink {
    inner: Arc<DigestState>,
}

#[derive(Default)]
struct DigestState {
    committed: Mutex<Option<(String, u64, u64)>>,
    largest_chunk: AtomicU64,
}

impl DigestSink {
    /// `(key, length, digest)` of the last committed object.
    pub fn committed(&self) -> Option<(String, u64, u64)> {
        self.inner.committed.lock().unwrap().clone()
    }

    pub fn largest_chunk(&self) -> u64 {
        self.inner.largest_chunk.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DestinationStore for DigestSink {
    fn container(&self) -> &str {
        "sink"
    }

    async fn stat(&self, _key: &str) -> Result<Option<ObjectStat>, StoreError> {
        Ok(None)
    }

    async fn open_write(&self, key: &str) -> Result<Box<dyn ObjectWriter>, StoreError> {
        Ok(Box::new(DigestWriter {
            state: Arc::clone(&self.inner),
            key: key.to_string(),
            fnv: Fnv::default(),
            len: 0,
        }))
    }
}

struct DigestWriter {
    state: Arc<DigestState>,
    key: String,
    fnv: Fnv,
    len: u64,
}

#[async_trait]
impl ObjectWriter for DigestWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StoreError> {
        self.fnv.update(chunk);
        self.len += chunk.len() as u64;
        self.state
            .largest_chunk
            .fetch_max(chunk.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<u64, StoreError> {
        *self.state.committed.lock().unwrap() = Some((self.key.clone(), self.len, self.fnv.0));
        Ok(self.len)
    }

    async fn abort(self: Box<Self>) {}
}
