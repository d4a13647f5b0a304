//! Local filesystem object store.
//!
//! Each container is a directory under the store root and each key a
//! relative path inside it. Destination writes land in a hidden temp file
//! next to the target and are renamed into place on commit, which gives
//! atomic commit-on-close on POSIX filesystems.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::credentials::{CredentialProvider, ServiceAccountKey};
use crate::error::{ReplError, StoreError};
use crate::store::{
    DestinationHandle, DestinationStore, ObjectReader, ObjectStat, ObjectWriter, SourceStore,
};

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    /// Create a store rooted at `root`. The directory need not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding `container`. The name must be a single path segment.
    pub fn container_path(&self, container: &str) -> Result<PathBuf, StoreError> {
        if container.is_empty()
            || container.contains('/')
            || container.contains('\0')
            || container == "."
            || container == ".."
        {
            return Err(StoreError::InvalidKey {
                key: container.to_string(),
                reason: "invalid container name".to_string(),
            });
        }
        Ok(self.root.join(container))
    }

    /// Map a container and key onto a path under the root.
    ///
    /// Rejects empty segments, `.` and `..`, so no key can escape its container.
    pub fn object_path(&self, container: &str, key: &str) -> Result<PathBuf, StoreError> {
        let invalid = |reason: &str| StoreError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        let mut path = self.container_path(container)?;
        if key.is_empty() {
            return Err(invalid("empty key"));
        }
        if key.contains('\0') {
            return Err(invalid("NUL byte"));
        }

        for segment in key.split('/') {
            match segment {
                "" => return Err(invalid("empty path segment")),
                "." | ".." => return Err(invalid("relative path segment")),
                s => path.push(s),
            }
        }
        Ok(path)
    }

    /// A destination handle bound to `container`.
    pub fn destination(&self, container: &str) -> LocalFsDestination {
        LocalFsDestination {
            store: self.clone(),
            container: container.to_string(),
        }
    }

    async fn stat_path(path: &Path, key: &str) -> Result<Option<ObjectStat>, StoreError> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectStat {
                key: key.to_string(),
                size: meta.len(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io(e)),
        }
    }
}

fn map_io(e: std::io::Error) -> StoreError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => StoreError::PermissionDenied { msg: e.to_string() },
        _ => StoreError::Io(e),
    }
}

#[async_trait]
impl SourceStore for LocalFsStore {
    async fn open_read(&self, container: &str, key: &str) -> Result<ObjectReader, StoreError> {
        let path = self.object_path(container, key)?;
        match File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(map_io(e)),
        }
    }

    async fn stat(&self, container: &str, key: &str) -> Result<Option<ObjectStat>, StoreError> {
        let path = self.object_path(container, key)?;
        Self::stat_path(&path, key).await
    }
}

/// Destination handle over one container of a [`LocalFsStore`].
#[derive(Debug, Clone)]
pub struct LocalFsDestination {
    store: LocalFsStore,
    container: String,
}

#[async_trait]
impl DestinationStore for LocalFsDestination {
    fn container(&self) -> &str {
        &self.container
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectStat>, StoreError> {
        let path = self.store.object_path(&self.container, key)?;
        LocalFsStore::stat_path(&path, key).await
    }

    async fn open_write(&self, key: &str) -> Result<Box<dyn ObjectWriter>, StoreError> {
        let final_path = self.store.object_path(&self.container, key)?;
        let parent = final_path
            .parent()
            .ok_or_else(|| StoreError::InvalidKey {
                key: key.to_string(),
                reason: "no parent directory".to_string(),
            })?
            .to_path_buf();
        fs::create_dir_all(&parent).await.map_err(map_io)?;

        let file_name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = parent.join(format!(".{}.{}.partial", file_name, Uuid::new_v4()));
        let file = File::create(&temp_path).await.map_err(map_io)?;
        debug!(temp = %temp_path.display(), "opened staging file");

        Ok(Box::new(LocalFsWriter {
            file: Some(file),
            temp_path,
            final_path,
            written: 0,
            finished: false,
        }))
    }
}

/// Writer staging into a temp file. Removes the temp file unless committed.
struct LocalFsWriter {
    file: Option<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
    finished: bool,
}

#[async_trait]
impl ObjectWriter for LocalFsWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StoreError> {
        let file = self.file.as_mut().ok_or_else(|| StoreError::Unavailable {
            msg: "writer already closed".to_string(),
        })?;
        file.write_all(chunk).await.map_err(map_io)?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<u64, StoreError> {
        let mut this = self;
        let mut file = this.file.take().ok_or_else(|| StoreError::Unavailable {
            msg: "writer already closed".to_string(),
        })?;
        file.flush().await.map_err(map_io)?;
        file.sync_all().await.map_err(map_io)?;
        drop(file);

        fs::rename(&this.temp_path, &this.final_path).await.map_err(map_io)?;
        this.finished = true;
        Ok(this.written)
    }

    async fn abort(self: Box<Self>) {
        let mut this = self;
        this.file.take();
        if let Err(e) = fs::remove_file(&this.temp_path).await {
            debug!(temp = %this.temp_path.display(), error = %e, "failed to remove staging file");
        }
        this.finished = true;
    }
}

impl Drop for LocalFsWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.file.take();
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

/// Hands out [`LocalFsDestination`] handles for a fixed store root.
///
/// The service-account key is held for the lifetime of the provider and
/// identifies the principal in logs; a local directory needs no further
/// authentication.
pub struct LocalFsProvider {
    store: LocalFsStore,
    principal: ServiceAccountKey,
}

impl LocalFsProvider {
    /// Create a provider over `store`, authenticated as `principal`.
    pub fn new(store: LocalFsStore, principal: ServiceAccountKey) -> Self {
        Self { store, principal }
    }
}

#[async_trait]
impl CredentialProvider for LocalFsProvider {
    async fn destination(&self, container: &str) -> Result<DestinationHandle, ReplError> {
        let dir = self
            .store
            .container_path(container)
            .map_err(|e| ReplError::Credential { msg: e.to_string() })?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ReplError::Credential {
                msg: format!("cannot prepare container {}: {}", container, e),
            })?;
        debug!(container, principal = %self.principal.client_email, "acquired destination handle");
        Ok(std::sync::Arc::new(self.store.destination(container)))
    }
}
