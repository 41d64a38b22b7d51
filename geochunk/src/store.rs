//! Blob storage for persisted chunk records.
//!
//! The pyramid only needs three operations on a flat `(container, key)`
//! namespace: read if present, write, and an existence check. Records are
//! never updated in place or deleted.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

/// Boxed future returned by object-safe async traits in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key/value storage for persisted chunks.
pub trait BlobStore: Send + Sync {
    /// Read a blob, or `None` if it does not exist.
    fn try_read<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, io::Result<Option<Vec<u8>>>>;

    /// Write a blob. A reader never observes a partially written blob.
    fn write<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, io::Result<()>>;

    fn exists<'a>(&'a self, container: &'a str, key: &'a str) -> BoxFuture<'a, io::Result<bool>>;
}

impl<S: BlobStore + ?Sized> BlobStore for Arc<S> {
    fn try_read<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, io::Result<Option<Vec<u8>>>> {
        (**self).try_read(container, key)
    }

    fn write<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, io::Result<()>> {
        (**self).write(container, key, bytes)
    }

    fn exists<'a>(&'a self, container: &'a str, key: &'a str) -> BoxFuture<'a, io::Result<bool>> {
        (**self).exists(container, key)
    }
}

/// In-process blob store that counts its traffic.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<(String, String), Arc<Vec<u8>>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `try_read` calls so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of `write` calls so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Keys stored under `container`, sorted.
    pub fn keys(&self, container: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Returns the stored bytes without counting a read.
    pub fn get(&self, container: &str, key: &str) -> Option<Arc<Vec<u8>>> {
        self.lock()
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Arc<Vec<u8>>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlobStore for MemoryBlobStore {
    fn try_read<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, io::Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::Relaxed);
            Ok(self.get(container, key).map(|bytes| bytes.as_ref().clone()))
        })
    }

    fn write<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.writes.fetch_add(1, Ordering::Relaxed);
            self.lock()
                .insert((container.to_string(), key.to_string()), Arc::new(bytes));
            Ok(())
        })
    }

    fn exists<'a>(&'a self, container: &'a str, key: &'a str) -> BoxFuture<'a, io::Result<bool>> {
        Box::pin(async move { Ok(self.get(container, key).is_some()) })
    }
}

/// Blob store backed by a directory tree: `{root}/{container}/{key}`.
#[derive(Debug)]
pub struct DiskBlobStore {
    root: PathBuf,
    temp_counter: AtomicU64,
}

impl DiskBlobStore {
    /// Create a store rooted at `root`. Directories are created on first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            temp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &str) -> io::Result<PathBuf> {
        check_name(container)?;
        Ok(self.root.join(container))
    }

    fn blob_path(&self, container: &str, key: &str) -> io::Result<PathBuf> {
        check_name(key)?;
        Ok(self.container_dir(container)?.join(key))
    }

    /// Keys persisted under `container`, sorted. A missing container is empty.
    pub async fn list(&self, container: &str) -> io::Result<Vec<String>> {
        let dir = self.container_dir(container)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                // In-progress writes are dot-prefixed temp files.
                if !name.starts_with('.') {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Reject names that would escape the container directory.
fn check_name(name: &str) -> io::Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid blob name: {:?}", name),
        ));
    }
    Ok(())
}

impl BlobStore for DiskBlobStore {
    fn try_read<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, io::Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            let path = self.blob_path(container, key)?;
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Some(data)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    fn write<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let path = self.blob_path(container, key)?;
            let dir = self.container_dir(container)?;
            tokio::fs::create_dir_all(&dir).await?;

            // Write atomically via a uniquely named temp file
            let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
            let temp_path = dir.join(format!(".{}.{}.{}.tmp", key, std::process::id(), n));
            if let Err(e) = tokio::fs::write(&temp_path, &bytes).await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }
            if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }
            trace!(path = %path.display(), bytes = bytes.len(), "Blob written");
            Ok(())
        })
    }

    fn exists<'a>(&'a self, container: &'a str, key: &'a str) -> BoxFuture<'a, io::Result<bool>> {
        Box::pin(async move {
            let path = self.blob_path(container, key)?;
            tokio::fs::try_exists(&path).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.try_read("c", "a").await.unwrap(), None);
        assert!(!store.exists("c", "a").await.unwrap());

        store.write("c", "a", vec![1, 2, 3]).await.unwrap();
        store.write("d", "a", vec![9]).await.unwrap();
        assert_eq!(store.try_read("c", "a").await.unwrap(), Some(vec![1, 2, 3]));
        assert!(store.exists("c", "a").await.unwrap());
        assert_eq!(store.keys("c"), vec!["a".to_string()]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.reads(), 2);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn test_disk_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = DiskBlobStore::new(dir.path());

        assert_eq!(store.try_read("height-v1", "x").await.unwrap(), None);
        assert!(store.list("height-v1").await.unwrap().is_empty());

        store.write("height-v1", "x", vec![4, 5]).await.unwrap();
        store.write("height-v1", "w", vec![6]).await.unwrap();
        store.write("height-v1", "x", vec![7]).await.unwrap();

        assert_eq!(store.try_read("height-v1", "x").await.unwrap(), Some(vec![7]));
        assert!(store.exists("height-v1", "w").await.unwrap());
        assert!(!store.exists("height-v2", "w").await.unwrap());
        assert_eq!(
            store.list("height-v1").await.unwrap(),
            vec!["w".to_string(), "x".to_string()]
        );
        assert!(dir.path().join("height-v1").join("x").is_file());
    }

    #[tokio::test]
    async fn test_disk_store_rejects_escaping_names() {
        let dir = TempDir::new().unwrap();
        let store = DiskBlobStore::new(dir.path());
        for bad in ["../x", "a/b", "", ".hidden", "a\\b"] {
            let err = store.write("c", bad, vec![1]).await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
        assert!(store.try_read("..", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_store_through_arc_dyn() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        store.write("c", "k", vec![1]).await.unwrap();
        assert!(store.exists("c", "k").await.unwrap());
    }
}
