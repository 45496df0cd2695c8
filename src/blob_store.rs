//! Blob storage abstraction
//!
//! Collateral documents and application forms are opaque blobs keyed by the
//! path string persisted on the owning row. The relational state is
//! authoritative; the workflow never inspects file contents. Deleting a path
//! that no longer exists is a successful no-op so that re-running a sync
//! after a partial cleanup failure stays safe.

use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

/// Error type for blob storage operations
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// A stored blob: the persisted path plus the caller-facing display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: String,
    /// Original filename, kept as the display name on the owning row
    pub display_name: String,
}

/// A file upload as received from the caller
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub original_name: String,
    pub content: Vec<u8>,
}

/// Abstract blob storage for attached documents
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store content under `folder`, returning the generated path
    async fn store(&self, folder: &str, upload: &FileUpload) -> Result<StoredFile, BlobStoreError>;

    /// Fetch content by path
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, BlobStoreError>;

    /// Delete by path. Returns `false` when the path did not exist.
    async fn delete(&self, path: &str) -> Result<bool, BlobStoreError>;

    /// Check whether a path exists
    async fn exists(&self, path: &str) -> Result<bool, BlobStoreError>;
}

fn storage_key(folder: &str, original_name: &str) -> String {
    // Uploads land under a fresh UUID so resubmitted files never collide
    // with the blobs they replace.
    let sanitized: String = original_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}/{}-{}", folder.trim_matches('/'), Uuid::new_v4(), sanitized)
}

/// Local filesystem implementation
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, BlobStoreError> {
        if path.contains("..") {
            return Err(BlobStoreError::InvalidPath(path.to_string()));
        }
        Ok(self.base_path.join(path))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, folder: &str, upload: &FileUpload) -> Result<StoredFile, BlobStoreError> {
        let path = storage_key(folder, &upload.original_name);
        let full = self.full_path(&path)?;

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, &upload.content).await?;

        Ok(StoredFile {
            path,
            display_name: upload.original_name.clone(),
        })
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, BlobStoreError> {
        let full = self.full_path(path)?;
        Ok(tokio::fs::read(full).await?)
    }

    async fn delete(&self, path: &str) -> Result<bool, BlobStoreError> {
        let full = self.full_path(path)?;
        if full.exists() {
            tokio::fs::remove_file(full).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, BlobStoreError> {
        Ok(self.full_path(path)?.exists())
    }
}

/// In-memory blob store for tests and local development
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: tokio::sync::RwLock<std::collections::HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, folder: &str, upload: &FileUpload) -> Result<StoredFile, BlobStoreError> {
        let path = storage_key(folder, &upload.original_name);
        let mut blobs = self.blobs.write().await;
        blobs.insert(path.clone(), upload.content.clone());
        Ok(StoredFile {
            path,
            display_name: upload.original_name.clone(),
        })
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, BlobStoreError> {
        let blobs = self.blobs.read().await;
        blobs
            .get(path)
            .cloned()
            .ok_or_else(|| BlobStoreError::Storage(format!("blob not found: {path}")))
    }

    async fn delete(&self, path: &str) -> Result<bool, BlobStoreError> {
        let mut blobs = self.blobs.write().await;
        Ok(blobs.remove(path).is_some())
    }

    async fn exists(&self, path: &str) -> Result<bool, BlobStoreError> {
        let blobs = self.blobs.read().await;
        Ok(blobs.contains_key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn upload(name: &str, content: &[u8]) -> FileUpload {
        FileUpload {
            original_name: name.to_string(),
            content: content.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_local_blob_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());

        let stored = store
            .store("loans/collateral", &upload("deed.pdf", b"title deed"))
            .await
            .unwrap();
        assert_eq!(stored.display_name, "deed.pdf");
        assert!(stored.path.starts_with("loans/collateral/"));

        assert!(store.exists(&stored.path).await.unwrap());
        assert_eq!(store.fetch(&stored.path).await.unwrap(), b"title deed");

        assert!(store.delete(&stored.path).await.unwrap());
        assert!(!store.exists(&stored.path).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_path_is_a_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());

        // Re-running cleanup after a partial failure must not error.
        assert!(!store.delete("loans/collateral/gone.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_parent_traversal_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());

        let result = store.fetch("../outside.txt").await;
        assert!(matches!(result, Err(BlobStoreError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_resubmitted_filename_does_not_collide() {
        let store = InMemoryBlobStore::new();

        let first = store
            .store("sites/collateral", &upload("survey.pdf", b"v1"))
            .await
            .unwrap();
        let second = store
            .store("sites/collateral", &upload("survey.pdf", b"v2"))
            .await
            .unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(store.fetch(&first.path).await.unwrap(), b"v1");
        assert_eq!(store.fetch(&second.path).await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_in_memory_blob_store() {
        let store = InMemoryBlobStore::new();

        let stored = store
            .store("loans/applications", &upload("form.pdf", b"form"))
            .await
            .unwrap();
        assert!(store.exists(&stored.path).await.unwrap());
        assert!(store.delete(&stored.path).await.unwrap());
        assert!(!store.delete(&stored.path).await.unwrap());
    }
}
