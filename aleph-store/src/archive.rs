//! Content-addressed storage for uploaded document bodies.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Hex sha256 of `content`, used as its archive key.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Stores blobs under their content hash.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Store `content` and return its hash. Storing the same bytes twice is a no-op.
    async fn archive(&self, content: &[u8]) -> Result<String>;

    /// Load the blob stored under `content_hash`, if any.
    async fn load(&self, content_hash: &str) -> Result<Option<Vec<u8>>>;
}

/// Archive on the local filesystem, sharded by the first two hash bytes.
#[derive(Debug, Clone)]
pub struct FileArchive {
    root: PathBuf,
}

impl FileArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, content_hash: &str) -> Result<PathBuf> {
        if content_hash.len() < 4 || !content_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::archive(format!(
                "invalid content hash: {}",
                content_hash
            )));
        }
        Ok(self
            .root
            .join(&content_hash[0..2])
            .join(&content_hash[2..4])
            .join(content_hash))
    }
}

#[async_trait]
impl Archive for FileArchive {
    async fn archive(&self, content: &[u8]) -> Result<String> {
        let hash = content_hash(content);
        let path = self.path_for(&hash)?;
        if tokio::fs::try_exists(&path).await? {
            return Ok(hash);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        debug!(hash = %hash, bytes = content.len(), "Archived content");
        Ok(hash)
    }

    async fn load(&self, content_hash: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(content_hash)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Archive kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl Archive for MemoryArchive {
    async fn archive(&self, content: &[u8]) -> Result<String> {
        let hash = content_hash(content);
        self.blobs
            .write()
            .await
            .entry(hash.clone())
            .or_insert_with(|| content.to_vec());
        Ok(hash)
    }

    async fn load(&self, content_hash: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(content_hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha256() {
        assert_eq!(
            content_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn test_file_archive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FileArchive::new(dir.path());

        let hash = archive.archive(b"banana").await.unwrap();
        assert_eq!(archive.archive(b"banana").await.unwrap(), hash);
        assert!(dir.path().join(&hash[0..2]).join(&hash[2..4]).join(&hash).exists());

        assert_eq!(archive.load(&hash).await.unwrap(), Some(b"banana".to_vec()));
        assert_eq!(archive.load(&content_hash(b"other")).await.unwrap(), None);
        assert!(archive.load("../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_archive_dedups() {
        let archive = MemoryArchive::new();
        let a = archive.archive(b"x").await.unwrap();
        let b = archive.archive(b"x").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(archive.len().await, 1);
        assert_eq!(archive.load(&a).await.unwrap(), Some(b"x".to_vec()));
    }
}
