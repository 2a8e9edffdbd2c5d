//! Object storage provider trait and local filesystem implementation

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Trait for raw document byte storage
///
/// The core only needs a previously-stored key to be retrievable; the
/// backend is irrelevant.
#[async_trait]
pub trait ObjectStoreProvider: Send + Sync {
    /// Store bytes under a key, returning a retrievable URI
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<String>;

    /// Retrieve bytes by key
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete a key
    async fn delete(&self, key: &str) -> Result<()>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Local filesystem object store
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a store rooted at the given directory
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::ObjectStore(format!("Failed to create storage root: {}", e)))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are opaque identifiers; strip path separators defensively
        let safe: String = key.chars().filter(|c| *c != '/' && *c != '\\').collect();
        self.root.join(safe)
    }
}

#[async_trait]
impl ObjectStoreProvider for LocalObjectStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<String> {
        let path = self.path_for(key);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::ObjectStore(format!("Failed to write '{}': {}", key, e)))?;
        Ok(format!("file://{}", path.display()))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::ObjectStore(format!("Failed to read '{}': {}", key, e)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Error::ObjectStore(format!("Failed to delete '{}': {}", key, e)))
    }

    fn name(&self) -> &str {
        "local-fs"
    }
}
