//! Artifact sink seam between the pipeline and durable storage.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::R2Client;
use crate::error::{StorageError, StorageResult};
use crate::keys::validate_key;

/// Durable storage for generated artifacts.
///
/// `store` has replace-on-conflict semantics: writing the same key twice
/// leaves the second payload and returns the same public URL.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Store bytes under `key` and return the public URL.
    async fn store(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String>;

    /// Store a local file under `key` and return the public URL.
    async fn store_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String> {
        let bytes = tokio::fs::read(path).await?;
        self.store(bytes, key, content_type).await
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ArtifactSink for R2Client {
    async fn store(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String> {
        self.upload_bytes(bytes, key, content_type).await?;
        Ok(self.public_url(key))
    }

    async fn store_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String> {
        self.upload_file(path, key, content_type).await?;
        Ok(self.public_url(key))
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        R2Client::check_connectivity(self).await
    }
}

/// An object held by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// Number of times the key was written
    pub writes: u32,
}

/// In-memory sink for development and testing.
pub struct MemorySink {
    base_url: String,
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_uploads: AtomicBool,
}

impl MemorySink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
            fail_uploads: AtomicBool::new(false),
        }
    }

    /// Make every subsequent upload fail (or succeed again).
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new("https://cdn.test")
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn store(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::upload_failed(format!("injected failure for {}", key)));
        }

        let mut objects = self
            .objects
            .lock()
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;
        let writes = objects.get(key).map(|o| o.writes).unwrap_or(0) + 1;
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                writes,
            },
        );
        Ok(format!("{}/{}", self.base_url, key))
    }
}
