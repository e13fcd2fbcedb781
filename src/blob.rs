//! Blob storage contract and the in-memory test double.
//!
//! Production deployments plug a real provider (GCS-style file API) in
//! behind [`BlobStore`]; the engine only needs upload/delete/list with
//! stable names and URIs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::UploadError;

/// A blob that exists on the provider side.
#[derive(Debug, Clone)]
pub struct RemoteBlob {
    /// Provider-side name, used for deletion.
    pub name: String,
    /// Stable URI, used in prompts.
    pub uri: String,
    /// Provider-side creation time.
    pub create_time: DateTime<Utc>,
}

/// Contract for blob storage providers.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Uploads a local file and returns its remote reference.
    async fn upload(&self, path: &Path) -> Result<RemoteBlob, UploadError>;

    /// Deletes a blob by provider-side name.
    async fn delete(&self, name: &str) -> Result<(), UploadError>;

    /// Lists all blobs.
    async fn list(&self) -> Result<Vec<RemoteBlob>, UploadError>;
}

/// In-memory blob store with injectable latency and failures.
///
/// Tests use it to shape upload timing (delayed uploads, uploads that
/// never finish within a deadline) and to inject transient errors for
/// the retry path.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, RemoteBlob>>,
    upload_delay: Mutex<Duration>,
    fail_remaining: AtomicUsize,
    uploads: AtomicUsize,
    uploaded_paths: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    /// Creates an empty store with no latency and no failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent upload sleeps this long before completing.
    pub fn set_upload_delay(&self, delay: Duration) {
        *self
            .upload_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// The next `n` uploads fail with a transient error.
    pub fn fail_next_uploads(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Total upload attempts observed (including failed ones).
    #[must_use]
    pub fn upload_attempts(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Number of blobs currently stored.
    #[must_use]
    pub fn blob_count(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Local paths passed to successful and failed uploads, in order.
    #[must_use]
    pub fn uploaded_paths(&self) -> Vec<String> {
        self.uploaded_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Seeds a blob directly, bypassing upload. Used to model files that
    /// already exist in the cloud at startup.
    pub fn seed(&self, blob: RemoteBlob) {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(blob.name.clone(), blob);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, path: &Path) -> Result<RemoteBlob, UploadError> {
        let delay = *self
            .upload_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let attempt = self.uploads.fetch_add(1, Ordering::SeqCst);
        self.uploaded_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.display().to_string());
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(UploadError::Transient {
                message: format!("injected failure for {}", path.display()),
            });
        }

        let blob = RemoteBlob {
            name: format!("files/{attempt}"),
            uri: format!("blob://files/{attempt}"),
            create_time: Utc::now(),
        };
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(blob.name.clone(), blob.clone());
        Ok(blob)
    }

    async fn delete(&self, name: &str) -> Result<(), UploadError> {
        let removed = self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if removed.is_none() {
            return Err(UploadError::Permanent {
                message: format!("no such blob: {name}"),
            });
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RemoteBlob>, UploadError> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_list_delete() {
        let store = MemoryBlobStore::new();
        let blob = store
            .upload(Path::new("/tmp/a.png"))
            .await
            .unwrap_or_else(|e| panic!("upload: {e}"));
        assert!(blob.uri.starts_with("blob://"));

        let listed = store.list().await.unwrap_or_else(|e| panic!("list: {e}"));
        assert_eq!(listed.len(), 1);

        store
            .delete(&blob.name)
            .await
            .unwrap_or_else(|e| panic!("delete: {e}"));
        assert_eq!(store.blob_count(), 0);
        assert!(store.delete(&blob.name).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let store = MemoryBlobStore::new();
        store.fail_next_uploads(1);
        let err = store
            .upload(Path::new("/tmp/a.png"))
            .await
            .map(|_| ())
            .map_err(|e| e.is_transient());
        assert_eq!(err, Err(true));
        // Next attempt succeeds.
        assert!(store.upload(Path::new("/tmp/a.png")).await.is_ok());
    }
}
