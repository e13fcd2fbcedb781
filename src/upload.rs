//! Background upload pipeline for observation media.
//!
//! A bounded pool of workers drains a FIFO job channel so blob uploads
//! never sit on the accumulator's critical path. Submission returns a
//! [`Placeholder`] immediately; resolution is polled non-blockingly by
//! the accumulator or awaited with a deadline.
//!
//! Worker algorithm per job: reuse an existing cloud mapping when the
//! remote blob still exists, otherwise compress the image, upload with a
//! per-attempt timeout and bounded retries, fall back once to the
//! original file, record the mapping, and publish the outcome keyed by
//! placeholder id. Upload failures are fatal to the placeholder only;
//! the system keeps flushing unrelated observations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

use crate::blob::{BlobStore, RemoteBlob};
use crate::error::UploadError;
use crate::schema::CloudFileMapping;
use crate::store::Store;

/// Default number of upload workers.
const DEFAULT_WORKERS: usize = 4;
/// Default per-attempt upload timeout.
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default retry budget per file.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default backoff between retries.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);
/// Resolved-results table size that triggers a wholesale purge.
const DEFAULT_CLEANUP_THRESHOLD: usize = 100;
/// Longest edge bounds for compressed screenshots.
const COMPRESS_MAX_WIDTH: u32 = 1920;
/// Height bound for compressed screenshots.
const COMPRESS_MAX_HEIGHT: u32 = 1080;
/// JPEG quality for compressed screenshots.
const COMPRESS_JPEG_QUALITY: u8 = 85;

/// Immediately-returned token for a pending upload.
#[derive(Debug, Clone)]
pub struct Placeholder {
    /// Unique id keying the resolution table.
    pub id: String,
    /// Local path being uploaded.
    pub local_path: PathBuf,
}

/// Non-blocking resolution state of a placeholder.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Upload completed; the remote reference is ready.
    Ready(RemoteBlob),
    /// Upload failed permanently; the placeholder is dead.
    Failed(String),
    /// Still in flight.
    Pending,
}

/// Tuning knobs for the upload pipeline.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Worker pool size.
    pub workers: usize,
    /// Per-attempt upload timeout.
    pub attempt_timeout: Duration,
    /// Retry budget per file.
    pub max_retries: u32,
    /// Backoff between retries.
    pub retry_backoff: Duration,
    /// Whether to JPEG-compress images before upload.
    pub compress: bool,
    /// Resolved-results count that triggers a purge.
    pub cleanup_threshold: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            compress: true,
            cleanup_threshold: DEFAULT_CLEANUP_THRESHOLD,
        }
    }
}

#[derive(Debug)]
struct Job {
    placeholder_id: String,
    path: PathBuf,
    timestamp: String,
}

#[derive(Debug, Clone)]
enum Outcome {
    Resolved(RemoteBlob),
    Failed(String),
}

struct Shared {
    blob: Arc<dyn BlobStore>,
    store: Store,
    organization_id: String,
    options: UploadOptions,
    results: Mutex<HashMap<String, Outcome>>,
    notify: Notify,
}

/// Handle to the upload worker pool.
///
/// Cloning is cheap; workers shut down when every handle is dropped and
/// the job channel closes.
#[derive(Clone)]
pub struct UploadManager {
    jobs: mpsc::UnboundedSender<Job>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for UploadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadManager")
            .field("provider", &self.shared.blob.name())
            .finish_non_exhaustive()
    }
}

impl UploadManager {
    /// Spawns the worker pool over the given blob provider and store.
    #[must_use]
    pub fn new(
        blob: Arc<dyn BlobStore>,
        store: Store,
        organization_id: &str,
        options: UploadOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let shared = Arc::new(Shared {
            blob,
            store,
            organization_id: organization_id.to_string(),
            options,
            results: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        });

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker in 0..shared.options.workers.max(1) {
            let rx = Arc::clone(&rx);
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    debug!(worker, path = %job.path.display(), "upload job started");
                    process_job(&shared, job).await;
                }
            });
        }

        Self { jobs: tx, shared }
    }

    /// Queues a file for upload and returns a placeholder immediately.
    #[must_use]
    pub fn submit(&self, path: &Path, timestamp: &str) -> Placeholder {
        let placeholder = Placeholder {
            id: crate::ids::generate("upload"),
            local_path: path.to_path_buf(),
        };
        // Send only fails when every worker is gone; surface that as a
        // failed placeholder rather than a panic.
        if self
            .jobs
            .send(Job {
                placeholder_id: placeholder.id.clone(),
                path: path.to_path_buf(),
                timestamp: timestamp.to_string(),
            })
            .is_err()
        {
            self.shared.publish(
                &placeholder.id,
                Outcome::Failed("upload workers are shut down".to_string()),
            );
        }
        placeholder
    }

    /// Non-blocking poll of a placeholder.
    ///
    /// A failed outcome is consumed by the poll (the placeholder is dead
    /// afterwards); a ready outcome stays until [`Self::cleanup`].
    #[must_use]
    pub fn try_resolve(&self, placeholder: &Placeholder) -> Resolution {
        let mut results = self
            .shared
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match results.get(&placeholder.id) {
            Some(Outcome::Resolved(blob)) => Resolution::Ready(blob.clone()),
            Some(Outcome::Failed(_)) => {
                let message = match results.remove(&placeholder.id) {
                    Some(Outcome::Failed(message)) => message,
                    _ => String::new(),
                };
                Resolution::Failed(message)
            }
            None => Resolution::Pending,
        }
    }

    /// Blocks up to `timeout` for a placeholder to resolve.
    pub async fn wait(
        &self,
        placeholder: &Placeholder,
        timeout: Duration,
    ) -> Result<RemoteBlob, UploadError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_resolve(placeholder) {
                Resolution::Ready(blob) => return Ok(blob),
                Resolution::Failed(message) => {
                    return Err(UploadError::Permanent { message });
                }
                Resolution::Pending => {}
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(UploadError::Timeout {
                    seconds: timeout.as_secs(),
                    path: placeholder.local_path.display().to_string(),
                });
            }
        }
    }

    /// Removes a resolved result from the in-memory table.
    pub fn cleanup(&self, placeholder: &Placeholder) {
        self.shared
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&placeholder.id);
    }

    /// Number of resolved outcomes currently held.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.shared
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Shared {
    fn publish(&self, placeholder_id: &str, outcome: Outcome) {
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        results.insert(placeholder_id.to_string(), outcome);
        // Callers are responsible for consuming results promptly; past
        // the threshold the table is purged wholesale.
        if results.len() > self.options.cleanup_threshold {
            results.clear();
        }
        drop(results);
        self.notify.notify_waiters();
    }
}

async fn process_job(shared: &Shared, job: Job) {
    match run_job(shared, &job).await {
        Ok(blob) => {
            debug!(path = %job.path.display(), uri = %blob.uri, "upload resolved");
            shared.publish(&job.placeholder_id, Outcome::Resolved(blob));
        }
        Err(e) => {
            warn!(path = %job.path.display(), error = %e, "upload failed permanently");
            shared.publish(&job.placeholder_id, Outcome::Failed(e.to_string()));
        }
    }
}

async fn run_job(shared: &Shared, job: &Job) -> Result<RemoteBlob, UploadError> {
    // Reuse a live mapping when the remote blob still exists.
    if let Ok(Some(mapping)) = shared.store.mapping_for_local(&job.path.display().to_string())
        && let Ok(existing) = shared.blob.list().await
        && let Some(blob) = existing.into_iter().find(|b| b.name == mapping.cloud_file_id)
    {
        debug!(path = %job.path.display(), "reusing existing cloud mapping");
        return Ok(blob);
    }

    let compressed = if shared.options.compress && is_image_path(&job.path) {
        compress_image(&job.path).await
    } else {
        None
    };
    let upload_path = compressed.as_deref().unwrap_or(&job.path);

    let mut result = upload_with_retries(shared, upload_path).await;

    // Compressed upload exhausted its budget: one fallback pass with the
    // original file.
    if result.is_err()
        && let Some(compressed_path) = compressed.as_deref()
        && compressed_path != job.path
    {
        warn!(path = %job.path.display(), "compressed upload failed, retrying original");
        result = upload_attempt(shared, &job.path).await;
    }

    if let Some(compressed_path) = compressed {
        let _ = tokio::fs::remove_file(&compressed_path).await;
    }

    let blob = result?;
    let mapping = CloudFileMapping::new(
        &shared.organization_id,
        &job.path.display().to_string(),
        &blob.name,
        &blob.uri,
        &job.timestamp,
    );
    shared
        .store
        .insert_mapping(&mapping)
        .map_err(|e| UploadError::Permanent {
            message: format!("failed to record cloud mapping: {e}"),
        })?;
    Ok(blob)
}

async fn upload_with_retries(shared: &Shared, path: &Path) -> Result<RemoteBlob, UploadError> {
    let mut last_error = UploadError::Permanent {
        message: "no attempts made".to_string(),
    };
    for attempt in 0..shared.options.max_retries.max(1) {
        match upload_attempt(shared, path).await {
            Ok(blob) => return Ok(blob),
            Err(e) => {
                warn!(path = %path.display(), attempt, error = %e, "upload attempt failed");
                let transient = e.is_transient();
                last_error = e;
                if !transient {
                    break;
                }
                if attempt + 1 < shared.options.max_retries {
                    tokio::time::sleep(shared.options.retry_backoff).await;
                }
            }
        }
    }
    Err(last_error)
}

async fn upload_attempt(shared: &Shared, path: &Path) -> Result<RemoteBlob, UploadError> {
    match tokio::time::timeout(shared.options.attempt_timeout, shared.blob.upload(path)).await {
        Ok(result) => result,
        Err(_) => Err(UploadError::Timeout {
            seconds: shared.options.attempt_timeout.as_secs(),
            path: path.display().to_string(),
        }),
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            matches!(ext.to_lowercase().as_str(), "png" | "jpg" | "jpeg")
        })
}

/// Re-encodes an image as RGB JPEG bounded to 1920×1080 beside the
/// original (`{stem}_compressed.jpg`). Returns `None` when anything
/// fails; the caller falls back to the original file.
async fn compress_image(path: &Path) -> Option<PathBuf> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let img = image::open(&path).ok()?;
        let resized = img.thumbnail(COMPRESS_MAX_WIDTH, COMPRESS_MAX_HEIGHT).to_rgb8();

        let stem = path.file_stem()?.to_str()?;
        let out = path.with_file_name(format!("{stem}_compressed.jpg"));
        let file = std::fs::File::create(&out).ok()?;
        let mut writer = std::io::BufWriter::new(file);
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, COMPRESS_JPEG_QUALITY);
        resized.write_with_encoder(encoder).ok()?;
        Some(out)
    })
    .await
    .ok()
    .flatten()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;

    fn fast_options() -> UploadOptions {
        UploadOptions {
            workers: 2,
            attempt_timeout: Duration::from_millis(100),
            max_retries: 3,
            retry_backoff: Duration::from_millis(5),
            compress: false,
            cleanup_threshold: 100,
        }
    }

    fn manager(blob: &Arc<MemoryBlobStore>, options: UploadOptions) -> (UploadManager, Store) {
        let store = Store::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        let blob: Arc<dyn BlobStore> = Arc::<MemoryBlobStore>::clone(blob);
        (
            UploadManager::new(blob, store.clone(), "org-1", options),
            store,
        )
    }

    #[tokio::test]
    async fn test_submit_returns_pending_then_resolves() {
        let blob = Arc::new(MemoryBlobStore::new());
        blob.set_upload_delay(Duration::from_millis(30));
        let (uploads, store) = manager(&blob, fast_options());

        let placeholder = uploads.submit(Path::new("/tmp/shot.bin"), "t0");
        assert!(matches!(uploads.try_resolve(&placeholder), Resolution::Pending));

        let resolved = uploads
            .wait(&placeholder, Duration::from_secs(2))
            .await
            .unwrap_or_else(|e| panic!("wait: {e}"));
        assert!(resolved.uri.starts_with("blob://"));

        // Mapping recorded as uploaded.
        let mapping = store
            .mapping_for_local("/tmp/shot.bin")
            .unwrap_or_else(|e| panic!("mapping: {e}"))
            .unwrap_or_else(|| panic!("mapping missing"));
        assert_eq!(mapping.uri, resolved.uri);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let blob = Arc::new(MemoryBlobStore::new());
        blob.fail_next_uploads(2);
        let (uploads, _store) = manager(&blob, fast_options());

        let placeholder = uploads.submit(Path::new("/tmp/retry.bin"), "t0");
        let resolved = uploads.wait(&placeholder, Duration::from_secs(2)).await;
        assert!(resolved.is_ok(), "expected third attempt to succeed");
        assert_eq!(blob.upload_attempts(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_placeholder() {
        let blob = Arc::new(MemoryBlobStore::new());
        blob.fail_next_uploads(100);
        let (uploads, _store) = manager(&blob, fast_options());

        let placeholder = uploads.submit(Path::new("/tmp/doomed.bin"), "t0");
        let result = uploads.wait(&placeholder, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(UploadError::Permanent { .. })));
        // The failure was consumed; the placeholder is dead.
        assert!(matches!(uploads.try_resolve(&placeholder), Resolution::Pending));
    }

    #[tokio::test]
    async fn test_wait_times_out_on_stalled_upload() {
        let blob = Arc::new(MemoryBlobStore::new());
        blob.set_upload_delay(Duration::from_secs(30));
        let (uploads, _store) = manager(&blob, fast_options());

        let placeholder = uploads.submit(Path::new("/tmp/stalled.bin"), "t0");
        let result = uploads.wait(&placeholder, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(UploadError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_mapping_reuse_skips_upload() {
        let blob = Arc::new(MemoryBlobStore::new());
        let (uploads, store) = manager(&blob, fast_options());

        // First upload records the mapping.
        let p1 = uploads.submit(Path::new("/tmp/same.bin"), "t0");
        let first = uploads
            .wait(&p1, Duration::from_secs(2))
            .await
            .unwrap_or_else(|e| panic!("wait: {e}"));
        assert_eq!(blob.upload_attempts(), 1);

        // Second submission of the same path reuses it.
        let p2 = uploads.submit(Path::new("/tmp/same.bin"), "t1");
        let second = uploads
            .wait(&p2, Duration::from_secs(2))
            .await
            .unwrap_or_else(|e| panic!("wait: {e}"));
        assert_eq!(first.uri, second.uri);
        assert_eq!(blob.upload_attempts(), 1);

        // Store still holds exactly one mapping for the path.
        assert!(
            store
                .mapping_for_local("/tmp/same.bin")
                .unwrap_or_else(|e| panic!("mapping: {e}"))
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_cleanup_removes_resolved_result() {
        let blob = Arc::new(MemoryBlobStore::new());
        let (uploads, _store) = manager(&blob, fast_options());

        let placeholder = uploads.submit(Path::new("/tmp/done.bin"), "t0");
        uploads
            .wait(&placeholder, Duration::from_secs(2))
            .await
            .unwrap_or_else(|e| panic!("wait: {e}"));
        assert_eq!(uploads.resolved_count(), 1);
        uploads.cleanup(&placeholder);
        assert_eq!(uploads.resolved_count(), 0);
    }

    #[tokio::test]
    async fn test_image_is_compressed_before_upload() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let image_path = dir.path().join("screen.png");
        let img = image::RgbImage::from_pixel(2400, 1200, image::Rgb([10, 20, 30]));
        img.save(&image_path).unwrap_or_else(|e| panic!("save: {e}"));

        let blob = Arc::new(MemoryBlobStore::new());
        let options = UploadOptions {
            compress: true,
            ..fast_options()
        };
        let (uploads, _store) = manager(&blob, options);

        let placeholder = uploads.submit(&image_path, "t0");
        uploads
            .wait(&placeholder, Duration::from_secs(5))
            .await
            .unwrap_or_else(|e| panic!("wait: {e}"));

        let paths = blob.uploaded_paths();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("screen_compressed.jpg"), "got {}", paths[0]);
        // The compressed sibling is removed after upload.
        assert!(!dir.path().join("screen_compressed.jpg").exists());
    }
}
