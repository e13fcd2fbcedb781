//! Temporal accumulator for incoming observations.
//!
//! Buffers `(timestamp, observation)` tuples in arrival order, tracks
//! pending uploads with a per-placeholder timeout, and decides when a
//! prefix of the buffer is ready to flush. The temporal-order rule is
//! strict: the scan stops at the first observation with an unresolved
//! upload, so nothing jumps ahead of a pending screenshot.
//!
//! All state lives behind one mutex, including the shared
//! `uri → create_time` map the coordinator's screenshot GC reads. Every
//! operation mutates under the lock and releases it before any network
//! call happens elsewhere.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::blob::RemoteBlob;
use crate::error::UploadError;
use crate::llm::message::PromptPart;
use crate::prompts;
use crate::transcribe::AudioSegment;
use crate::upload::{Placeholder, Resolution, UploadManager};

/// Default number of ready observations that triggers a flush.
pub const TEMPORARY_MESSAGE_LIMIT: usize = 10;
/// Default per-placeholder timeout before the parent observation is
/// evicted.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for synchronous (non-async) uploads in [`TemporaryAccumulator::add`].
const SYNC_UPLOAD_TIMEOUT: Duration = Duration::from_secs(90);

/// One captured unit of user activity entering the accumulator.
#[derive(Debug, Clone, Default)]
pub struct ObservationInput {
    /// Screenshot paths to upload.
    pub image_paths: Vec<PathBuf>,
    /// Captured audio segments.
    pub audio: Vec<AudioSegment>,
    /// Text fragment.
    pub text: Option<String>,
}

/// An observation whose media have all resolved; ready to flush.
#[derive(Debug, Clone)]
pub struct ReadyObservation {
    /// Observation timestamp (already formatted in the agent timezone).
    pub timestamp: String,
    /// Resolved image references.
    pub images: Vec<RemoteBlob>,
    /// Audio segments.
    pub audio: Vec<AudioSegment>,
    /// Text fragment.
    pub text: Option<String>,
}

/// One user↔assistant exchange captured alongside observations.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    /// `"user"` or `"assistant"`.
    pub role: String,
    /// Turn content.
    pub content: String,
}

#[derive(Debug)]
enum ImageSlot {
    Pending(Placeholder),
    Ready(RemoteBlob),
}

#[derive(Debug)]
struct BufferEntry {
    timestamp: String,
    images: Vec<ImageSlot>,
    audio: Vec<AudioSegment>,
    text: Option<String>,
}

/// Creation metadata for one tracked cloud URI.
#[derive(Debug, Clone)]
pub struct TrackedUri {
    /// Provider-side blob name (used for deletion).
    pub name: String,
    /// Provider-side creation time.
    pub create_time: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    buffer: Vec<BufferEntry>,
    conversation: Vec<ConversationTurn>,
    upload_started: HashMap<String, Instant>,
    uri_create_time: HashMap<String, TrackedUri>,
}

/// Buffers observations and decides when to flush.
pub struct TemporaryAccumulator {
    inner: Mutex<Inner>,
    uploads: UploadManager,
    limit: usize,
    upload_timeout: Duration,
}

impl std::fmt::Debug for TemporaryAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryAccumulator")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl TemporaryAccumulator {
    /// Creates an accumulator over the given upload pipeline.
    #[must_use]
    pub fn new(uploads: UploadManager, limit: usize, upload_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            uploads,
            limit: limit.max(1),
            upload_timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The flush threshold.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Number of buffered observations.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Appends an observation to the buffer.
    ///
    /// With `async_upload` every image is submitted to the upload pool
    /// and tracked as pending; otherwise the call blocks until each
    /// upload resolves (or fails, which skips that observation's image).
    pub async fn add(
        &self,
        input: ObservationInput,
        timestamp: &str,
        async_upload: bool,
    ) -> Result<(), UploadError> {
        let mut images = Vec::with_capacity(input.image_paths.len());
        let mut started = Vec::new();

        for path in &input.image_paths {
            let placeholder = self.uploads.submit(path, timestamp);
            if async_upload {
                started.push(placeholder.id.clone());
                images.push(ImageSlot::Pending(placeholder));
            } else {
                let blob = self.uploads.wait(&placeholder, SYNC_UPLOAD_TIMEOUT).await?;
                self.track_uri(&blob);
                images.push(ImageSlot::Ready(blob));
            }
        }

        let mut inner = self.lock();
        let now = Instant::now();
        for id in started {
            inner.upload_started.insert(id, now);
        }
        inner.buffer.push(BufferEntry {
            timestamp: timestamp.to_string(),
            images,
            audio: input.audio,
            text: input.text,
        });
        debug!(buffered = inner.buffer.len(), "observation added");
        Ok(())
    }

    /// Records one user↔assistant exchange into the current window.
    pub fn add_conversation(&self, user_message: &str, assistant_response: &str) {
        let mut inner = self.lock();
        inner.conversation.push(ConversationTurn {
            role: "user".to_string(),
            content: user_message.to_string(),
        });
        inner.conversation.push(ConversationTurn {
            role: "assistant".to_string(),
            content: assistant_response.to_string(),
        });
    }

    /// Evicts observations whose uploads have been pending longer than
    /// the placeholder timeout. Returns the number of evicted entries.
    pub fn detect_timeouts(&self) -> usize {
        let mut inner = self.lock();
        let timeout = self.upload_timeout;

        let timed_out: Vec<String> = inner
            .upload_started
            .iter()
            .filter(|(_, started)| started.elapsed() > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        if timed_out.is_empty() {
            return 0;
        }

        let before = inner.buffer.len();
        inner.buffer.retain(|entry| {
            let has_timed_out = entry.images.iter().any(|slot| match slot {
                ImageSlot::Pending(p) => timed_out.contains(&p.id),
                ImageSlot::Ready(_) => false,
            });
            if has_timed_out {
                warn!(timestamp = %entry.timestamp, "evicting observation with timed-out upload");
            }
            !has_timed_out
        });
        for id in &timed_out {
            inner.upload_started.remove(id);
        }
        before - inner.buffer.len()
    }

    /// Scans the buffer in temporal order and returns the ready prefix
    /// when it has reached the flush threshold, empty otherwise.
    ///
    /// The scan stops at the first entry with an unresolved placeholder;
    /// entries whose placeholders failed are dropped on the spot (their
    /// failure is final, so they hold nothing back).
    #[must_use]
    pub fn should_flush(&self) -> Vec<ReadyObservation> {
        let ready = self.ready_prefix();
        if ready.len() >= self.limit {
            ready
        } else {
            Vec::new()
        }
    }

    /// The fully-resolved prefix of the buffer, regardless of threshold.
    ///
    /// Used by forced flushes (shutdown, operator request).
    #[must_use]
    pub fn ready_prefix(&self) -> Vec<ReadyObservation> {
        self.detect_timeouts();
        let mut inner = self.lock();
        let inner = &mut *inner;

        let mut ready: Vec<ReadyObservation> = Vec::new();
        let mut failed_indices: Vec<usize> = Vec::new();

        'scan: for (index, entry) in inner.buffer.iter_mut().enumerate() {
            for slot in &mut entry.images {
                if let ImageSlot::Pending(placeholder) = slot {
                    match self.uploads.try_resolve(placeholder) {
                        Resolution::Ready(blob) => {
                            inner.upload_started.remove(&placeholder.id);
                            track(&mut inner.uri_create_time, &blob);
                            self.uploads.cleanup(placeholder);
                            *slot = ImageSlot::Ready(blob);
                        }
                        Resolution::Failed(message) => {
                            warn!(timestamp = %entry.timestamp, %message, "dropping observation with failed upload");
                            inner.upload_started.remove(&placeholder.id);
                            failed_indices.push(index);
                            continue 'scan;
                        }
                        Resolution::Pending => break 'scan,
                    }
                }
            }

            ready.push(ReadyObservation {
                timestamp: entry.timestamp.clone(),
                images: entry
                    .images
                    .iter()
                    .filter_map(|slot| match slot {
                        ImageSlot::Ready(blob) => Some(blob.clone()),
                        ImageSlot::Pending(_) => None,
                    })
                    .collect(),
                audio: entry.audio.clone(),
                text: entry.text.clone(),
            });
        }

        for index in failed_indices.into_iter().rev() {
            inner.buffer.remove(index);
        }

        ready
    }

    /// Removes the flushed prefix from the buffer.
    ///
    /// Called after the router dispatch returns; `count` is the length
    /// of the ready list that was flushed.
    pub fn complete_flush(&self, count: usize) {
        let mut inner = self.lock();
        let count = count.min(inner.buffer.len());
        inner.buffer.drain(..count);
        debug!(remaining = inner.buffer.len(), "flush completed");
    }

    /// Drains the current conversation window for inclusion in a flush.
    #[must_use]
    pub fn drain_conversation(&self) -> Vec<ConversationTurn> {
        std::mem::take(&mut self.lock().conversation)
    }

    /// The most recent resolved images for a chat prompt, oldest first.
    ///
    /// Considers only the last `limit` buffered observations and skips
    /// images that are still pending.
    #[must_use]
    pub fn recent_images_for_chat(&self) -> Vec<(String, RemoteBlob)> {
        self.detect_timeouts();
        let mut inner = self.lock();
        let inner = &mut *inner;

        let start = inner.buffer.len().saturating_sub(self.limit);
        let mut images = Vec::new();
        for entry in &mut inner.buffer[start..] {
            for slot in &mut entry.images {
                match slot {
                    ImageSlot::Ready(blob) => images.push((entry.timestamp.clone(), blob.clone())),
                    ImageSlot::Pending(placeholder) => {
                        if let Resolution::Ready(blob) = self.uploads.try_resolve(placeholder) {
                            inner.upload_started.remove(&placeholder.id);
                            track(&mut inner.uri_create_time, &blob);
                            self.uploads.cleanup(placeholder);
                            images.push((entry.timestamp.clone(), blob.clone()));
                            *slot = ImageSlot::Ready(blob);
                        }
                    }
                }
            }
        }
        images
    }

    // -----------------------------------------------------------------------
    // Shared URI tracking (mutated only under the accumulator mutex)
    // -----------------------------------------------------------------------

    /// Records a resolved URI in the shared tracking map.
    pub fn track_uri(&self, blob: &RemoteBlob) {
        track(&mut self.lock().uri_create_time, blob);
    }

    /// All currently tracked URIs.
    #[must_use]
    pub fn tracked_uris(&self) -> Vec<String> {
        self.lock().uri_create_time.keys().cloned().collect()
    }

    /// Number of tracked URIs.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.lock().uri_create_time.len()
    }

    /// Removes and returns the oldest `excess` tracked URIs by creation
    /// time. Used by the screenshot GC.
    #[must_use]
    pub fn take_oldest_tracked(&self, excess: usize) -> Vec<(String, TrackedUri)> {
        let mut inner = self.lock();
        let mut entries: Vec<(String, TrackedUri)> = inner
            .uri_create_time
            .iter()
            .map(|(uri, info)| (uri.clone(), info.clone()))
            .collect();
        entries.sort_by_key(|(_, info)| info.create_time);
        entries.truncate(excess);
        for (uri, _) in &entries {
            inner.uri_create_time.remove(uri);
        }
        entries
    }
}

fn track(map: &mut HashMap<String, TrackedUri>, blob: &RemoteBlob) {
    map.insert(
        blob.uri.clone(),
        TrackedUri {
            name: blob.name.clone(),
            create_time: blob.create_time,
        },
    );
}

/// Assembles the batched multi-modal flush prompt.
///
/// Part order: screenshot section, voice transcript, text section,
/// conversation snippet, trailing directive.
#[must_use]
pub fn assemble_flush_prompt(
    ready: &[ReadyObservation],
    transcript: &str,
    conversation: &[ConversationTurn],
    directive: &str,
) -> Vec<PromptPart> {
    let mut parts = Vec::new();

    if ready.iter().any(|obs| !obs.images.is_empty()) {
        parts.push(PromptPart::text(prompts::SCREENSHOTS_HEADER));
        for (index, obs) in ready.iter().filter(|o| !o.images.is_empty()).enumerate() {
            parts.push(PromptPart::text(prompts::image_marker(&obs.timestamp, index)));
            for image in &obs.images {
                parts.push(PromptPart::blob_uri(&image.uri));
            }
        }
    }

    if !transcript.is_empty() {
        parts.push(PromptPart::text(prompts::voice_block(transcript)));
    }

    if ready.iter().any(|obs| obs.text.is_some()) {
        parts.push(PromptPart::text(prompts::TEXT_HEADER));
        for obs in ready {
            if let Some(text) = &obs.text {
                parts.push(PromptPart::text(prompts::text_marker(&obs.timestamp, text)));
            }
        }
    }

    if !conversation.is_empty() {
        let mut block = String::from(prompts::CONVERSATION_HEADER);
        for turn in conversation {
            block.push_str(&format!("\nrole: {}; content: {}", turn.role, turn.content));
        }
        parts.push(PromptPart::text(block));
    }

    parts.push(PromptPart::text(directive));
    parts
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    use crate::blob::{BlobStore, MemoryBlobStore};
    use crate::store::Store;
    use crate::upload::UploadOptions;

    fn setup(
        limit: usize,
        upload_timeout: Duration,
    ) -> (TemporaryAccumulator, Arc<MemoryBlobStore>) {
        let blob = Arc::new(MemoryBlobStore::new());
        let store = Store::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        let uploads = UploadManager::new(
            Arc::<MemoryBlobStore>::clone(&blob) as Arc<dyn BlobStore>,
            store,
            "org-1",
            UploadOptions {
                workers: 2,
                attempt_timeout: Duration::from_secs(5),
                max_retries: 1,
                retry_backoff: Duration::from_millis(5),
                compress: false,
                cleanup_threshold: 100,
            },
        );
        (TemporaryAccumulator::new(uploads, limit, upload_timeout), blob)
    }

    fn text_obs(text: &str) -> ObservationInput {
        ObservationInput {
            text: Some(text.to_string()),
            ..ObservationInput::default()
        }
    }

    fn image_obs(path: &str) -> ObservationInput {
        ObservationInput {
            image_paths: vec![Path::new(path).to_path_buf()],
            ..ObservationInput::default()
        }
    }

    #[tokio::test]
    async fn test_flush_waits_for_threshold() {
        let (acc, _blob) = setup(2, UPLOAD_TIMEOUT);
        acc.add(text_obs("one"), "t0", true)
            .await
            .unwrap_or_else(|e| panic!("add: {e}"));
        assert!(acc.should_flush().is_empty());

        acc.add(text_obs("two"), "t1", true)
            .await
            .unwrap_or_else(|e| panic!("add: {e}"));
        let ready = acc.should_flush();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].timestamp, "t0");
        assert_eq!(ready[1].timestamp, "t1");
    }

    #[tokio::test]
    async fn test_temporal_order_blocks_on_pending_upload() {
        let (acc, blob) = setup(2, UPLOAD_TIMEOUT);
        blob.set_upload_delay(Duration::from_millis(80));

        acc.add(image_obs("/tmp/a.bin"), "t0", true)
            .await
            .unwrap_or_else(|e| panic!("add: {e}"));
        acc.add(text_obs("text-only"), "t1", true)
            .await
            .unwrap_or_else(|e| panic!("add: {e}"));

        // The pending upload at position 0 blocks the whole scan even
        // though position 1 needs no upload.
        assert!(acc.should_flush().is_empty());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let ready = acc.should_flush();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].timestamp, "t0");
        assert_eq!(ready[0].images.len(), 1);
        assert_eq!(ready[1].timestamp, "t1");
    }

    #[tokio::test]
    async fn test_timed_out_upload_evicts_observation() {
        let (acc, blob) = setup(1, Duration::from_millis(40));
        blob.set_upload_delay(Duration::from_secs(60));

        acc.add(image_obs("/tmp/never.bin"), "t0", true)
            .await
            .unwrap_or_else(|e| panic!("add: {e}"));
        assert_eq!(acc.buffered(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        // Eviction happens inside should_flush; no error surfaces.
        assert!(acc.should_flush().is_empty());
        assert_eq!(acc.buffered(), 0);
    }

    #[tokio::test]
    async fn test_failed_upload_drops_entry_without_blocking_later_ones() {
        let (acc, blob) = setup(1, UPLOAD_TIMEOUT);
        blob.fail_next_uploads(1);

        acc.add(image_obs("/tmp/failing.bin"), "t0", true)
            .await
            .unwrap_or_else(|e| panic!("add: {e}"));
        acc.add(text_obs("still fine"), "t1", true)
            .await
            .unwrap_or_else(|e| panic!("add: {e}"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let ready = acc.should_flush();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].timestamp, "t1");
        assert_eq!(acc.buffered(), 1);
    }

    #[tokio::test]
    async fn test_complete_flush_trims_head_only() {
        let (acc, _blob) = setup(2, UPLOAD_TIMEOUT);
        for (i, ts) in ["t0", "t1", "t2"].iter().enumerate() {
            acc.add(text_obs(&format!("m{i}")), ts, true)
                .await
                .unwrap_or_else(|e| panic!("add: {e}"));
        }
        let ready = acc.should_flush();
        assert_eq!(ready.len(), 3);
        acc.complete_flush(ready.len());
        assert_eq!(acc.buffered(), 0);
    }

    #[tokio::test]
    async fn test_recent_images_skips_pending() {
        let (acc, blob) = setup(5, UPLOAD_TIMEOUT);
        acc.add(image_obs("/tmp/fast.bin"), "t0", true)
            .await
            .unwrap_or_else(|e| panic!("add: {e}"));
        tokio::time::sleep(Duration::from_millis(30)).await;

        blob.set_upload_delay(Duration::from_secs(60));
        acc.add(image_obs("/tmp/slow.bin"), "t1", true)
            .await
            .unwrap_or_else(|e| panic!("add: {e}"));

        let images = acc.recent_images_for_chat();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].0, "t0");
        assert_eq!(acc.tracked_count(), 1);
    }

    #[tokio::test]
    async fn test_take_oldest_tracked_orders_by_create_time() {
        let (acc, _blob) = setup(2, UPLOAD_TIMEOUT);
        let old = RemoteBlob {
            name: "files/old".to_string(),
            uri: "blob://files/old".to_string(),
            create_time: Utc::now() - chrono::Duration::hours(2),
        };
        let new = RemoteBlob {
            name: "files/new".to_string(),
            uri: "blob://files/new".to_string(),
            create_time: Utc::now(),
        };
        acc.track_uri(&new);
        acc.track_uri(&old);

        let taken = acc.take_oldest_tracked(1);
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].1.name, "files/old");
        assert_eq!(acc.tracked_count(), 1);
    }

    #[test]
    fn test_assemble_flush_prompt_order() {
        let ready = vec![
            ReadyObservation {
                timestamp: "t0".to_string(),
                images: vec![RemoteBlob {
                    name: "files/0".to_string(),
                    uri: "blob://files/0".to_string(),
                    create_time: Utc::now(),
                }],
                audio: Vec::new(),
                text: None,
            },
            ReadyObservation {
                timestamp: "t1".to_string(),
                images: Vec::new(),
                audio: Vec::new(),
                text: Some("typed something".to_string()),
            },
        ];
        let conversation = vec![ConversationTurn {
            role: "user".to_string(),
            content: "what am I doing?".to_string(),
        }];
        let parts = assemble_flush_prompt(&ready, "spoken words", &conversation, "[directive]");

        let texts: Vec<String> = parts
            .iter()
            .map(|p| match p {
                PromptPart::Text { text } => text.clone(),
                PromptPart::BlobUri { uri } => format!("<{uri}>"),
                PromptPart::InlineImage { .. } => "<inline>".to_string(),
            })
            .collect();

        assert_eq!(texts[0], prompts::SCREENSHOTS_HEADER);
        assert_eq!(texts[1], "Timestamp: t0 Image Index 0:");
        assert_eq!(texts[2], "<blob://files/0>");
        assert!(texts[3].contains("spoken words"));
        assert_eq!(texts[4], prompts::TEXT_HEADER);
        assert!(texts[5].starts_with("Timestamp: t1 Text:"));
        assert!(texts[6].contains("what am I doing?"));
        assert_eq!(texts.last().map(String::as_str), Some("[directive]"));
    }
}
