//! Audio transcription contract.
//!
//! Transcription is an external collaborator; the accumulator only needs
//! a transcript string to fold into the flush prompt.

use async_trait::async_trait;
use thiserror::Error;

/// One captured audio segment.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    /// Raw audio bytes.
    pub data: Vec<u8>,
    /// MIME type, e.g. `"audio/wav"`.
    pub mime: String,
}

/// Transcription failure.
#[derive(Debug, Error)]
#[error("transcription failed: {message}")]
pub struct TranscribeError {
    /// Provider-reported cause.
    pub message: String,
}

/// Contract for audio transcription providers.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes a sequence of segments into one transcript.
    async fn process(&self, segments: &[AudioSegment]) -> Result<String, TranscribeError>;
}

/// Transcriber that returns a fixed string per segment batch.
///
/// The default (empty prefix) acts as a no-op for deployments without a
/// speech backend; tests use a recognizable prefix instead.
#[derive(Debug, Default)]
pub struct FixedTranscriber {
    prefix: String,
}

impl FixedTranscriber {
    /// Creates a transcriber that emits `prefix` plus the segment count.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn process(&self, segments: &[AudioSegment]) -> Result<String, TranscribeError> {
        if segments.is_empty() || self.prefix.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("{} ({} segment(s))", self.prefix, segments.len()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_transcriber() {
        let transcriber = FixedTranscriber::new("meeting notes");
        let segments = vec![AudioSegment {
            data: vec![0u8; 4],
            mime: "audio/wav".to_string(),
        }];
        let transcript = transcriber
            .process(&segments)
            .await
            .unwrap_or_else(|e| panic!("process: {e}"));
        assert_eq!(transcript, "meeting notes (1 segment(s))");
    }

    #[tokio::test]
    async fn test_default_is_noop() {
        let transcriber = FixedTranscriber::default();
        let transcript = transcriber
            .process(&[])
            .await
            .unwrap_or_else(|e| panic!("process: {e}"));
        assert!(transcript.is_empty());
    }
}
