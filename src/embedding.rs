//! Embedding provider contract and the built-in fallback.
//!
//! Real deployments plug a remote embedding API in behind [`Embedder`];
//! the engine itself only requires determinism and a fixed dimension.
//! Vectors are zero-padded to [`MAX_EMBEDDING_DIM`] before storage so
//! that providers with different native dimensions share one column
//! layout and one distance function.
//!
//! [`HashEmbedder`] is the dependency-free fallback: token-hashed
//! bag-of-words vectors. It carries no semantics beyond lexical overlap,
//! which is enough for deterministic ranking and for tests; swap in a
//! real provider for production retrieval quality.

use crate::error::MemoryError;

/// Fixed storage width for all embedding columns.
///
/// Providers may emit fewer dimensions; stored vectors are zero-padded
/// up to this width. Providers emitting more are truncated.
pub const MAX_EMBEDDING_DIM: usize = 4096;

/// Contract for text embedding providers.
pub trait Embedder: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Native output dimension, at most [`MAX_EMBEDDING_DIM`].
    fn dimensions(&self) -> usize;

    /// Embeds a text into a vector of [`Self::dimensions`] length.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Embedding`] on provider failure.
    fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

/// Zero-pads (or truncates) a raw embedding to [`MAX_EMBEDDING_DIM`].
#[must_use]
pub fn pad_embedding(mut raw: Vec<f32>) -> Vec<f32> {
    raw.truncate(MAX_EMBEDDING_DIM);
    raw.resize(MAX_EMBEDDING_DIM, 0.0);
    raw
}

/// Deterministic token-hash embedder.
///
/// Lowercases, splits on non-alphanumeric boundaries, hashes each token
/// with FNV-1a into one of `dims` buckets, and L2-normalizes the counts.
/// Identical texts always embed identically, so an exact-text query ranks
/// its source item first under cosine distance.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

/// Default dimension for the hash embedder.
const HASH_EMBEDDER_DIMS: usize = 256;

impl HashEmbedder {
    /// Creates a hash embedder with the given dimension.
    ///
    /// `dims` is clamped to `1..=MAX_EMBEDDING_DIM`.
    #[must_use]
    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims: dims.clamp(1, MAX_EMBEDDING_DIM),
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::with_dims(HASH_EMBEDDER_DIMS)
    }
}

/// FNV-1a 64-bit hash, stable across builds.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let mut vector = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();

        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let hash = fnv1a(token.as_bytes());
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hash % self.dims as u64) as usize;
            // Sign bit from a second hash fold keeps opposing tokens from
            // collapsing into pure magnitude.
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn embed(text: &str) -> Vec<f32> {
        HashEmbedder::default()
            .embed(text)
            .unwrap_or_else(|e| panic!("embed failed: {e}"))
    }

    #[test]
    fn test_identical_text_identical_vector() {
        assert_eq!(embed("user opened terminal"), embed("user opened terminal"));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(embed("Hello World"), embed("hello world"));
    }

    #[test]
    fn test_normalized() {
        let v = embed("some tokens here");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_zero_vector() {
        let v = embed("");
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_pad_embedding_width() {
        let padded = pad_embedding(vec![1.0, 2.0]);
        assert_eq!(padded.len(), MAX_EMBEDDING_DIM);
        assert_eq!(padded[0], 1.0);
        assert_eq!(padded[2], 0.0);
    }

    #[test]
    fn test_pad_embedding_truncates_oversized() {
        let padded = pad_embedding(vec![1.0; MAX_EMBEDDING_DIM + 10]);
        assert_eq!(padded.len(), MAX_EMBEDDING_DIM);
    }

    #[test]
    fn test_dims_clamped() {
        assert_eq!(HashEmbedder::with_dims(0).dimensions(), 1);
        assert_eq!(
            HashEmbedder::with_dims(MAX_EMBEDDING_DIM * 2).dimensions(),
            MAX_EMBEDDING_DIM
        );
    }
}
