//! Embedding vector codec and the `cosine_distance` SQL function.
//!
//! Vectors are stored as little-endian `f32` BLOBs of fixed width
//! ([`MAX_EMBEDDING_DIM`] elements). Ranking happens inside SQLite via a
//! registered scalar function so that `ORDER BY … LIMIT` never needs to
//! materialize candidate rows in Rust.

use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;

use crate::embedding::MAX_EMBEDDING_DIM;

/// Encodes a vector as a little-endian `f32` BLOB.
#[must_use]
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decodes a little-endian `f32` BLOB back into a vector.
///
/// Trailing bytes that do not complete an `f32` are ignored.
#[must_use]
pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine distance between two vectors: `1 - cos(a, b)`.
///
/// Returns `1.0` (maximally distant) when either vector has zero norm or
/// the lengths differ, so empty embeddings sort last instead of erroring.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 1.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Registers `cosine_distance(blob, blob) -> REAL` on the connection.
///
/// NULL in either argument yields distance `1.0` so that rows without an
/// embedding rank last rather than poisoning the whole query.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "cosine_distance",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a: Option<Vec<u8>> = ctx.get(0)?;
            let b: Option<Vec<u8>> = ctx.get(1)?;
            Ok(match (a, b) {
                (Some(a), Some(b)) => cosine_distance(&decode_vector(&a), &decode_vector(&b)),
                _ => 1.0,
            })
        },
    )
}

/// Number of bytes in one stored vector.
pub const STORED_VECTOR_BYTES: usize = MAX_EMBEDDING_DIM * 4;
