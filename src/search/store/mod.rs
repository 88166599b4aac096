mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{Chunk, ChunkRecord, ScoredChunk, StoreStats};

use async_trait::async_trait;

use crate::error::Result;

/// Narrow read/write contract over persisted chunks, their lexical index and
/// their vector entries. Every mutation is visible to queries issued after it
/// returns.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert or update by `(source_path, chunk_index)`; returns the stable id.
    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<i64>;
    /// Replace the vector entry of a chunk (delete, then insert).
    async fn upsert_embedding(&self, chunk_id: i64, vector: &[f32], content_hash: &str)
        -> Result<()>;
    /// Content hash recorded with the chunk's current embedding, if any.
    async fn embedding_hash(&self, chunk_id: i64) -> Result<Option<String>>;
    async fn query_keyword(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>>;
    async fn query_vector(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;
    async fn get_chunk(&self, id: i64) -> Result<Option<Chunk>>;
    async fn get_chunk_at(&self, source_path: &str, chunk_index: usize) -> Result<Option<Chunk>>;
    async fn count_chunks(&self) -> Result<usize>;
    async fn list_sources(&self) -> Result<Vec<String>>;
    /// Remove every chunk of a source; returns how many were removed.
    async fn delete_source(&self, source_path: &str) -> Result<usize>;
    /// Remove chunks of a source whose index is `>= keep`.
    async fn truncate_source(&self, source_path: &str, keep: usize) -> Result<usize>;
    async fn stats(&self) -> Result<StoreStats>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Cosine distance: 0 for identical direction, 2 for opposite.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
