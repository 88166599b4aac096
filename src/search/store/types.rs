use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A persisted slice of one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub source_path: String,
    pub title: String,
    pub text: String,
    pub chunk_index: usize,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Write-side view of a chunk: everything except store-assigned fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub source_path: String,
    pub title: String,
    pub text: String,
    pub chunk_index: usize,
    pub metadata: BTreeMap<String, String>,
}

/// A chunk plus the raw score of the channel that produced it: BM25 rank for
/// keyword queries (negative, lower is better), cosine distance for vector
/// queries (0 is identical).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub raw_score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_sources: usize,
    pub total_chunks: usize,
    pub total_embeddings: usize,
    pub last_updated: Option<DateTime<Utc>>,
}
