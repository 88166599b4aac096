use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::store::{Chunk, ScoredChunk};

/// Which retrieval channel(s) surfaced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Keyword,
    Semantic,
    Hybrid,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Keyword => "keyword",
            MatchType::Semantic => "semantic",
            MatchType::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized per-channel scores of one merged candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelScores {
    KeywordOnly { bm25: f32 },
    VectorOnly { vec: f32 },
    Both { bm25: f32, vec: f32 },
}

impl ChannelScores {
    pub fn bm25(&self) -> f32 {
        match *self {
            ChannelScores::KeywordOnly { bm25 } | ChannelScores::Both { bm25, .. } => bm25,
            ChannelScores::VectorOnly { .. } => 0.0,
        }
    }

    pub fn vec(&self) -> f32 {
        match *self {
            ChannelScores::VectorOnly { vec } | ChannelScores::Both { vec, .. } => vec,
            ChannelScores::KeywordOnly { .. } => 0.0,
        }
    }

    pub fn match_type(&self) -> MatchType {
        match self {
            ChannelScores::KeywordOnly { .. } => MatchType::Keyword,
            ChannelScores::VectorOnly { .. } => MatchType::Semantic,
            ChannelScores::Both { .. } => MatchType::Hybrid,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Chunk,
    pub scores: ChannelScores,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub keyword: f32,
    pub vector: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            keyword: 0.4,
            vector: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f32,
    pub match_type: MatchType,
    pub keyword_score: f32,
    pub vector_score: f32,
}

/// Map a BM25 rank (negative, lower is better) onto [0, 1].
pub fn normalize_keyword(raw: f32) -> f32 {
    (1.0 + raw / 10.0).clamp(0.0, 1.0)
}

/// Map a cosine distance (0 = identical) onto [0, 1].
pub fn normalize_distance(distance: f32) -> f32 {
    (1.0 - distance).max(0.0)
}

/// Two-pass merge by chunk id. Keyword hits come first in their own order,
/// then vector hits either upgrade an existing entry to `Both` or are
/// appended as `VectorOnly`.
pub fn merge_candidates(keyword: Vec<ScoredChunk>, vector: Vec<ScoredChunk>) -> Vec<Candidate> {
    let mut merged: Vec<Candidate> = Vec::with_capacity(keyword.len() + vector.len());
    let mut positions: HashMap<i64, usize> = HashMap::new();

    for hit in keyword {
        if positions.contains_key(&hit.chunk.id) {
            continue;
        }
        positions.insert(hit.chunk.id, merged.len());
        merged.push(Candidate {
            scores: ChannelScores::KeywordOnly {
                bm25: normalize_keyword(hit.raw_score),
            },
            chunk: hit.chunk,
        });
    }

    for hit in vector {
        let vec = normalize_distance(hit.raw_score);
        match positions.get(&hit.chunk.id) {
            Some(&pos) => {
                let candidate = &mut merged[pos];
                candidate.scores = match candidate.scores {
                    ChannelScores::KeywordOnly { bm25 } => ChannelScores::Both { bm25, vec },
                    // Duplicate vector hit for the same chunk: keep the first.
                    other => other,
                };
            }
            None => {
                positions.insert(hit.chunk.id, merged.len());
                merged.push(Candidate {
                    scores: ChannelScores::VectorOnly { vec },
                    chunk: hit.chunk,
                });
            }
        }
    }

    merged
}

/// Weighted fusion, stable descending sort (ties keep merge order), top `limit`.
pub fn fuse(candidates: Vec<Candidate>, weights: FusionWeights, limit: usize) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .map(|candidate| {
            let bm25 = candidate.scores.bm25();
            let vec = candidate.scores.vec();
            SearchResult {
                score: bm25 * weights.keyword + vec * weights.vector,
                match_type: candidate.scores.match_type(),
                keyword_score: bm25,
                vector_score: vec,
                chunk: candidate.chunk,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    results
}
