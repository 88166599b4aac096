use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::embedder::Embedder;
use super::hybrid::{fuse, merge_candidates, FusionWeights, SearchResult};
use super::store::{ChunkStore, ScoredChunk};
use crate::config::SearchOptionsConfig;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Each channel fetches `overfetch * k` candidates before fusion.
    pub overfetch: usize,
    pub weights: FusionWeights,
    /// Upper bound on embedding the query plus the vector lookup.
    pub vector_timeout: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&SearchOptionsConfig::default())
    }
}

impl From<&SearchOptionsConfig> for SearchOptions {
    fn from(config: &SearchOptionsConfig) -> Self {
        Self {
            overfetch: config.overfetch.max(1),
            weights: FusionWeights {
                keyword: config.keyword_weight,
                vector: config.vector_weight,
            },
            vector_timeout: Duration::from_millis(config.vector_timeout_ms),
        }
    }
}

/// Runs keyword and vector retrieval side by side and fuses the two.
pub struct Searcher {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    options: SearchOptions,
}

impl Searcher {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        options: SearchOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Hybrid search returning at most `k` results.
    ///
    /// The vector channel never fails the query: provider errors, store errors
    /// on the vector path and timeouts all degrade to keyword-only fusion.
    /// Keyword-side store errors are returned.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let fetch = k.saturating_mul(self.options.overfetch);
        // The keyword query runs synchronously on SQLite once polled, so the
        // vector branch goes first to get its provider request in flight.
        let (vector, keyword) = tokio::join!(
            self.vector_channel(query, fetch),
            self.store.query_keyword(query, fetch)
        );
        let keyword = keyword?;

        debug!(
            keyword_hits = keyword.len(),
            vector_hits = vector.len(),
            "fusing retrieval channels"
        );

        let candidates = merge_candidates(keyword, vector);
        Ok(fuse(candidates, self.options.weights, k))
    }

    async fn vector_channel(&self, query: &str, fetch: usize) -> Vec<ScoredChunk> {
        let lookup = async {
            let vector = self.embedder.embed(query).await?;
            self.store.query_vector(&vector, fetch).await
        };

        match tokio::time::timeout(self.options.vector_timeout, lookup).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                if e.is_provider() {
                    debug!(error = %e, "vector search unavailable, using keyword results only");
                } else {
                    warn!(error = %e, "vector search failed, using keyword results only");
                }
                Vec::new()
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.options.vector_timeout.as_millis() as u64,
                    "vector search timed out, using keyword results only"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use crate::search::embedder::ProviderHealth;
    use crate::search::hybrid::MatchType;
    use crate::search::store::{Chunk, ChunkRecord, SqliteStore, StoreStats};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Deterministic embedder: a fixed table of text -> vector, or a failure mode.
    pub(crate) enum MockEmbedder {
        Table(Vec<(&'static str, Vec<f32>)>),
        Down,
        Slow(Duration),
    }

    #[async_trait]
    impl Embedder for MockEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            match self {
                MockEmbedder::Table(table) => table
                    .iter()
                    .find(|(key, _)| text.contains(key))
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| Error::ProviderError {
                        status: 500,
                        body: format!("no vector for {}", text),
                    }),
                MockEmbedder::Down => Err(Error::ProviderUnavailable {
                    endpoint: "mock".to_string(),
                    reason: "connection refused".to_string(),
                }),
                MockEmbedder::Slow(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(vec![1.0, 0.0])
                }
            }
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn health_check(&self) -> ProviderHealth {
            match self {
                MockEmbedder::Down => ProviderHealth::Unavailable("mock down".to_string()),
                _ => ProviderHealth::Ready,
            }
        }
    }

    pub(crate) fn record(source: &str, index: usize, text: &str) -> ChunkRecord {
        ChunkRecord {
            source_path: source.to_string(),
            title: source.to_string(),
            text: text.to_string(),
            chunk_index: index,
            metadata: BTreeMap::new(),
        }
    }

    fn searcher(store: Arc<SqliteStore>, embedder: MockEmbedder) -> Searcher {
        Searcher::new(store, Arc::new(embedder), SearchOptions::default())
    }

    #[tokio::test]
    async fn test_refund_policy_keyword_only_when_no_embeddings() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .upsert_chunk(&record("policies.md", 0, "Our refund policy lasts 30 days."))
            .await
            .unwrap();
        store
            .upsert_chunk(&record("other.md", 0, "Nothing relevant here."))
            .await
            .unwrap();

        let results = searcher(store, MockEmbedder::Down)
            .search("refund policy", 3)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::Keyword);
        assert_eq!(results[0].chunk.source_path, "policies.md");
    }

    #[tokio::test]
    async fn test_vector_failure_degrades_to_keyword() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        for i in 0..5 {
            let id = store
                .upsert_chunk(&record(&format!("d{}.md", i), 0, &format!("alpha topic {}", i)))
                .await
                .unwrap();
            store.upsert_embedding(id, &[1.0, i as f32], "h").await.unwrap();
        }

        let results = searcher(store, MockEmbedder::Down)
            .search("alpha", 3)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.match_type == MatchType::Keyword));
    }

    #[tokio::test]
    async fn test_slow_vector_path_times_out() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let id = store
            .upsert_chunk(&record("a.md", 0, "alpha"))
            .await
            .unwrap();
        store.upsert_embedding(id, &[1.0, 0.0], "h").await.unwrap();

        let options = SearchOptions {
            vector_timeout: Duration::from_millis(20),
            ..SearchOptions::default()
        };
        let searcher = Searcher::new(
            store,
            Arc::new(MockEmbedder::Slow(Duration::from_secs(5))),
            options,
        );

        let started = std::time::Instant::now();
        let results = searcher.search("alpha", 3).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::Keyword);
    }

    #[tokio::test]
    async fn test_hybrid_and_semantic_provenance() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let a = store
            .upsert_chunk(&record("a.md", 0, "invoice approval workflow"))
            .await
            .unwrap();
        let b = store
            .upsert_chunk(&record("b.md", 0, "purchase order sign-off steps"))
            .await
            .unwrap();
        store.upsert_embedding(a, &[1.0, 0.0], "ha").await.unwrap();
        store.upsert_embedding(b, &[0.9, 0.1], "hb").await.unwrap();

        let embedder = MockEmbedder::Table(vec![("invoice", vec![1.0, 0.05])]);
        let results = searcher(store, embedder)
            .search("invoice approval", 3)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, a);
        assert_eq!(results[0].match_type, MatchType::Hybrid);
        assert_eq!(results[1].chunk.id, b);
        assert_eq!(results[1].match_type, MatchType::Semantic);
        assert!(results[0].keyword_score > 0.0 && results[0].vector_score > 0.0);
    }

    #[tokio::test]
    async fn test_deterministic_for_fixed_state() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        for i in 0..6 {
            let id = store
                .upsert_chunk(&record("a.md", i, &format!("shared term chunk {}", i)))
                .await
                .unwrap();
            store
                .upsert_embedding(id, &[1.0, i as f32 / 10.0], "h")
                .await
                .unwrap();
        }
        let searcher = searcher(store, MockEmbedder::Table(vec![("shared", vec![1.0, 0.0])]));

        let first: Vec<i64> = searcher
            .search("shared term", 4)
            .await
            .unwrap()
            .iter()
            .map(|r| r.chunk.id)
            .collect();
        let second: Vec<i64> = searcher
            .search("shared term", 4)
            .await
            .unwrap()
            .iter()
            .map(|r| r.chunk.id)
            .collect();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    type EventLog = Arc<Mutex<Vec<&'static str>>>;

    /// Records when the provider call and the keyword query start.
    struct LoggingEmbedder(EventLog);

    #[async_trait]
    impl Embedder for LoggingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.0.lock().unwrap().push("embed");
            tokio::task::yield_now().await;
            Ok(vec![1.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn health_check(&self) -> ProviderHealth {
            ProviderHealth::Ready
        }
    }

    struct LoggingStore {
        inner: SqliteStore,
        log: EventLog,
    }

    #[async_trait]
    impl ChunkStore for LoggingStore {
        async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<i64> {
            self.inner.upsert_chunk(record).await
        }
        async fn upsert_embedding(
            &self,
            chunk_id: i64,
            vector: &[f32],
            content_hash: &str,
        ) -> Result<()> {
            self.inner.upsert_embedding(chunk_id, vector, content_hash).await
        }
        async fn embedding_hash(&self, chunk_id: i64) -> Result<Option<String>> {
            self.inner.embedding_hash(chunk_id).await
        }
        async fn query_keyword(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
            self.log.lock().unwrap().push("keyword");
            self.inner.query_keyword(query, limit).await
        }
        async fn query_vector(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
            self.inner.query_vector(vector, limit).await
        }
        async fn get_chunk(&self, id: i64) -> Result<Option<Chunk>> {
            self.inner.get_chunk(id).await
        }
        async fn get_chunk_at(&self, source_path: &str, chunk_index: usize) -> Result<Option<Chunk>> {
            self.inner.get_chunk_at(source_path, chunk_index).await
        }
        async fn count_chunks(&self) -> Result<usize> {
            self.inner.count_chunks().await
        }
        async fn list_sources(&self) -> Result<Vec<String>> {
            self.inner.list_sources().await
        }
        async fn delete_source(&self, source_path: &str) -> Result<usize> {
            self.inner.delete_source(source_path).await
        }
        async fn truncate_source(&self, source_path: &str, keep: usize) -> Result<usize> {
            self.inner.truncate_source(source_path, keep).await
        }
        async fn stats(&self) -> Result<StoreStats> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn test_provider_request_starts_before_keyword_query() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let store = LoggingStore {
            inner: SqliteStore::open_in_memory().unwrap(),
            log: log.clone(),
        };
        let id = store.upsert_chunk(&record("a.md", 0, "alpha")).await.unwrap();
        store.upsert_embedding(id, &[1.0, 0.0], "h").await.unwrap();

        let searcher = Searcher::new(
            Arc::new(store),
            Arc::new(LoggingEmbedder(log.clone())),
            SearchOptions::default(),
        );
        let results = searcher.search("alpha", 3).await.unwrap();

        assert_eq!(results[0].match_type, MatchType::Hybrid);
        assert_eq!(*log.lock().unwrap(), vec!["embed", "keyword"]);
    }

    #[tokio::test]
    async fn test_zero_k_and_blank_query() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.upsert_chunk(&record("a.md", 0, "alpha")).await.unwrap();
        let searcher = searcher(store, MockEmbedder::Down);
        assert!(searcher.search("alpha", 0).await.unwrap().is_empty());
        assert!(searcher.search("   ", 3).await.unwrap().is_empty());
    }
}
