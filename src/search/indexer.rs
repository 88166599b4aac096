use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::scan::{scan_directory, SourceFile};

use super::chunker::{extract_title, Chunker};
use super::embedder::{Embedder, ProviderHealth};
use super::store::{ChunkRecord, ChunkStore};

pub struct Indexer {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
}

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub files_scanned: usize,
    pub chunks_indexed: usize,
    pub embeddings_created: usize,
    /// Chunks whose stored embedding already matched their text.
    pub embeddings_reused: usize,
    /// Files that failed to read or store. They never abort the run.
    pub errors: usize,
    pub embedding_errors: usize,
    /// Stale trailing chunks removed from files that shrank.
    pub chunks_removed: usize,
    pub embeddings_enabled: bool,
    pub elapsed: Duration,
}

/// Outcome of indexing one file.
#[derive(Debug, Default)]
struct FileOutcome {
    chunks: usize,
    embedded: usize,
    reused: usize,
    embedding_errors: usize,
    removed: usize,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        config: &ChunkingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            chunker: Chunker::from_config(config),
        }
    }

    /// Index every eligible file under `root`.
    ///
    /// With `embeddings` set, the provider is health-checked first and
    /// embedding only happens when it reports ready; otherwise the run is
    /// keyword-only.
    pub async fn index_all(&self, root: &Path, embeddings: bool) -> Result<IndexStats> {
        let started = Instant::now();
        let files = scan_directory(root)?;

        let mut stats = IndexStats {
            files_scanned: files.len(),
            embeddings_enabled: embeddings && self.embeddings_available().await,
            ..IndexStats::default()
        };
        let mut embed = stats.embeddings_enabled;

        for file in &files {
            match self.index_file(file, &mut embed).await {
                Ok(outcome) => {
                    stats.chunks_indexed += outcome.chunks;
                    stats.embeddings_created += outcome.embedded;
                    stats.embeddings_reused += outcome.reused;
                    stats.embedding_errors += outcome.embedding_errors;
                    stats.chunks_removed += outcome.removed;
                }
                Err(e) => {
                    warn!(path = %file.relative_path, error = %e, "failed to index file");
                    stats.errors += 1;
                }
            }
        }

        stats.elapsed = started.elapsed();
        info!(
            files = stats.files_scanned,
            chunks = stats.chunks_indexed,
            embeddings = stats.embeddings_created,
            errors = stats.errors,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "indexing complete"
        );
        Ok(stats)
    }

    async fn embeddings_available(&self) -> bool {
        match self.embedder.health_check().await {
            ProviderHealth::Ready => true,
            ProviderHealth::ModelMissing { model, available } => {
                warn!(
                    model = %model,
                    available = %available.join(", "),
                    "embedding model not installed, indexing keyword-only"
                );
                false
            }
            ProviderHealth::Unavailable(reason) => {
                warn!(reason = %reason, "embedding provider unavailable, indexing keyword-only");
                false
            }
        }
    }

    async fn index_file(&self, file: &SourceFile, embed: &mut bool) -> Result<FileOutcome> {
        let content = tokio::fs::read_to_string(&file.path).await?;
        let title = document_title(&content, &file.path);

        let mut metadata = BTreeMap::new();
        metadata.insert("extension".to_string(), file.extension.clone());
        metadata.insert("size".to_string(), file.size.to_string());

        let mut outcome = FileOutcome::default();
        for piece in self.chunker.chunk(&content) {
            let record = ChunkRecord {
                source_path: file.source_path.clone(),
                title: title.clone(),
                text: piece.text,
                chunk_index: piece.index,
                metadata: metadata.clone(),
            };
            let chunk_id = self.store.upsert_chunk(&record).await?;
            outcome.chunks += 1;

            if !*embed {
                continue;
            }
            match self.embed_chunk(chunk_id, &record.text).await {
                Ok(true) => outcome.embedded += 1,
                Ok(false) => outcome.reused += 1,
                Err(e) => {
                    outcome.embedding_errors += 1;
                    warn!(
                        path = %file.relative_path,
                        chunk_id,
                        error = %e,
                        "failed to embed chunk, keeping it keyword-searchable"
                    );
                    if matches!(e, Error::ProviderUnavailable { .. }) {
                        warn!("embedding provider went away, continuing keyword-only");
                        *embed = false;
                    }
                }
            }
        }

        outcome.removed = self
            .store
            .truncate_source(&file.source_path, outcome.chunks)
            .await?;
        debug!(
            path = %file.relative_path,
            chunks = outcome.chunks,
            removed = outcome.removed,
            "indexed file"
        );
        Ok(outcome)
    }

    /// Embed a chunk unless its stored embedding was made from the same text.
    /// Returns whether a new embedding was written.
    async fn embed_chunk(&self, chunk_id: i64, text: &str) -> Result<bool> {
        let hash = hash_content(text);
        if self.store.embedding_hash(chunk_id).await?.as_deref() == Some(hash.as_str()) {
            return Ok(false);
        }
        let vector = self.embedder.embed(text).await?;
        self.store.upsert_embedding(chunk_id, &vector, &hash).await?;
        Ok(true)
    }

    /// Remove sources whose file no longer exists on disk. Returns how many
    /// sources were dropped.
    pub async fn prune_deleted(&self) -> Result<usize> {
        let mut pruned = 0;
        for source in self.store.list_sources().await? {
            match tokio::fs::metadata(&source).await {
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %source, error = %e, "cannot check source, keeping it");
                    continue;
                }
            }
            let removed = self.store.delete_source(&source).await?;
            info!(path = %source, chunks = removed, "pruned deleted source");
            pruned += 1;
        }
        Ok(pruned)
    }
}

fn document_title(content: &str, path: &Path) -> String {
    let title = extract_title(content);
    if !title.is_empty() {
        return title;
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn hash_content(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}
