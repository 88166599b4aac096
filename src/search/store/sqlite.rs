use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use super::{cosine_distance, Chunk, ChunkRecord, ChunkStore, ScoredChunk, StoreStats};
use crate::error::{Error, Result};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS chunks (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        source_path TEXT    NOT NULL,
        title       TEXT    NOT NULL,
        text        TEXT    NOT NULL,
        chunk_index INTEGER NOT NULL CHECK (chunk_index >= 0),
        metadata    TEXT    NOT NULL DEFAULT '{}',
        created_at  TEXT    NOT NULL,
        updated_at  TEXT    NOT NULL,
        UNIQUE (source_path, chunk_index)
    );

    CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
        title,
        text,
        content='chunks',
        content_rowid='id'
    );

    -- Keep the lexical index in lockstep with the chunk table.
    CREATE TRIGGER IF NOT EXISTS chunks_fts_insert AFTER INSERT ON chunks BEGIN
        INSERT INTO chunks_fts(rowid, title, text)
        VALUES (new.id, new.title, new.text);
    END;

    CREATE TRIGGER IF NOT EXISTS chunks_fts_delete BEFORE DELETE ON chunks BEGIN
        INSERT INTO chunks_fts(chunks_fts, rowid, title, text)
        VALUES ('delete', old.id, old.title, old.text);
    END;

    CREATE TRIGGER IF NOT EXISTS chunks_fts_update AFTER UPDATE ON chunks BEGIN
        INSERT INTO chunks_fts(chunks_fts, rowid, title, text)
        VALUES ('delete', old.id, old.title, old.text);
        INSERT INTO chunks_fts(rowid, title, text)
        VALUES (new.id, new.title, new.text);
    END;

    CREATE TABLE IF NOT EXISTS chunk_vectors (
        chunk_id     INTEGER PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
        embedding    BLOB    NOT NULL,
        dimensions   INTEGER NOT NULL,
        content_hash TEXT    NOT NULL
    );
";

const CHUNK_COLUMNS: &str =
    "c.id, c.source_path, c.title, c.text, c.chunk_index, c.metadata, c.created_at, c.updated_at";

/// SQLite-backed chunk store: chunk table, FTS5 lexical index kept in sync by
/// triggers, and a vector table scanned by cosine distance.
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| unavailable(path, e))?;
            }
        }

        let conn = Connection::open(path).map_err(|e| unavailable(path, e))?;
        Self::initialize(path.to_path_buf(), conn)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|e| unavailable(&path, e))?;
        Self::initialize(path, conn)
    }

    fn initialize(path: PathBuf, conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            ",
        )
        .map_err(|e| unavailable(&path, e))?;

        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .map_err(|e| unavailable(&path, e))?;
        if version > SCHEMA_VERSION {
            return Err(Error::StoreUnavailable {
                path: path.display().to_string(),
                reason: format!(
                    "schema version {} is newer than supported version {}",
                    version, SCHEMA_VERSION
                ),
            });
        }

        conn.execute_batch(SCHEMA).map_err(|e| unavailable(&path, e))?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| unavailable(&path, e))?;

        debug!(path = %path.display(), "opened chunk store");
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| Error::StoreUnavailable {
            path: self.path.display().to_string(),
            reason: "connection lock poisoned".to_string(),
        })?;
        f(&mut conn)
    }

    fn fetch_chunk(conn: &Connection, id: i64) -> Result<Option<Chunk>> {
        let sql = format!("SELECT {} FROM chunks c WHERE c.id = ?1", CHUNK_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], parse_chunk_row)
            .optional()?)
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<i64> {
        validate_record(record)?;
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| Error::Validation(format!("metadata is not serializable: {}", e)))?;
        let now = Utc::now().to_rfc3339();
        let chunk_index = record.chunk_index as i64;

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chunks
                    (source_path, title, text, chunk_index, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(source_path, chunk_index) DO UPDATE SET
                    title = excluded.title,
                    text = excluded.text,
                    metadata = excluded.metadata,
                    updated_at = excluded.updated_at",
                params![
                    record.source_path,
                    record.title,
                    record.text,
                    chunk_index,
                    metadata,
                    now
                ],
            )?;
            let id: i64 = tx.query_row(
                "SELECT id FROM chunks WHERE source_path = ?1 AND chunk_index = ?2",
                params![record.source_path, chunk_index],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(id)
        })
    }

    async fn upsert_embedding(
        &self,
        chunk_id: i64,
        vector: &[f32],
        content_hash: &str,
    ) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::Validation("embedding vector is empty".to_string()));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation(
                "embedding vector contains non-finite values".to_string(),
            ));
        }
        let blob = f32_vec_to_bytes(vector);

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let exists = tx
                .query_row("SELECT 1 FROM chunks WHERE id = ?1", params![chunk_id], |_| {
                    Ok(())
                })
                .optional()?
                .is_some();
            if !exists {
                return Err(Error::NotFound(format!("chunk {}", chunk_id)));
            }

            // No atomic replace on the vector table: delete, then insert.
            tx.execute(
                "DELETE FROM chunk_vectors WHERE chunk_id = ?1",
                params![chunk_id],
            )?;
            tx.execute(
                "INSERT INTO chunk_vectors (chunk_id, embedding, dimensions, content_hash)
                 VALUES (?1, ?2, ?3, ?4)",
                params![chunk_id, blob, vector.len() as i64, content_hash],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    async fn embedding_hash(&self, chunk_id: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT content_hash FROM chunk_vectors WHERE chunk_id = ?1",
                    params![chunk_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    async fn query_keyword(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        let Some(match_expr) = build_match_query(query) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, bm25(chunks_fts) AS score
                 FROM chunks_fts
                 JOIN chunks c ON c.id = chunks_fts.rowid
                 WHERE chunks_fts MATCH ?1
                 ORDER BY score, c.id
                 LIMIT ?2",
                CHUNK_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![match_expr, limit as i64], |row| {
                let chunk = parse_chunk_row(row)?;
                let score: f64 = row.get(8)?;
                Ok(ScoredChunk {
                    chunk,
                    raw_score: score as f32,
                })
            })?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })
    }

    async fn query_vector(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        if vector.is_empty() {
            return Err(Error::Validation("query vector is empty".to_string()));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT chunk_id, embedding, dimensions FROM chunk_vectors ORDER BY chunk_id",
            )?;
            let rows = stmt.query_map([], |row| {
                let chunk_id: i64 = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                let dimensions: i64 = row.get(2)?;
                Ok((chunk_id, blob, dimensions))
            })?;

            let mut scored: Vec<(i64, f32)> = Vec::new();
            for row in rows {
                let (chunk_id, blob, dimensions) = row?;
                if dimensions as usize != vector.len() {
                    continue;
                }
                let stored = bytes_to_f32_vec(&blob);
                scored.push((chunk_id, cosine_distance(vector, &stored)));
            }

            scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(limit);

            let mut results = Vec::with_capacity(scored.len());
            for (chunk_id, distance) in scored {
                if let Some(chunk) = Self::fetch_chunk(conn, chunk_id)? {
                    results.push(ScoredChunk {
                        chunk,
                        raw_score: distance,
                    });
                }
            }
            Ok(results)
        })
    }

    async fn get_chunk(&self, id: i64) -> Result<Option<Chunk>> {
        self.with_conn(|conn| Self::fetch_chunk(conn, id))
    }

    async fn get_chunk_at(&self, source_path: &str, chunk_index: usize) -> Result<Option<Chunk>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM chunks c WHERE c.source_path = ?1 AND c.chunk_index = ?2",
                CHUNK_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![source_path, chunk_index as i64], parse_chunk_row)
                .optional()?)
        })
    }

    async fn count_chunks(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    async fn list_sources(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT source_path FROM chunks ORDER BY source_path")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut sources = Vec::new();
            for row in rows {
                sources.push(row?);
            }
            Ok(sources)
        })
    }

    async fn delete_source(&self, source_path: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM chunks WHERE source_path = ?1",
                params![source_path],
            )?;
            Ok(removed)
        })
    }

    async fn truncate_source(&self, source_path: &str, keep: usize) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM chunks WHERE source_path = ?1 AND chunk_index >= ?2",
                params![source_path, keep as i64],
            )?;
            Ok(removed)
        })
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let (total_sources, total_chunks, last_updated): (i64, i64, Option<String>) = conn
                .query_row(
                    "SELECT COUNT(DISTINCT source_path), COUNT(*), MAX(updated_at) FROM chunks",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;
            let total_embeddings: i64 =
                conn.query_row("SELECT COUNT(*) FROM chunk_vectors", [], |row| row.get(0))?;

            let last_updated = last_updated
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));

            Ok(StoreStats {
                total_sources: total_sources as usize,
                total_chunks: total_chunks as usize,
                total_embeddings: total_embeddings as usize,
                last_updated,
            })
        })
    }
}

fn unavailable(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::StoreUnavailable {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn validate_record(record: &ChunkRecord) -> Result<()> {
    if record.source_path.trim().is_empty() {
        return Err(Error::Validation("source_path must not be empty".to_string()));
    }
    if record.text.trim().is_empty() {
        return Err(Error::Validation(format!(
            "chunk {} of {} has no text",
            record.chunk_index, record.source_path
        )));
    }
    if i64::try_from(record.chunk_index).is_err() {
        return Err(Error::Validation(format!(
            "chunk_index {} out of range",
            record.chunk_index
        )));
    }
    Ok(())
}

/// Turn free text into an FTS5 expression: quote characters are stripped,
/// each remaining term is quoted, and terms are OR-ed together.
pub(crate) fn build_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| term.replace(['"', '\''], ""))
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("\"{}\"", term))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn parse_chunk_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let chunk_index: i64 = row.get(4)?;
    let metadata_json: String = row.get(5)?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(Chunk {
        id: row.get(0)?,
        source_path: row.get(1)?,
        title: row.get(2)?,
        text: row.get(3)?,
        chunk_index: chunk_index as usize,
        metadata,
        created_at: parse_timestamp(6, &created_at)?,
        updated_at: parse_timestamp(7, &updated_at)?,
    })
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Little-endian f32 encoding used for the embedding BLOB column.
fn f32_vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
