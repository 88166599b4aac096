//! Progressive disclosure: a compact summarized search first, full chunk
//! context only on an explicit follow-up fetch.

use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

use super::hybrid::MatchType;
use super::searcher::Searcher;
use super::store::{Chunk, ChunkStore};
use crate::error::{Error, Result};

pub const DEFAULT_SNIPPET_CHARS: usize = 200;
pub const DEFAULT_TOP_K: usize = 3;
pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 10;

/// Visible separator between a chunk and its neighbours in a detail fetch.
pub const CONTEXT_SEPARATOR: &str = "\n\n--- next chunk ---\n\n";

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub title: String,
    pub source_path: String,
    pub snippet: String,
    pub score: f32,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchSummary {
    pub query: String,
    /// Total chunks in the store, not just the matched ones.
    pub total_candidates: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkDetail {
    pub chunk: Chunk,
    /// The requested chunk and its existing neighbours, in index order.
    pub context: Vec<Chunk>,
    pub combined_text: String,
}

pub struct RetrievalSurface {
    searcher: Arc<Searcher>,
    store: Arc<dyn ChunkStore>,
    snippet_chars: usize,
}

impl RetrievalSurface {
    pub fn new(searcher: Arc<Searcher>, snippet_chars: usize) -> Self {
        let store = Arc::clone(searcher.store());
        Self {
            searcher,
            store,
            snippet_chars,
        }
    }

    pub async fn search_summary(&self, query: &str, top_k: usize) -> Result<SearchSummary> {
        let (results, total) = tokio::join!(
            self.searcher.search(query, top_k),
            self.store.count_chunks()
        );
        let results = results?;
        let total_candidates = total?;

        let terms = query_terms(query);
        let hits = results
            .into_iter()
            .map(|result| SearchHit {
                snippet: extract_snippet(&result.chunk.text, &terms, self.snippet_chars),
                id: result.chunk.id,
                title: result.chunk.title,
                source_path: result.chunk.source_path,
                score: result.score,
                match_type: result.match_type,
            })
            .collect();

        Ok(SearchSummary {
            query: query.to_string(),
            total_candidates,
            results: hits,
        })
    }

    pub async fn fetch_details(&self, id: i64) -> Result<ChunkDetail> {
        let chunk = self
            .store
            .get_chunk(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;

        let previous = match chunk.chunk_index.checked_sub(1) {
            Some(index) => self.store.get_chunk_at(&chunk.source_path, index).await?,
            None => None,
        };
        let next = self
            .store
            .get_chunk_at(&chunk.source_path, chunk.chunk_index + 1)
            .await?;

        let mut context = Vec::with_capacity(3);
        context.extend(previous);
        context.push(chunk.clone());
        context.extend(next);

        let combined_text = context
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        Ok(ChunkDetail {
            chunk,
            context,
            combined_text,
        })
    }

    /// Tool-facing search: validates `top_k` and never fails, reporting
    /// errors as text instead.
    pub async fn search_report(&self, query: &str, top_k: i64) -> String {
        if !(MIN_TOP_K as i64..=MAX_TOP_K as i64).contains(&top_k) {
            return format!(
                "Error: top_k must be between {} and {} (got {}).",
                MIN_TOP_K, MAX_TOP_K, top_k
            );
        }
        if query.trim().is_empty() {
            return "Error: query must not be empty.".to_string();
        }
        match self.search_summary(query, top_k as usize).await {
            Ok(summary) => format_summary(&summary),
            Err(e) => format!("Error: search failed: {}", e),
        }
    }

    /// Tool-facing detail fetch; unknown ids produce an explicit not-found message.
    pub async fn fetch_report(&self, document_id: i64) -> String {
        if document_id <= 0 {
            return format!(
                "Error: document_id must be a positive integer (got {}).",
                document_id
            );
        }
        match self.fetch_details(document_id).await {
            Ok(detail) => format_detail(&detail),
            Err(Error::NotFound(_)) => format!("Document {} not found.", document_id),
            Err(e) => format!("Error: fetch failed: {}", e),
        }
    }
}

/// Case-folded query terms with quote characters stripped. Folding is one
/// char per char, the same as the text side of [`extract_snippet`].
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| !matches!(c, '"' | '\''))
                .map(fold)
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// A window of at most `max_chars` characters centred on the earliest
/// occurrence of any term (case-insensitive), or the start of the text when
/// nothing matches. Truncated edges get an ellipsis.
pub fn extract_snippet(text: &str, terms: &[String], max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }

    // One lowered char per original char keeps positions aligned.
    let lowered: Vec<char> = chars.iter().map(|c| fold(*c)).collect();
    let position = terms
        .iter()
        .filter_map(|term| {
            let needle: Vec<char> = term.chars().map(fold).collect();
            find_chars(&lowered, &needle)
        })
        .min()
        .unwrap_or(0);

    let start = position
        .saturating_sub(max_chars / 2)
        .min(chars.len() - max_chars);
    let end = start + max_chars;

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.extend(&chars[start..end]);
    if end < chars.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn format_summary(summary: &SearchSummary) -> String {
    let mut out = String::new();
    if summary.results.is_empty() {
        let _ = writeln!(
            out,
            "No results for \"{}\" ({} chunks indexed).",
            summary.query, summary.total_candidates
        );
        return out;
    }

    let _ = writeln!(
        out,
        "Found {} result(s) for \"{}\" ({} chunks indexed):",
        summary.results.len(),
        summary.query,
        summary.total_candidates
    );
    for hit in &summary.results {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "[{}] {} ({}, {:.3})",
            hit.id, hit.title, hit.match_type, hit.score
        );
        let _ = writeln!(out, "    Source: {}", hit.source_path);
        let _ = writeln!(out, "    {}", hit.snippet.replace('\n', " "));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Use fetch_details with a document id for full context.");
    out
}

pub fn format_detail(detail: &ChunkDetail) -> String {
    let chunk = &detail.chunk;
    let mut out = String::new();
    let _ = writeln!(out, "[{}] {}", chunk.id, chunk.title);
    let _ = writeln!(
        out,
        "Source: {} (chunk {}, showing {} chunk(s) of context)",
        chunk.source_path,
        chunk.chunk_index,
        detail.context.len()
    );
    let _ = writeln!(out);
    out.push_str(&detail.combined_text);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::searcher::tests::{record, MockEmbedder};
    use crate::search::searcher::SearchOptions;
    use crate::search::store::SqliteStore;

    fn surface(store: Arc<SqliteStore>) -> RetrievalSurface {
        let searcher = Searcher::new(
            store,
            Arc::new(MockEmbedder::Down),
            SearchOptions::default(),
        );
        RetrievalSurface::new(Arc::new(searcher), DEFAULT_SNIPPET_CHARS)
    }

    fn terms(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_snippet_short_text_unchanged() {
        assert_eq!(extract_snippet("short text", &terms(&["text"]), 200), "short text");
    }

    #[test]
    fn test_snippet_centred_on_match() {
        let text = format!("{}Refund Policy{}", "a".repeat(500), "b".repeat(500));
        let snippet = extract_snippet(&text, &terms(&["refund"]), 200);
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        assert!(snippet.contains("Refund Policy"));
        assert_eq!(snippet.chars().count(), 206);
    }

    #[test]
    fn test_snippet_falls_back_to_start() {
        let text = "z".repeat(300);
        let snippet = extract_snippet(&text, &terms(&["missing"]), 200);
        assert!(!snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), 203);
    }

    #[test]
    fn test_snippet_match_near_end() {
        let text = format!("{}tail", "x".repeat(400));
        let snippet = extract_snippet(&text, &terms(&["tail"]), 200);
        assert!(snippet.starts_with("..."));
        assert!(!snippet.ends_with("..."));
        assert!(snippet.ends_with("tail"));
    }

    #[test]
    fn test_snippet_earliest_term_wins_and_handles_unicode() {
        let text = format!("{}Ünïcode {} later", "é".repeat(300), "ß".repeat(300));
        let snippet = extract_snippet(&text, &terms(&["later", "ünïcode"]), 100);
        assert!(snippet.contains("Ünïcode"));
    }

    #[test]
    fn test_query_terms() {
        assert_eq!(
            query_terms("  \"Refund\" 'POLICY' \"\" "),
            vec!["refund".to_string(), "policy".to_string()]
        );
    }

    #[test]
    fn test_snippet_finds_terms_with_multichar_lowercase() {
        let text = format!("{} İstanbul office hours {}", "x".repeat(300), "y".repeat(300));
        let terms = query_terms("İstanbul");
        assert_eq!(terms, vec!["istanbul".to_string()]);

        let snippet = extract_snippet(&text, &terms, 100);
        assert!(snippet.starts_with("..."));
        assert!(snippet.contains("İstanbul office hours"));
    }

    #[tokio::test]
    async fn test_summary_with_no_results_reports_total() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        for i in 0..4 {
            store
                .upsert_chunk(&record("a.md", i, &format!("chunk number {}", i)))
                .await
                .unwrap();
        }
        let summary = surface(store).search_summary("zebra", 3).await.unwrap();
        assert!(summary.results.is_empty());
        assert_eq!(summary.total_candidates, 4);
        assert!(format_summary(&summary).contains("No results"));
    }

    #[tokio::test]
    async fn test_summary_hits() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let id = store
            .upsert_chunk(&record("policies.md", 0, "Our refund policy lasts 30 days."))
            .await
            .unwrap();
        let surface = surface(store);

        let summary = surface.search_summary("refund policy", 3).await.unwrap();
        assert_eq!(summary.results.len(), 1);
        let hit = &summary.results[0];
        assert_eq!(hit.id, id);
        assert_eq!(hit.match_type, MatchType::Keyword);
        assert_eq!(hit.snippet, "Our refund policy lasts 30 days.");

        let report = surface.search_report("refund policy", 3).await;
        assert!(report.contains(&format!("[{}] policies.md (keyword,", id)));
        assert!(report.contains("Source: policies.md"));
    }

    #[tokio::test]
    async fn test_fetch_details_with_neighbours() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                store
                    .upsert_chunk(&record("a.md", i, &format!("part {}", i)))
                    .await
                    .unwrap(),
            );
        }
        store.upsert_chunk(&record("b.md", 1, "other doc")).await.unwrap();
        let surface = surface(store);

        let middle = surface.fetch_details(ids[1]).await.unwrap();
        assert_eq!(middle.context.len(), 3);
        assert_eq!(
            middle.combined_text,
            format!("part 0{}part 1{}part 2", CONTEXT_SEPARATOR, CONTEXT_SEPARATOR)
        );

        let first = surface.fetch_details(ids[0]).await.unwrap();
        assert_eq!(first.context.len(), 2);
        assert_eq!(first.context[0].chunk_index, 0);

        let last = surface.fetch_details(ids[2]).await.unwrap();
        assert_eq!(last.context.len(), 2);
        assert_eq!(last.context[1].chunk_index, 2);
    }

    #[tokio::test]
    async fn test_fetch_unknown_id() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let surface = surface(store);
        assert!(matches!(
            surface.fetch_details(42).await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(surface.fetch_report(42).await, "Document 42 not found.");
        assert!(surface.fetch_report(0).await.starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_report_argument_validation() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let surface = surface(store);
        assert!(surface.search_report("x", 0).await.starts_with("Error: top_k"));
        assert!(surface.search_report("x", 11).await.starts_with("Error: top_k"));
        assert!(surface.search_report("  ", 3).await.starts_with("Error: query"));
    }
}
