use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ChunkingConfig;

/// Blank-line paragraph boundary (lines holding only whitespace count as blank).
static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// First level-1 markdown heading.
static H1_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#[ \t]+(\S[^\n]*?)[ \t]*$").unwrap());

const TITLE_MAX_CHARS: usize = 100;

/// Separator placed between paragraphs inside a chunk, and between the
/// carried-over overlap and the paragraph that opened a new chunk.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// One bounded segment of a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub index: usize,
}

pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(512, 64)
    }
}

impl Chunker {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chars,
            overlap_chars,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.max_chunk_size, config.overlap)
    }

    /// Overlap is expressed in characters but carried as trailing words (~5 chars each).
    fn overlap_words(&self) -> usize {
        self.overlap_chars / 5
    }

    /// Split text into overlapping chunks along paragraph boundaries.
    ///
    /// Text that fits in `max_chars` comes back as a single chunk. Otherwise
    /// paragraphs are packed greedily; each new chunk starts with the last
    /// few words of the previous one. A single paragraph longer than
    /// `max_chars` is kept whole.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let cleaned = normalize_newlines(text);
        let cleaned = cleaned.trim();

        if cleaned.is_empty() {
            return Vec::new();
        }

        if char_len(cleaned) <= self.max_chars {
            return vec![TextChunk {
                text: cleaned.to_string(),
                index: 0,
            }];
        }

        let mut chunks = Vec::new();
        let mut buffer = String::new();

        for paragraph in PARAGRAPH_BREAK
            .split(cleaned)
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            let projected = if buffer.is_empty() {
                char_len(paragraph)
            } else {
                char_len(&buffer) + PARAGRAPH_SEPARATOR.len() + char_len(paragraph)
            };

            if projected > self.max_chars && !buffer.is_empty() {
                let tail = trailing_words(&buffer, self.overlap_words());
                chunks.push(TextChunk {
                    text: std::mem::take(&mut buffer),
                    index: chunks.len(),
                });
                if !tail.is_empty() {
                    buffer.push_str(&tail);
                    buffer.push_str(PARAGRAPH_SEPARATOR);
                }
                buffer.push_str(paragraph);
            } else {
                if !buffer.is_empty() {
                    buffer.push_str(PARAGRAPH_SEPARATOR);
                }
                buffer.push_str(paragraph);
            }
        }

        if !buffer.trim().is_empty() {
            chunks.push(TextChunk {
                text: buffer,
                index: chunks.len(),
            });
        }

        chunks
    }
}

/// Title of a document: the first `# ` heading, else its first line (max 100 chars).
pub fn extract_title(content: &str) -> String {
    if let Some(caps) = H1_HEADING.captures(content) {
        return caps[1].trim().to_string();
    }

    let first_line = content.trim().lines().next().unwrap_or("").trim();
    first_line.chars().take(TITLE_MAX_CHARS).collect()
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn trailing_words(text: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(count);
    words[start..].join(" ")
}
