use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = "docsift.toml";
pub const DB_PATH_ENV: &str = "DOCSIFT_DB_PATH";
pub const DEFAULT_DB_PATH: &str = ".docsift/index.db";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub chunking: ChunkingConfig,
    pub embedder: EmbedderConfig,
    pub search: SearchOptionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

/// Chunk sizes are in characters; overlap is converted to roughly `overlap / 5` words.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 512,
            overlap: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub endpoint: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptionsConfig {
    pub top_k: usize,
    pub overfetch: usize,
    pub keyword_weight: f32,
    pub vector_weight: f32,
    pub vector_timeout_ms: u64,
    pub snippet_chars: usize,
}

impl Default for SearchOptionsConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            overfetch: 3,
            keyword_weight: 0.4,
            vector_weight: 0.6,
            vector_timeout_ms: 500,
            snippet_chars: 200,
        }
    }
}

impl Config {
    /// Load configuration from an explicit file, or from `docsift.toml` in the
    /// working directory when present. Missing files yield defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
            if !db_path.trim().is_empty() {
                config.store.path = PathBuf::from(db_path);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chunking.max_chunk_size == 0 {
            return Err(Error::Config(
                "chunking.max_chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.embedder.dimensions == 0 {
            return Err(Error::Config(
                "embedder.dimensions must be greater than 0".to_string(),
            ));
        }
        if self.search.overfetch == 0 {
            return Err(Error::Config(
                "search.overfetch must be greater than 0".to_string(),
            ));
        }
        let weights = [self.search.keyword_weight, self.search.vector_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config(
                "search weights must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
