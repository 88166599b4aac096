mod args;
mod index;
mod search;
mod serve;

pub use args::{Args, Command};
pub use index::{run_index, run_prune, run_status};
pub use search::{run_fetch, run_search};
pub use serve::run_mcp_server;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::search::{
    create_embedder, Embedder, RetrievalSurface, SearchOptions, Searcher, SqliteStore,
};

/// Configuration plus the opened store and embedding client shared by commands.
pub struct Services {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub embedder: Arc<dyn Embedder>,
}

impl Services {
    /// Resolve configuration (`--db` wins over `DOCSIFT_DB_PATH`, which wins
    /// over the config file) and open the store, creating it if needed.
    pub fn open(config_path: Option<&Path>, db: Option<&Path>) -> Result<Self> {
        let config = resolve_config(config_path, db)?;
        let store = SqliteStore::open(&config.store.path).with_context(|| {
            format!("Failed to open index at {}", config.store.path.display())
        })?;
        let embedder =
            create_embedder(&config.embedder).context("Failed to create embedding client")?;

        Ok(Self {
            config,
            store: Arc::new(store),
            embedder: Arc::from(embedder),
        })
    }

    /// Like [`Services::open`], but fails when no index exists yet.
    pub fn open_existing(config_path: Option<&Path>, db: Option<&Path>) -> Result<Self> {
        let config = resolve_config(config_path, db)?;
        if !config.store.path.exists() {
            anyhow::bail!(
                "No index found at {}. Run `docsift index` first to build the index.",
                config.store.path.display()
            );
        }
        Self::open(config_path, db)
    }

    pub fn surface(&self) -> RetrievalSurface {
        let searcher = Searcher::new(
            self.store.clone(),
            Arc::clone(&self.embedder),
            SearchOptions::from(&self.config.search),
        );
        RetrievalSurface::new(Arc::new(searcher), self.config.search.snippet_chars)
    }
}

fn resolve_config(config_path: Option<&Path>, db: Option<&Path>) -> Result<Config> {
    let mut config = Config::load(config_path).context("Failed to load configuration")?;
    if let Some(db) = db {
        config.store.path = PathBuf::from(db);
    }
    Ok(config)
}
