mod ollama;

pub use ollama::OllamaEmbedder;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::config::EmbedderConfig;
use crate::error::Result;

/// Provider availability as reported by [`Embedder::health_check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderHealth {
    Ready,
    /// Provider is up but the configured model is not installed. Not fatal:
    /// callers continue in keyword-only mode.
    ModelMissing {
        model: String,
        available: Vec<String>,
    },
    Unavailable(String),
}

impl ProviderHealth {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProviderHealth::Ready)
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;

    async fn health_check(&self) -> ProviderHealth;

    /// Lazily embeds each text with one sequential `embed` call per item.
    fn embed_stream<'a>(&'a self, texts: &'a [String]) -> BoxStream<'a, Result<Vec<f32>>> {
        stream::iter(texts)
            .then(move |text| self.embed(text))
            .boxed()
    }

    /// Sequential, not batched: latency grows linearly with `texts.len()`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_stream(texts).try_collect().await
    }
}

pub fn create_embedder(config: &EmbedderConfig) -> Result<Box<dyn Embedder>> {
    Ok(Box::new(OllamaEmbedder::new(
        &config.endpoint,
        &config.model,
        config.dimensions,
        std::time::Duration::from_secs(config.timeout_secs),
    )?))
}
