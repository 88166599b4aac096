use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Embedder, ProviderHealth};
use crate::error::{Error, Result};

/// Provider diagnostics are cut to this many characters before being surfaced.
const MAX_ERROR_BODY_CHARS: usize = 200;

pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    dimensions: usize,
    client: Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl OllamaEmbedder {
    pub fn new(endpoint: &str, model: &str, dimensions: usize, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn unavailable(&self, err: &reqwest::Error) -> Error {
        Error::ProviderUnavailable {
            endpoint: self.endpoint.clone(),
            reason: err.to_string(),
        }
    }

    fn model_matches(&self, name: &str) -> bool {
        name == self.model
            || name == format!("{}:latest", self.model)
            || name.split(':').next() == Some(self.model.as_str())
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.unavailable(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderError {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| Error::ProviderError {
            status: status.as_u16(),
            body: truncate_chars(&format!("invalid embedding payload: {}", e), MAX_ERROR_BODY_CHARS),
        })?;

        if parsed.embedding.len() != self.dimensions {
            return Err(Error::ProviderError {
                status: status.as_u16(),
                body: format!(
                    "expected {} dimensions from model '{}', got {}",
                    self.dimensions,
                    self.model,
                    parsed.embedding.len()
                ),
            });
        }

        debug!(model = %self.model, chars = text.len(), "embedded text");
        Ok(parsed.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> ProviderHealth {
        let response = match self
            .client
            .get(format!("{}/tags", self.endpoint))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ProviderHealth::Unavailable(self.unavailable(&e).to_string()),
        };

        if !response.status().is_success() {
            return ProviderHealth::Unavailable(format!(
                "health check returned {}",
                response.status()
            ));
        }

        let tags: OllamaTagsResponse = match response.json().await {
            Ok(tags) => tags,
            Err(e) => return ProviderHealth::Unavailable(format!("invalid tags payload: {}", e)),
        };

        if tags.models.iter().any(|m| self.model_matches(&m.name)) {
            return ProviderHealth::Ready;
        }

        warn!(
            model = %self.model,
            "embedding model not installed; pull it with `ollama pull {}`",
            self.model
        );
        ProviderHealth::ModelMissing {
            model: self.model.clone(),
            available: tags.models.into_iter().map(|m| m.name).collect(),
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}
