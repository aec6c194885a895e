use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EmbeddingApiConfig;

/// Dimensions of the vector table when no embedding API is configured.
const FALLBACK_DIMENSIONS: usize = 384;

/// Embedding engine that calls an OpenAI-compatible /v1/embeddings API.
/// Works with OpenRouter, OpenAI, Ollama, or any compatible provider.
pub struct EmbeddingEngine {
    client: reqwest::Client,
    config: Option<EmbeddingConfig>,
}

/// Configuration for the embedding API
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
}

impl From<&EmbeddingApiConfig> for EmbeddingConfig {
    fn from(cfg: &EmbeddingApiConfig) -> Self {
        Self {
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.clone(),
            model: cfg.model.clone(),
            dimensions: cfg.dimensions,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingEngine {
    /// If config is None, embedding features are disabled (FTS5-only fallback).
    pub fn new(config: Option<EmbeddingConfig>) -> Self {
        if let Some(ref cfg) = config {
            info!(
                "Embedding engine configured: model={}, dims={}, url={}",
                cfg.model, cfg.dimensions, cfg.base_url
            );
        } else {
            info!("Embedding engine disabled (no embedding config). Using FTS5-only search.");
        }
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_available(&self) -> bool {
        self.config.is_some()
    }

    pub fn dimensions(&self) -> usize {
        self.config
            .as_ref()
            .map(|c| c.dimensions)
            .unwrap_or(FALLBACK_DIMENSIONS)
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let config = self
            .config
            .as_ref()
            .context("Embedding engine not configured")?;

        let url = format!("{}/embeddings", config.base_url);

        let request = EmbeddingRequest {
            model: config.model.clone(),
            input: vec![text.to_string()],
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to call embedding API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let resp: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        let embedding = resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("No embedding returned from API")?;

        if embedding.len() != config.dimensions {
            anyhow::bail!(
                "Embedding has {} dimensions, expected {}",
                embedding.len(),
                config.dimensions
            );
        }

        Ok(embedding)
    }

    /// Try to generate an embedding, returning None if not available or on error
    pub async fn try_embed_one(&self, text: &str) -> Option<Vec<f32>> {
        if !self.is_available() {
            return None;
        }
        match self.embed_one(text).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!("Embedding generation failed: {:#}", e);
                None
            }
        }
    }
}

/// Little-endian f32 blob, the layout sqlite-vec expects.
pub(crate) fn f32_to_blob(floats: &[f32]) -> Vec<u8> {
    floats.iter().flat_map(|f| f.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use axum::{routing::post, Json, Router};
    use serde_json::json;

    fn config(base_url: &str, dimensions: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            api_key: "k".to_string(),
            base_url: base_url.to_string(),
            model: "embed".to_string(),
            dimensions,
        }
    }

    #[test]
    fn test_disabled_engine() {
        let engine = EmbeddingEngine::new(None);
        assert!(!engine.is_available());
        assert_eq!(engine.dimensions(), FALLBACK_DIMENSIONS);
    }

    #[test]
    fn test_blob_layout() {
        let blob = f32_to_blob(&[1.0, -2.5]);
        assert_eq!(blob.len(), 8);
        assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
        assert_eq!(&blob[4..], &(-2.5f32).to_le_bytes());
    }

    #[tokio::test]
    async fn test_embed_one_and_dimension_check() {
        let app = Router::new().route(
            "/embeddings",
            post(|| async { Json(json!({ "data": [{ "embedding": [0.1, 0.2, 0.3] }] })) }),
        );
        let base = testing::serve(app).await;

        let engine = EmbeddingEngine::new(Some(config(&base, 3)));
        assert_eq!(engine.embed_one("x").await.unwrap(), vec![0.1, 0.2, 0.3]);

        let mismatched = EmbeddingEngine::new(Some(config(&base, 4)));
        assert!(mismatched.embed_one("x").await.is_err());
        assert!(mismatched.try_embed_one("x").await.is_none());
    }
}
