//! OpenAI-compatible `/embeddings` provider with batching and retry/backoff.

use super::{normalize_dimension, EmbeddingProvider};
use crate::config::{EmbeddingConfig, LlmConfig};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const MAX_BATCH: usize = 10;
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_MS: u64 = 200;

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsItem>,
}

#[derive(Deserialize)]
struct EmbeddingsItem {
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig, llm: &LlmConfig, api_key: String) -> Self {
        let batch_size = config.batch_size.clamp(1, MAX_BATCH);
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size,
        }
    }

    async fn request_embeddings(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("embeddings request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("embeddings request returned {status}: {body}");
        }
        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .context("failed to decode embeddings response")?;
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }

    async fn embed_window(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_err = None;
        for attempt in 0..RETRY_ATTEMPTS {
            match self.request_embeddings(inputs).await {
                Ok(vectors) => {
                    if vectors.len() != inputs.len() {
                        bail!(
                            "embedding count mismatch: requested {}, got {}",
                            inputs.len(),
                            vectors.len()
                        );
                    }
                    return Ok(vectors);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "embedding batch failed");
                    last_err = Some(err);
                    if attempt + 1 < RETRY_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(RETRY_BASE_MS << attempt)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding request failed")))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("provider returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if self.model.trim().is_empty() {
            bail!("embedding model is not configured");
        }
        if self.api_key.trim().is_empty() {
            bail!("embedding API key is not configured");
        }

        let mut result = Vec::with_capacity(texts.len());
        for window in texts.chunks(self.batch_size) {
            let vectors = self.embed_window(window).await?;
            for vector in vectors {
                result.push(normalize_dimension(vector, self.dimension));
            }
        }
        Ok(result)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> HttpEmbeddingProvider {
        let mut cfg = EmbeddingConfig::default();
        cfg.batch_size = 100; // clamped to MAX_BATCH
        HttpEmbeddingProvider::new(&cfg, &LlmConfig::default(), String::new())
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(provider().batch_size, MAX_BATCH);
    }

    #[tokio::test]
    async fn missing_api_key_is_an_error() {
        let err = provider()
            .embed_batch(&["x".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        assert!(provider().embed_batch(&[]).await.unwrap().is_empty());
    }
}
