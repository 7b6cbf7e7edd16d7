//! Text-to-vector embedding with a provider abstraction.
//!
//! Providers return vectors dimension-normalized (truncated or zero-padded)
//! to the configured size. The `mock` provider is fully deterministic so the
//! test suite never leaves the process.

pub mod http;
pub mod mock;

use crate::config::{EmbeddingConfig, LlmConfig};
use anyhow::Result;
use async_trait::async_trait;

/// Trait for embedding text into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts; the result has exactly one vector per input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Number of dimensions this provider produces.
    fn dimension(&self) -> usize;

    /// Whether this is the deterministic mock (vector search is skipped for it).
    fn is_mock(&self) -> bool {
        false
    }
}

/// Create an embedding provider from config.
pub fn create_provider(
    config: &EmbeddingConfig,
    llm: &LlmConfig,
    api_key: String,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.trim().to_lowercase().as_str() {
        "mock" => Ok(Box::new(mock::MockEmbeddingProvider::new(config.dimension))),
        "" | "http" | "qwen" | "openai" => Ok(Box::new(http::HttpEmbeddingProvider::new(
            config, llm, api_key,
        ))),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: http, mock"),
    }
}

/// Truncate or zero-pad a vector to `dimension`.
pub fn normalize_dimension(vector: Vec<f32>, dimension: usize) -> Vec<f32> {
    if dimension == 0 || vector.len() == dimension {
        return vector;
    }
    if vector.len() > dimension {
        let mut v = vector;
        v.truncate(dimension);
        return v;
    }
    let mut out = vec![0f32; dimension];
    out[..vector.len()].copy_from_slice(&vector);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_dimension_truncates() {
        assert_eq!(normalize_dimension(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
    }

    #[test]
    fn normalize_dimension_pads() {
        assert_eq!(
            normalize_dimension(vec![1.0, 2.0], 4),
            vec![1.0, 2.0, 0.0, 0.0]
        );
    }

    #[test]
    fn normalize_dimension_zero_is_identity() {
        assert_eq!(normalize_dimension(vec![1.0, 2.0], 0), vec![1.0, 2.0]);
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let mut cfg = EmbeddingConfig::default();
        cfg.provider = "fastembed".into();
        assert!(create_provider(&cfg, &LlmConfig::default(), String::new()).is_err());
    }

    #[test]
    fn factory_builds_mock() {
        let mut cfg = EmbeddingConfig::default();
        cfg.provider = "mock".into();
        cfg.dimension = 16;
        let provider = create_provider(&cfg, &LlmConfig::default(), String::new()).unwrap();
        assert!(provider.is_mock());
        assert_eq!(provider.dimension(), 16);
    }
}
