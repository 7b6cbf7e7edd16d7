//! Deterministic mock embedder — MD5 of the text, tiled to the configured
//! dimension. Keeps the test suite hermetic.

use super::{normalize_dimension, EmbeddingProvider};
use anyhow::Result;
use async_trait::async_trait;
use md5::{Digest, Md5};

pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let digest = Md5::digest(text.as_bytes());
        let base: Vec<f32> = digest.iter().map(|b| *b as f32 / 255.0).collect();
        if self.dimension == 0 {
            return base;
        }
        let mut out = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            out.push(base[i % base.len()]);
        }
        out
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(normalize_dimension(self.embed_one(text), self.dimension))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_mock(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic() {
        let provider = MockEmbeddingProvider::new(32);
        let a = provider.embed_query("hello").await.unwrap();
        let b = provider.embed_query("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn distinct_texts_distinct_vectors() {
        let provider = MockEmbeddingProvider::new(32);
        let a = provider.embed_query("hello").await.unwrap();
        let b = provider.embed_query("world").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn batch_matches_input_length() {
        let provider = MockEmbeddingProvider::new(16);
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let vectors = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 16));
    }

    #[tokio::test]
    async fn tiles_beyond_digest_length() {
        // MD5 gives 16 bytes; a 40-dim vector must tile them
        let provider = MockEmbeddingProvider::new(40);
        let v = provider.embed_query("tile me").await.unwrap();
        assert_eq!(v.len(), 40);
        assert_eq!(v[0], v[16]);
        assert_eq!(v[5], v[21]);
    }
}
