//! Deterministic mock LLM — word-overlap arbitration and line-based
//! summaries, no network.

use super::{fallback_query_keywords, fallback_tags, Arbitration, LlmProvider, RerankEntry};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

pub struct MockLlmProvider;

impl MockLlmProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// First three non-empty lines joined with "；".
pub fn mock_summary(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join("；")
}

/// Word-overlap heuristic: identical summaries → SKIP; more than half the new
/// words present in the old → REPLACE; otherwise KEEP_BOTH.
pub fn mock_arbitrate(new_summary: &str, old_summary: &str) -> Arbitration {
    if new_summary.trim() == old_summary.trim() {
        return Arbitration::Skip;
    }
    let new_words: Vec<&str> = new_summary.split_whitespace().collect();
    let old_words: HashSet<&str> = old_summary.split_whitespace().collect();
    if new_words.is_empty() || old_words.is_empty() {
        return Arbitration::KeepBoth;
    }
    let overlap = new_words.iter().filter(|w| old_words.contains(**w)).count();
    let ratio = overlap as f64 / new_words.len() as f64;
    if ratio > 0.5 {
        Arbitration::Replace
    } else {
        Arbitration::KeepBoth
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn summarize(&self, content: &str) -> String {
        mock_summary(content)
    }

    async fn extract_tags(&self, content: &str) -> Vec<String> {
        fallback_tags(content)
    }

    async fn expand_query(&self, query: &str, max_keywords: usize) -> Vec<String> {
        fallback_query_keywords(query, max_keywords)
    }

    async fn rerank(
        &self,
        _model: &str,
        _query: &str,
        _documents: &[String],
        _top_n: usize,
    ) -> Result<Vec<RerankEntry>> {
        Ok(Vec::new())
    }

    async fn arbitrate(&self, new_summary: &str, old_summary: &str) -> Arbitration {
        mock_arbitrate(new_summary, old_summary)
    }

    fn is_mock(&self) -> bool {
        true
    }
}
