//! LLM capabilities behind a provider trait — summarization, tag extraction,
//! query expansion, reranking, and write arbitration.
//!
//! The `mock` provider answers with deterministic heuristics; the `http`
//! provider talks to an OpenAI-compatible chat endpoint. Callers treat every
//! method as best-effort: empty or failed answers fall back to the local
//! heuristics below.

pub mod http;
pub mod mock;

use crate::config::MemexConfig;
use crate::memory::normalize::unique_strings;
use crate::memory::truncate_runes;
use anyhow::Result;
use async_trait::async_trait;

/// Outcome of write arbitration against a candidate memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arbitration {
    /// New content supersedes the candidate.
    Replace,
    /// Different topics; keep both.
    KeepBoth,
    /// Nothing new; drop the write.
    Skip,
}

impl Arbitration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "REPLACE",
            Self::KeepBoth => "KEEP_BOTH",
            Self::Skip => "SKIP",
        }
    }

    /// Parse a model answer; first matching token wins, KEEP_BOTH by default.
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        if upper.contains("REPLACE") {
            Self::Replace
        } else if upper.contains("SKIP") {
            Self::Skip
        } else {
            Self::KeepBoth
        }
    }
}

impl std::fmt::Display for Arbitration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RerankEntry {
    pub index: usize,
    pub relevance_score: f64,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Compress content into a 3-5 sentence summary. Empty on failure.
    async fn summarize(&self, content: &str) -> String;

    /// Extract short tags from content. Falls back to token tags.
    async fn extract_tags(&self, content: &str) -> Vec<String>;

    /// Expand a query into up to `max_keywords` synonyms/keywords.
    async fn expand_query(&self, query: &str, max_keywords: usize) -> Vec<String>;

    /// Rerank documents against a query. Empty result leaves order unchanged.
    async fn rerank(
        &self,
        model: &str,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankEntry>>;

    /// Decide REPLACE / KEEP_BOTH / SKIP for a new summary vs. an old one.
    async fn arbitrate(&self, new_summary: &str, old_summary: &str) -> Arbitration;

    /// Whether this is the deterministic mock.
    fn is_mock(&self) -> bool {
        false
    }
}

/// Create an LLM provider from config. `MEMEX_LLM_MODE=mock` forces the mock.
pub fn create_provider(config: &MemexConfig, api_key: String) -> Box<dyn LlmProvider> {
    let forced_mock = std::env::var("MEMEX_LLM_MODE")
        .map(|v| v.trim().eq_ignore_ascii_case("mock"))
        .unwrap_or(false);
    if forced_mock {
        Box::new(mock::MockLlmProvider::new())
    } else {
        Box::new(http::HttpLlmProvider::new(config, api_key))
    }
}

/// First 100 runes of the trimmed content.
pub fn fallback_summary(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    truncate_runes(trimmed, 100)
}

/// Letter/number tokens of length >= 2, max 10, deduped in order.
pub fn fallback_tags(content: &str) -> Vec<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let mut tags: Vec<String> = Vec::new();
    for token in trimmed.split(|c: char| !c.is_alphanumeric()) {
        let token = token.trim();
        // dedup up front so repeats never consume cap slots
        if token.chars().count() < 2 || tags.iter().any(|t| t == token) {
            continue;
        }
        tags.push(token.to_string());
        if tags.len() >= 10 {
            break;
        }
    }
    unique_strings(&tags)
}

/// Keyword fallback for query expansion: alphanumeric tokens, capped.
pub fn fallback_query_keywords(query: &str, max: usize) -> Vec<String> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }
    let normalized = crate::memory::search::normalize_query(query);
    if normalized.is_empty() {
        return vec![query.to_string()];
    }
    let max = if max == 0 { 6 } else { max };
    let parts: Vec<String> = normalized
        .split_whitespace()
        .take(max)
        .map(|s| s.to_string())
        .collect();
    unique_strings(&parts)
}

/// Strip ```json fences a chat model may wrap arrays in, then parse.
pub fn parse_string_array(raw: &str) -> Option<Vec<String>> {
    let mut cleaned = raw.trim();
    if cleaned.starts_with("```") {
        cleaned = cleaned.trim_matches('`').trim();
        cleaned = cleaned.strip_prefix("json").unwrap_or(cleaned).trim();
    }
    if let Ok(items) = serde_json::from_str::<Vec<String>>(cleaned) {
        return Some(items);
    }
    // salvage an array embedded in prose
    let start = cleaned.find('[')?;
    let end = cleaned.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Vec<String>>(&cleaned[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arbitration_parse_first_token_wins() {
        assert_eq!(Arbitration::parse("REPLACE"), Arbitration::Replace);
        assert_eq!(Arbitration::parse(" skip\n"), Arbitration::Skip);
        assert_eq!(Arbitration::parse("answer: KEEP_BOTH"), Arbitration::KeepBoth);
        assert_eq!(Arbitration::parse("no idea"), Arbitration::KeepBoth);
        assert_eq!(Arbitration::parse(""), Arbitration::KeepBoth);
    }

    #[test]
    fn fallback_summary_truncates_to_100_runes() {
        assert_eq!(fallback_summary("  short  "), "short");
        let long = "记".repeat(150);
        assert_eq!(fallback_summary(&long).chars().count(), 100);
        assert_eq!(fallback_summary("   "), "");
    }

    #[test]
    fn fallback_tags_tokenize() {
        let tags = fallback_tags("PostgreSQL + pgvector 方案, v2!");
        assert_eq!(tags, vec!["PostgreSQL", "pgvector", "方案", "v2"]);
    }

    #[test]
    fn fallback_tags_cap_at_ten() {
        let content = (0..30).map(|i| format!("tag{i}")).collect::<Vec<_>>().join(" ");
        assert_eq!(fallback_tags(&content).len(), 10);
    }

    #[test]
    fn fallback_tags_dedupe_in_order() {
        assert_eq!(
            fallback_tags("test test example case"),
            vec!["test", "example", "case"]
        );
        // repeated tokens do not eat into the cap of ten
        let content = format!("{} unique1 unique2", "dup ".repeat(20));
        let tags = fallback_tags(&content);
        assert_eq!(tags[0], "dup");
        assert!(tags.contains(&"unique1".to_string()));
        assert!(tags.contains(&"unique2".to_string()));
    }

    #[test]
    fn fallback_tags_skip_single_runes() {
        assert_eq!(fallback_tags("a b cd e fg"), vec!["cd", "fg"]);
    }

    #[test]
    fn query_keywords_cap() {
        let kws = fallback_query_keywords("postgres vector hybrid search fusion rrf extra", 3);
        assert_eq!(kws, vec!["postgres", "vector", "hybrid"]);
    }

    #[test]
    fn parse_string_array_handles_fences() {
        assert_eq!(
            parse_string_array("```json\n[\"a\",\"b\"]\n```").unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(
            parse_string_array("keywords: [\"x\", \"y\"] ok").unwrap(),
            vec!["x", "y"]
        );
        assert!(parse_string_array("not an array").is_none());
    }
}
