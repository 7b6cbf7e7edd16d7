//! Chat-completions LLM provider (OpenAI-compatible) plus the rerank
//! endpoint. Failures degrade to the local fallbacks; only rerank surfaces
//! its error so the caller can keep the original order.

use super::{
    fallback_query_keywords, fallback_tags, parse_string_array, Arbitration, LlmProvider,
    RerankEntry,
};
use crate::config::MemexConfig;
use crate::memory::truncate_runes;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_MS: u64 = 200;

pub struct HttpLlmProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model_summary: String,
    model_arbitrate: String,
    expansion_model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    relevance_score: f64,
}

impl HttpLlmProvider {
    pub fn new(config: &MemexConfig, api_key: String) -> Self {
        let expansion_model = if config.query_expansion.model.trim().is_empty() {
            config.llm.model_summary.clone()
        } else {
            config.query_expansion.model.clone()
        };
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: config.llm.base_url.trim_end_matches('/').to_string(),
            api_key,
            model_summary: config.llm.model_summary.clone(),
            model_arbitrate: config.llm.model_arbitrate.clone(),
            expansion_model,
        }
    }

    async fn chat_completion(
        &self,
        model: &str,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String> {
        if self.api_key.trim().is_empty() {
            bail!("LLM API key is not configured");
        }
        let payload = serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let mut last_err = None;
        for attempt in 0..RETRY_ATTEMPTS {
            let result = async {
                let response = self
                    .client
                    .post(format!("{}/chat/completions", self.base_url))
                    .bearer_auth(&self.api_key)
                    .json(&payload)
                    .send()
                    .await
                    .context("chat completion request failed")?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    bail!("chat completion returned {status}: {body}");
                }
                let parsed: ChatResponse = response
                    .json()
                    .await
                    .context("failed to decode chat completion")?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| anyhow::anyhow!("chat completion returned no choices"))
            }
            .await;

            match result {
                Ok(content) => return Ok(content),
                Err(err) => {
                    warn!(attempt, error = %err, "chat completion failed");
                    last_err = Some(err);
                    if attempt + 1 < RETRY_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(RETRY_BASE_MS << attempt)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("chat completion failed")))
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn summarize(&self, content: &str) -> String {
        let prompt = format!(
            "Compress the following document into a 3-5 sentence summary that \
             keeps the core conclusions.\n\nContent:\n{}",
            truncate_runes(content, 12000)
        );
        match self
            .chat_completion(&self.model_summary, &prompt, 0.2, 400)
            .await
        {
            Ok(raw) => raw.trim().to_string(),
            Err(_) => String::new(),
        }
    }

    async fn extract_tags(&self, content: &str) -> Vec<String> {
        let prompt = format!(
            "Extract 3-10 short tags from the following text. Output a JSON \
             array of strings and nothing else.\n\nText:\n{}",
            truncate_runes(content, 8000)
        );
        match self
            .chat_completion(&self.model_summary, &prompt, 0.2, 200)
            .await
        {
            Ok(raw) => match parse_string_array(&raw) {
                Some(tags) => crate::memory::normalize::normalize_tags(&tags),
                None => fallback_tags(&raw),
            },
            Err(_) => fallback_tags(content),
        }
    }

    async fn expand_query(&self, query: &str, max_keywords: usize) -> Vec<String> {
        let max = if max_keywords == 0 { 6 } else { max_keywords };
        let prompt = format!(
            "Expand the following search question into at most {max} keywords \
             or synonym phrases. Output a JSON array of strings and nothing \
             else.\n\nQuestion:\n{}",
            truncate_runes(query, 2000)
        );
        match self
            .chat_completion(&self.expansion_model, &prompt, 0.2, 200)
            .await
        {
            Ok(raw) => {
                let items = parse_string_array(&raw).unwrap_or_default();
                let mut normalized = crate::memory::normalize::normalize_tags(&items);
                normalized.truncate(max);
                if normalized.is_empty() {
                    fallback_query_keywords(query, max)
                } else {
                    normalized
                }
            }
            Err(_) => fallback_query_keywords(query, max),
        }
    }

    async fn rerank(
        &self,
        model: &str,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankEntry>> {
        if model.trim().is_empty() {
            bail!("rerank model is not configured");
        }
        if self.api_key.trim().is_empty() {
            bail!("LLM API key is not configured");
        }
        let top_n = if top_n == 0 { 10 } else { top_n };
        let payload = serde_json::json!({
            "model": model,
            "query": query,
            "documents": documents,
            "top_n": top_n,
        });
        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("rerank request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("rerank returned {status}: {body}");
        }
        let parsed: RerankResponse =
            response.json().await.context("failed to decode rerank response")?;
        Ok(parsed
            .results
            .into_iter()
            .map(|item| RerankEntry {
                index: item.index,
                relevance_score: item.relevance_score,
            })
            .collect())
    }

    async fn arbitrate(&self, new_summary: &str, old_summary: &str) -> Arbitration {
        let prompt = format!(
            "You are a knowledge-base curator. Decide how a new note relates \
             to an existing one.\n\n[Existing note summary]\n{old_summary}\n\n\
             [New note summary]\n{new_summary}\n\nRules:\n\
             1. The new note is an update/correction/extension of the same \
             topic -> answer REPLACE\n\
             2. The notes cover different topics that merely read alike -> \
             answer KEEP_BOTH\n\
             3. The notes are effectively identical with nothing new -> \
             answer SKIP\n\nAnswer with exactly one word: REPLACE or \
             KEEP_BOTH or SKIP"
        );
        match self
            .chat_completion(&self.model_arbitrate, &prompt, 0.1, 20)
            .await
        {
            Ok(raw) => Arbitration::parse(&raw),
            // provider down: keep both rather than overwrite
            Err(_) => Arbitration::KeepBoth,
        }
    }
}
