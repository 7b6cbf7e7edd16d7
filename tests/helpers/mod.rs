//! Shared fixtures for the Postgres-backed integration suites.
//!
//! Every suite is gated on `MEMEX_TEST_DATABASE_URL`; without it the tests
//! skip so `cargo test` stays green on machines without a database. The
//! providers are always the deterministic mocks.

#![allow(dead_code)]

use std::sync::Arc;

use memex::app::AppState;
use memex::config::MemexConfig;
use memex::memory::types::IngestMemoryInput;

/// Build an app state against the test database, or `None` to skip.
///
/// `threshold` tunes the semantic-conflict shortlist: the MD5 mock embedder
/// produces all-positive vectors, so a low threshold makes every same-project
/// pair a candidate and routes the decision to the mock arbitrator.
pub async fn test_state(threshold: f64) -> Option<Arc<AppState>> {
    let url = match std::env::var("MEMEX_TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("MEMEX_TEST_DATABASE_URL not set, skipping integration test");
            return None;
        }
    };
    std::env::set_var("MEMEX_LLM_MODE", "mock");

    let mut config = MemexConfig::default();
    config.storage.database_url = url;
    config.project.owner_id = "personal".into();
    config.embedding.provider = "mock".into();
    config.embedding.dimension = 64;
    config.versioning.semantic_similarity_threshold = threshold;
    config.query_expansion.enabled = false;
    config.rerank.enabled = false;

    let state = AppState::new(config).await.expect("connect test database");
    state.ensure_schema(false).await.expect("bootstrap schema");
    Some(state)
}

/// A conflict-averse state: threshold 1.0 means only identical embeddings
/// shortlist, so unrelated ingests never arbitrate.
pub async fn quiet_state() -> Option<Arc<AppState>> {
    test_state(1.0).await
}

/// Fresh project key so suites never see each other's rows.
pub fn unique_project(prefix: &str) -> String {
    format!("{prefix}-{}", uuid_suffix())
}

fn uuid_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{nanos:x}-{:x}", std::process::id())
}

pub fn ingest_input(project: &str, content_type: &str, content: &str, ts: i64) -> IngestMemoryInput {
    IngestMemoryInput {
        owner_id: "personal".into(),
        project_key: project.into(),
        project_name: project.into(),
        content_type: content_type.into(),
        content: content.into(),
        ts,
        ..Default::default()
    }
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Raw scalar queries for asserting storage invariants.
pub async fn count_fragments(state: &AppState, memory_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM fragments WHERE memory_id = $1")
        .bind(memory_id)
        .fetch_one(state.store.pool())
        .await
        .unwrap()
}

pub async fn count_versions(state: &AppState, memory_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM memory_versions WHERE memory_id = $1")
        .bind(memory_id)
        .fetch_one(state.store.pool())
        .await
        .unwrap()
}

pub async fn memory_ts(state: &AppState, memory_id: &str) -> i64 {
    sqlx::query_scalar("SELECT ts FROM memories WHERE id = $1")
        .bind(memory_id)
        .fetch_one(state.store.pool())
        .await
        .unwrap()
}

pub async fn memory_content(state: &AppState, memory_id: &str) -> String {
    sqlx::query_scalar("SELECT content FROM memories WHERE id = $1")
        .bind(memory_id)
        .fetch_one(state.store.pool())
        .await
        .unwrap()
}

pub async fn memory_chunk_count(state: &AppState, memory_id: &str) -> i32 {
    sqlx::query_scalar("SELECT chunk_count FROM memories WHERE id = $1")
        .bind(memory_id)
        .fetch_one(state.store.pool())
        .await
        .unwrap()
}

pub async fn avg_embedding_norm(state: &AppState, memory_id: &str) -> f64 {
    let text: String =
        sqlx::query_scalar("SELECT avg_embedding::text FROM memories WHERE id = $1")
            .bind(memory_id)
            .fetch_one(state.store.pool())
            .await
            .unwrap();
    let trimmed = text.trim_start_matches('[').trim_end_matches(']');
    let sum_sq: f64 = trimmed
        .split(',')
        .map(|v| v.trim().parse::<f64>().unwrap())
        .map(|v| v * v)
        .sum();
    sum_sq.sqrt()
}
