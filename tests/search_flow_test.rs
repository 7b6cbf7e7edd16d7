//! Retrieval scenarios against a live database: hybrid search with the mock
//! embedder (lexical sources only), scoping, modes, and the two-stage fetch.

mod helpers;

use helpers::{ingest_input, now_ts, quiet_state, unique_project};
use memex::memory::types::{SearchInput, TimelineInput};

fn search_input(project: &str, query: &str, scope: &str, limit: i64) -> SearchInput {
    SearchInput {
        owner_id: "personal".into(),
        project_key: project.into(),
        project_name: project.into(),
        query: query.into(),
        scope: scope.into(),
        limit,
        ..Default::default()
    }
}

#[tokio::test]
async fn hybrid_search_finds_the_seeded_memory() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("search");

    let out = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "development", "PostgreSQL + pgvector 方案", now_ts()),
    )
    .await
    .unwrap();

    let response = memex::memory::search::search(
        &state,
        search_input(&project, "PostgreSQL", "development", 5),
    )
    .await
    .unwrap();

    assert_eq!(response.metadata.returned, 1);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].id, out.id);
    assert_eq!(response.metadata.next_action, "use_ids_to_call_mem_get");
}

#[tokio::test]
async fn scope_filters_by_content_type() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("scope");

    memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "development", "缓存层使用 Redis 方案", now_ts()),
    )
    .await
    .unwrap();
    memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "testing", "Redis 压测报告与结论", now_ts()),
    )
    .await
    .unwrap();

    let all = memex::memory::search::search(&state, search_input(&project, "Redis", "all", 10))
        .await
        .unwrap();
    assert_eq!(all.results.len(), 2);

    let testing_only =
        memex::memory::search::search(&state, search_input(&project, "Redis", "testing", 10))
            .await
            .unwrap();
    assert_eq!(testing_only.results.len(), 1);
    assert_eq!(testing_only.results[0].content_type, "testing");
}

#[tokio::test]
async fn results_dedupe_by_memory_id() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("searchdedup");

    // long content -> several fragments, all mentioning the query token
    let content = "检索融合 RRF 设计说明。".repeat(300);
    let out = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "development", &content, now_ts()),
    )
    .await
    .unwrap();

    let response =
        memex::memory::search::search(&state, search_input(&project, "RRF", "all", 10))
            .await
            .unwrap();
    let matching: Vec<_> = response.results.iter().filter(|r| r.id == out.id).collect();
    assert_eq!(matching.len(), 1, "one result per memory");
}

#[tokio::test]
async fn mock_embedder_returns_lexical_hits_only() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("noise");

    memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "development", "我们最终选择了 MySQL 存储引擎", now_ts()),
    )
    .await
    .unwrap();

    // the only seeded memory mentions MySQL, not PostgreSQL: with the mock
    // embedder there is no vector source, so nothing can leak in
    let response = memex::memory::search::search(
        &state,
        search_input(&project, "PostgreSQL", "all", 10),
    )
    .await
    .unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.metadata.total, 0);
}

#[tokio::test]
async fn modes_shape_the_result_fields() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("modes");

    memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "insight", "部署脚本需要幂等性保障", now_ts()),
    )
    .await
    .unwrap();

    let mut input = search_input(&project, "幂等性", "all", 5);
    input.mode = Some("ids".into());
    let ids = memex::memory::search::search(&state, input).await.unwrap();
    assert_eq!(ids.results.len(), 1);
    assert!(ids.results[0].snippet.is_empty());
    assert!(ids.results[0].content_type.is_empty());

    let mut input = search_input(&project, "幂等性", "all", 5);
    input.mode = Some("full".into());
    let full = memex::memory::search::search(&state, input).await.unwrap();
    assert_eq!(full.results.len(), 1);
    assert!(full.results[0].snippet.contains("幂等性"));
    assert_eq!(full.results[0].project_key, project);
    assert!(full.results[0].score > 0.0);
}

#[tokio::test]
async fn missing_project_yields_empty_not_error() {
    let Some(state) = quiet_state().await else { return };
    let response = memex::memory::search::search(
        &state,
        search_input("never-created-project", "anything", "all", 5),
    )
    .await
    .unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.metadata.total, 0);
}

#[tokio::test]
async fn get_memories_preserves_request_order() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("get");

    let a = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "plan", "第一条记忆内容", now_ts()),
    )
    .await
    .unwrap();
    let b = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "plan", "第二条记忆内容", now_ts()),
    )
    .await
    .unwrap();

    let response = state
        .get_memories(&[b.id.clone(), a.id.clone(), "mem_missing".into()])
        .await
        .unwrap();
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].id, b.id);
    assert_eq!(response.results[1].id, a.id);

    let too_many: Vec<String> = (0..11).map(|i| format!("mem_{i}")).collect();
    assert!(state.get_memories(&too_many).await.is_err());
}

#[tokio::test]
async fn timeline_returns_recent_memories_newest_first() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("timeline");

    let old = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "plan", "较早的计划记录", now_ts() - 3600),
    )
    .await
    .unwrap();
    let new = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "plan", "最新的计划记录", now_ts()),
    )
    .await
    .unwrap();

    let response = state
        .timeline(TimelineInput {
            owner_id: "personal".into(),
            project_key: project.clone(),
            project_name: project.clone(),
            days: 7,
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].id, new.id);
    assert_eq!(response.results[1].id, old.id);
}
