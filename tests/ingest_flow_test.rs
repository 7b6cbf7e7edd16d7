//! End-to-end write-path scenarios: hash dedup, arbitration into REPLACE /
//! KEEP_BOTH / SKIP, and the storage invariants each leaves behind.

mod helpers;

use helpers::{
    avg_embedding_norm, count_fragments, count_versions, ingest_input, memory_chunk_count,
    memory_content, memory_ts, now_ts, quiet_state, test_state, unique_project,
};

#[tokio::test]
async fn identical_content_is_deduplicated_and_ts_moves() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("dedup");
    let t1 = now_ts() - 60;
    let t2 = t1 + 30;

    let first = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "development", "PostgreSQL + pgvector 方案", t1),
    )
    .await
    .unwrap();
    assert_eq!(first.status, "created");

    let second = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "development", "PostgreSQL + pgvector 方案", t2),
    )
    .await
    .unwrap();
    assert_eq!(second.status, "duplicate");
    assert_eq!(second.id, first.id);
    assert_eq!(memory_ts(&state, &first.id).await, t2);
    // no version row is written on the duplicate path
    assert_eq!(count_versions(&state, &first.id).await, 0);
}

#[tokio::test]
async fn created_memory_satisfies_storage_invariants() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("invariants");

    let out = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "insight", "踩坑记录：连接池默认大小太小", now_ts()),
    )
    .await
    .unwrap();
    assert_eq!(out.status, "created");
    assert!(out.id.starts_with("mem_"));

    let fragments = count_fragments(&state, &out.id).await;
    let chunk_count = memory_chunk_count(&state, &out.id).await;
    assert!(fragments >= 1);
    assert_eq!(fragments, chunk_count as i64);

    let norm = avg_embedding_norm(&state, &out.id).await;
    assert!((norm - 1.0).abs() < 1e-5, "avg_embedding norm {norm}");
}

#[tokio::test]
async fn high_overlap_revision_replaces_and_versions() {
    let Some(state) = test_state(0.05).await else { return };
    let project = unique_project("replace");

    let a = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "development", "数据库选 MySQL 兼容优先", now_ts() - 10),
    )
    .await
    .unwrap();
    assert_eq!(a.status, "created");

    let b = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "development", "数据库选 MySQL 性能优化新方案", now_ts()),
    )
    .await
    .unwrap();
    assert_eq!(b.status, "updated");
    assert_eq!(b.id, a.id, "REPLACE overwrites the candidate row");

    assert_eq!(memory_content(&state, &a.id).await, "数据库选 MySQL 性能优化新方案");
    assert_eq!(count_versions(&state, &a.id).await, 1);
    assert_eq!(
        count_fragments(&state, &a.id).await,
        memory_chunk_count(&state, &a.id).await as i64
    );

    let history = memex::memory::history::arbitration_history(
        &state,
        memex::memory::types::ArbitrationHistoryInput {
            owner_id: "personal".into(),
            memory_id: a.id.clone(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(history.results.len(), 1);
    assert_eq!(history.results[0].action, "REPLACE");
    assert!(history.results[0].similarity > 0.0);
}

#[tokio::test]
async fn unrelated_topics_keep_both_and_log() {
    let Some(state) = test_state(0.05).await else { return };
    let project = unique_project("keepboth");

    let a = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "development", "前端使用 React", now_ts() - 10),
    )
    .await
    .unwrap();
    let b = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "development", "后端使用 Go", now_ts()),
    )
    .await
    .unwrap();

    assert_eq!(a.status, "created");
    assert_eq!(b.status, "created");
    assert_ne!(a.id, b.id, "KEEP_BOTH creates a second memory");

    // a candidate existed, so the rejected arbitration is still logged
    let history = memex::memory::history::arbitration_history(
        &state,
        memex::memory::types::ArbitrationHistoryInput {
            owner_id: "personal".into(),
            memory_id: b.id.clone(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(history.results.len(), 1);
    assert_eq!(history.results[0].action, "KEEP_BOTH");
}

#[tokio::test]
async fn identical_summary_skips_without_touching_the_candidate() {
    let Some(state) = test_state(0.05).await else { return };
    let project = unique_project("skip");

    // trailing whitespace: different content hash, identical trimmed summary
    let a = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "plan", "里程碑：完成检索管线", now_ts() - 10),
    )
    .await
    .unwrap();
    let ts_before = memory_ts(&state, &a.id).await;

    let b = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "plan", "里程碑：完成检索管线 ", now_ts()),
    )
    .await
    .unwrap();
    assert_eq!(b.status, "skipped");
    assert_eq!(b.id, a.id);

    // SKIP leaves the candidate untouched
    assert_eq!(memory_ts(&state, &a.id).await, ts_before);
    assert_eq!(memory_content(&state, &a.id).await, "里程碑：完成检索管线");
    assert_eq!(count_versions(&state, &a.id).await, 0);

    let history = memex::memory::history::arbitration_history(
        &state,
        memex::memory::types::ArbitrationHistoryInput {
            owner_id: "personal".into(),
            memory_id: a.id.clone(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(history.results.iter().any(|r| r.action == "SKIP"));
}

#[tokio::test]
async fn long_content_chunks_into_multiple_fragments() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("chunks");

    let content = "系统架构决策记录。".repeat(300); // 2700 runes > one window
    let out = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "development", &content, now_ts()),
    )
    .await
    .unwrap();
    assert_eq!(out.status, "created");

    let fragments = count_fragments(&state, &out.id).await;
    assert!(fragments >= 2);
    assert_eq!(fragments, memory_chunk_count(&state, &out.id).await as i64);
}

#[tokio::test]
async fn validation_failures_surface_stable_codes() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("validation");

    let err = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "episodic", "content", now_ts()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "ERR_INVALID_CONTENT_TYPE");

    let err = memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "plan", "   ", now_ts()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "ERR_INVALID_CONTENT");
}
