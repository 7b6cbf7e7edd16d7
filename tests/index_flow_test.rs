//! Aggregation scenarios: axis/tag/path browsing, the path tree, stats, the
//! Prometheus rendering, and project listing.

mod helpers;

use helpers::{ingest_input, now_ts, quiet_state, unique_project};
use memex::memory::types::{IndexInput, ListProjectsInput, MemoryAxes};

async fn seed_indexed(state: &memex::app::AppState, project: &str) {
    let mut a = ingest_input(project, "development", "网关路由层的实现说明", now_ts());
    a.axes = Some(MemoryAxes {
        stack: vec!["rust".into()],
        component: vec!["gateway".into()],
        ..Default::default()
    });
    a.index_path = Some(vec!["backend".into(), "gateway".into()]);
    memex::memory::ingest::ingest_memory(state, a).await.unwrap();

    let mut b = ingest_input(project, "development", "网关限流策略与配置", now_ts());
    b.axes = Some(MemoryAxes {
        stack: vec!["rust".into()],
        problem: vec!["rate-limit".into()],
        ..Default::default()
    });
    b.index_path = Some(vec!["backend".into(), "ratelimit".into()]);
    memex::memory::ingest::ingest_memory(state, b).await.unwrap();

    let c = ingest_input(project, "insight", "无轴无路径的普通记录", now_ts());
    memex::memory::ingest::ingest_memory(state, c).await.unwrap();
}

fn index_input(project: &str) -> IndexInput {
    IndexInput {
        owner_id: "personal".into(),
        project_key: project.into(),
        project_name: project.into(),
        limit: 50,
        ..Default::default()
    }
}

#[tokio::test]
async fn index_overview_aggregates_axes_and_paths() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("index");
    seed_indexed(&state, &project).await;

    let response = memex::memory::index::index_overview(&state, index_input(&project))
        .await
        .unwrap();

    let stack = response
        .axes
        .iter()
        .find(|a| a.axis == "stack")
        .expect("stack axis present");
    assert_eq!(stack.values[0].value, "rust");
    assert_eq!(stack.values[0].count, 2);

    assert!(response.axes.iter().any(|a| a.axis == "tags"));
    assert_eq!(response.paths.len(), 2);

    let backend = response
        .path_tree
        .iter()
        .find(|n| n.name == "backend")
        .expect("tree rooted at backend");
    assert_eq!(backend.count, 2);
    assert_eq!(backend.children.len(), 2);

    let stats = &response.stats;
    assert_eq!(stats.total_memories, 3);
    assert!((stats.axes_coverage - 2.0 / 3.0).abs() < 1e-9);
    assert!((stats.index_path_coverage - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats.max_path_depth, 2);
    assert!(!stats.depth_distribution.is_empty());
}

#[tokio::test]
async fn index_path_prefix_reroots_the_tree() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("index-prefix");
    seed_indexed(&state, &project).await;

    let mut input = index_input(&project);
    input.index_path = Some(vec!["backend".into()]);
    let response = memex::memory::index::index_overview(&state, input).await.unwrap();

    // re-rooted: children of backend become the roots
    let names: Vec<&str> = response.path_tree.iter().map(|n| n.name.as_str()).collect();
    assert!(names.contains(&"gateway"));
    assert!(names.contains(&"ratelimit"));
    assert_eq!(response.stats.total_memories, 2);
}

#[tokio::test]
async fn metrics_render_valid_prometheus_text() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("metrics");
    seed_indexed(&state, &project).await;

    let response = memex::memory::metrics::metrics(&state, index_input(&project))
        .await
        .unwrap();
    assert!(!response.content.is_empty());

    for line in response.content.lines() {
        let open = line.find('{').expect("labels present");
        let close = line.rfind('}').expect("labels closed");
        assert!(line[..open].starts_with("memex_"));
        let labels = &line[open + 1..close];
        for required in ["owner_id=", "project_key=", "project_name=", "path_prefix="] {
            assert!(labels.contains(required), "missing {required} in {line}");
        }
        line[close + 1..].trim().parse::<f64>().expect("numeric value");
    }
    assert!(response.content.contains("memex_total_memories"));
}

#[tokio::test]
async fn metrics_are_cached_within_ttl() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("metrics-cache");
    seed_indexed(&state, &project).await;

    let first = memex::memory::metrics::metrics(&state, index_input(&project))
        .await
        .unwrap();

    // a write after the first render is invisible until the TTL passes
    memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "insight", "缓存期内新增的记录", now_ts()),
    )
    .await
    .unwrap();

    let second = memex::memory::metrics::metrics(&state, index_input(&project))
        .await
        .unwrap();
    assert_eq!(first.content, second.content);
}

#[tokio::test]
async fn list_projects_reports_counts_and_latest_ts() {
    let Some(state) = quiet_state().await else { return };
    let project = unique_project("projects");
    let latest = now_ts();

    memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "plan", "项目统计用的第一条", latest - 100),
    )
    .await
    .unwrap();
    memex::memory::ingest::ingest_memory(
        &state,
        ingest_input(&project, "plan", "项目统计用的第二条", latest),
    )
    .await
    .unwrap();

    let response = state
        .list_projects(ListProjectsInput {
            owner_id: "personal".into(),
            limit: 1000,
        })
        .await
        .unwrap();
    let row = response
        .results
        .iter()
        .find(|p| p.project_key == project)
        .expect("seeded project listed");
    assert_eq!(row.memory_count, 2);
    assert_eq!(row.latest_ts, latest);
    assert_eq!(row.owner_id, "personal");
}
