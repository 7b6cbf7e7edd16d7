//! Prometheus rendering of the index stats, with an in-process TTL cache.
//!
//! Writes never purge the cache; staleness is bounded by the TTL alone.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::app::AppState;
use crate::db::index::AggregateScope;
use crate::error::{Error, Result};
use crate::memory::index::{build_index_stats, build_path_tree, trim_path_counts};
use crate::memory::ingest::hash_content;
use crate::memory::normalize::normalize_index_input;
use crate::memory::types::{IndexInput, IndexStats, MetricsResponse};
use crate::memory::validate::validate_index_input;

pub struct MetricsCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, MetricsResponse)>>,
}

impl MetricsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<MetricsResponse> {
        let entries = self.entries.lock().ok()?;
        let (stored_at, value) = entries.get(key)?;
        if stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(value.clone())
    }

    pub fn set(&self, key: String, value: MetricsResponse) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, (stored_at, _)| stored_at.elapsed() <= self.ttl);
            entries.insert(key, (Instant::now(), value));
        }
    }
}

pub async fn metrics(state: &AppState, input: IndexInput) -> Result<MetricsResponse> {
    let input = normalize_index_input(input, &state.config)?;
    validate_index_input(&input)?;

    let cache_key = metrics_cache_key(&input);
    if let Some(cached) = state.metrics_cache.get(&cache_key) {
        return Ok(cached);
    }

    let project_id = if input.project_key.is_empty() {
        None
    } else {
        match state
            .store
            .find_project_id(&input.owner_id, &input.project_key)
            .await
            .map_err(Error::Internal)?
        {
            Some(id) => Some(id),
            None => return Ok(MetricsResponse { content: String::new() }),
        }
    };

    let prefix = input.index_path.clone().unwrap_or_default();
    let scope = AggregateScope {
        project_id,
        owner_id: &input.owner_id,
        path_prefix: &prefix,
    };

    let counts = state
        .store
        .fetch_memory_counts(&scope)
        .await
        .map_err(Error::Internal)?;
    let depth_dist = state
        .store
        .fetch_depth_distribution(&scope)
        .await
        .map_err(Error::Internal)?;
    let paths = state
        .store
        .fetch_index_paths(&scope, input.limit)
        .await
        .map_err(Error::Internal)?;
    let paths_for_tree = trim_path_counts(&paths, &prefix);
    let tree = build_path_tree(
        &paths_for_tree,
        input.path_tree_depth as usize,
        input.path_tree_width as usize,
    );
    let stats = build_index_stats(counts, &depth_dist, &tree);

    let response = MetricsResponse {
        content: render_metrics(&stats, &input),
    };
    state.metrics_cache.set(cache_key, response.clone());
    Ok(response)
}

/// Render the stats block in Prometheus exposition format.
pub fn render_metrics(stats: &IndexStats, input: &IndexInput) -> String {
    let mut out = String::new();
    write_gauge(&mut out, "memex_total_memories", stats.total_memories as f64, input, None);
    write_gauge(&mut out, "memex_axes_coverage", stats.axes_coverage, input, None);
    write_gauge(
        &mut out,
        "memex_index_path_coverage",
        stats.index_path_coverage,
        input,
        None,
    );
    write_gauge(&mut out, "memex_avg_path_depth", stats.avg_path_depth, input, None);
    write_gauge(
        &mut out,
        "memex_max_path_depth",
        stats.max_path_depth as f64,
        input,
        None,
    );
    write_gauge(
        &mut out,
        "memex_branching_factor",
        stats.branching_factor,
        input,
        None,
    );
    for item in &stats.depth_distribution {
        write_gauge(
            &mut out,
            "memex_depth_distribution",
            item.count as f64,
            input,
            Some(format!("depth=\"{}\"", item.depth)),
        );
    }
    out
}

fn write_gauge(
    out: &mut String,
    name: &str,
    value: f64,
    input: &IndexInput,
    extra: Option<String>,
) {
    let path_prefix = input
        .index_path
        .as_ref()
        .map(|p| p.join("/"))
        .unwrap_or_default();
    let mut labels = vec![
        format!("owner_id=\"{}\"", escape_label(&input.owner_id)),
        format!("project_key=\"{}\"", escape_label(&input.project_key)),
        format!("project_name=\"{}\"", escape_label(&input.project_name)),
        format!("path_prefix=\"{}\"", escape_label(&path_prefix)),
    ];
    if let Some(extra) = extra {
        labels.push(extra);
    }
    // render integers without a trailing .0 so the text stays diffable
    if value.fract() == 0.0 {
        out.push_str(&format!("{name}{{{}}} {}\n", labels.join(","), value as i64));
    } else {
        out.push_str(&format!("{name}{{{}}} {value}\n", labels.join(",")));
    }
}

/// Escape backslashes and double quotes inside label values.
pub fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Stable cache key over every request field that shapes the output.
pub fn metrics_cache_key(input: &IndexInput) -> String {
    let path = input
        .index_path
        .as_ref()
        .map(|p| p.join("/"))
        .unwrap_or_default();
    let raw = [
        input.owner_id.as_str(),
        input.project_key.as_str(),
        input.project_name.as_str(),
        path.as_str(),
        &input.limit.to_string(),
        &input.path_tree_depth.to_string(),
        &input.path_tree_width.to_string(),
    ]
    .join("|");
    format!("metrics:{}", hash_content(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::DepthCount;

    fn input() -> IndexInput {
        IndexInput {
            owner_id: "personal".into(),
            project_key: "p1".into(),
            project_name: "p1".into(),
            limit: 20,
            ..Default::default()
        }
    }

    fn stats() -> IndexStats {
        IndexStats {
            total_memories: 7,
            axes_coverage: 0.5,
            index_path_coverage: 0.25,
            avg_path_depth: 1.5,
            max_path_depth: 3,
            branching_factor: 2.0,
            depth_distribution: vec![DepthCount { depth: 2, count: 4 }],
        }
    }

    #[test]
    fn every_gauge_carries_the_label_set() {
        let text = render_metrics(&stats(), &input());
        for line in text.lines() {
            assert!(line.contains("owner_id=\"personal\""), "line: {line}");
            assert!(line.contains("project_key=\"p1\""), "line: {line}");
            assert!(line.contains("project_name=\"p1\""), "line: {line}");
            assert!(line.contains("path_prefix=\"\""), "line: {line}");
        }
        assert!(text.contains("memex_total_memories{"));
        assert!(text.contains("} 7\n"));
        assert!(text.contains("memex_depth_distribution{"));
        assert!(text.contains("depth=\"2\"} 4"));
    }

    #[test]
    fn gauge_lines_parse_as_prometheus_text() {
        let text = render_metrics(&stats(), &input());
        for line in text.lines() {
            // name{labels} value
            let open = line.find('{').unwrap();
            let close = line.rfind('}').unwrap();
            assert!(open < close);
            let name = &line[..open];
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
            let value = line[close + 1..].trim();
            value.parse::<f64>().unwrap();
        }
    }

    #[test]
    fn labels_are_escaped() {
        assert_eq!(escape_label("a\"b"), "a\\\"b");
        assert_eq!(escape_label("a\\b"), "a\\\\b");
        let mut bad = input();
        bad.project_name = "we \"quote\"".into();
        let text = render_metrics(&stats(), &bad);
        assert!(text.contains("project_name=\"we \\\"quote\\\"\""));
    }

    #[test]
    fn cache_key_covers_all_fields() {
        let base = metrics_cache_key(&input());
        let mut other = input();
        other.path_tree_depth = 3;
        assert_ne!(base, metrics_cache_key(&other));
        let mut other = input();
        other.index_path = Some(vec!["a".into()]);
        assert_ne!(base, metrics_cache_key(&other));
        assert_eq!(base, metrics_cache_key(&input()));
    }

    #[test]
    fn cache_expires_by_ttl() {
        let cache = MetricsCache::new(Duration::from_millis(0));
        cache.set(
            "k".into(),
            MetricsResponse {
                content: "v".into(),
            },
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());

        let cache = MetricsCache::new(Duration::from_secs(60));
        cache.set(
            "k".into(),
            MetricsResponse {
                content: "v".into(),
            },
        );
        assert_eq!(cache.get("k").unwrap().content, "v");
    }
}
