//! Index overview: tag/axis enumerations, top index paths, the hierarchical
//! path tree, and derived stats.

use crate::app::AppState;
use crate::db::index::{AggregateScope, MemoryCounts};
use crate::error::{Error, Result};
use crate::memory::normalize::normalize_index_input;
use crate::memory::types::{
    DepthCount, IndexAxis, IndexInput, IndexPathCount, IndexPathNode, IndexResponse, IndexStats,
    MemoryAxes, SearchMetadata,
};
use crate::memory::validate::validate_index_input;

pub async fn index_overview(state: &AppState, input: IndexInput) -> Result<IndexResponse> {
    let input = normalize_index_input(input, &state.config)?;
    validate_index_input(&input)?;

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
            None => {
                return Ok(IndexResponse {
                    axes: Vec::new(),
                    paths: Vec::new(),
                    path_tree: Vec::new(),
                    stats: IndexStats::default(),
                    metadata: SearchMetadata::counted(0, 0),
                })
            }
        }
    };

    let prefix = input.index_path.clone().unwrap_or_default();
    let scope = AggregateScope {
        project_id,
        owner_id: &input.owner_id,
        path_prefix: &prefix,
    };

    let mut axes = Vec::new();
    let tag_counts = state
        .store
        .fetch_tag_counts(&scope, input.limit)
        .await
        .map_err(Error::Internal)?;
    if !tag_counts.is_empty() {
        axes.push(IndexAxis {
            axis: "tags".into(),
            values: tag_counts,
        });
    }
    for axis in MemoryAxes::AXIS_NAMES {
        let values = state
            .store
            .fetch_axis_counts(&scope, axis, input.limit)
            .await
            .map_err(Error::Internal)?;
        if !values.is_empty() {
            axes.push(IndexAxis {
                axis: axis.into(),
                values,
            });
        }
    }

    let paths = state
        .store
        .fetch_index_paths(&scope, input.limit)
        .await
        .map_err(Error::Internal)?;
    let paths_for_tree = trim_path_counts(&paths, &prefix);
    let path_tree = build_path_tree(
        &paths_for_tree,
        input.path_tree_depth as usize,
        input.path_tree_width as usize,
    );

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
    let stats = build_index_stats(counts, &depth_dist, &path_tree);

    let total = axes.len() + paths.len();
    Ok(IndexResponse {
        axes,
        paths,
        path_tree,
        stats,
        metadata: SearchMetadata::counted(total, total),
    })
}

/// Re-root paths at the supplied prefix: strip it from matching paths and
/// drop everything else (and prefix-only paths with nothing below).
pub fn trim_path_counts(paths: &[IndexPathCount], prefix: &[String]) -> Vec<IndexPathCount> {
    if prefix.is_empty() {
        return paths.to_vec();
    }
    paths
        .iter()
        .filter(|p| p.path.len() > prefix.len() && p.path.starts_with(prefix))
        .map(|p| IndexPathCount {
            path: p.path[prefix.len()..].to_vec(),
            count: p.count,
        })
        .collect()
}

/// Fold flat path counts into a tree. Depth truncation applies first, then
/// width truncation keeps the highest-count children of every node.
pub fn build_path_tree(
    paths: &[IndexPathCount],
    depth: usize,
    width: usize,
) -> Vec<IndexPathNode> {
    let mut roots: Vec<IndexPathNode> = Vec::new();
    for path_count in paths {
        let mut segments = path_count.path.as_slice();
        if depth > 0 && segments.len() > depth {
            segments = &segments[..depth];
        }
        if segments.is_empty() {
            continue;
        }
        insert_path(&mut roots, segments, path_count.count);
    }
    if width > 0 {
        truncate_width(&mut roots, width);
    }
    sort_by_count(&mut roots);
    roots
}

fn insert_path(nodes: &mut Vec<IndexPathNode>, segments: &[String], count: i64) {
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return,
    };
    let node = match nodes.iter_mut().find(|n| &n.name == head) {
        Some(node) => node,
        None => {
            nodes.push(IndexPathNode {
                name: head.clone(),
                count: 0,
                children: Vec::new(),
            });
            nodes.last_mut().expect("just pushed")
        }
    };
    node.count += count;
    insert_path(&mut node.children, rest, count);
}

fn truncate_width(nodes: &mut Vec<IndexPathNode>, width: usize) {
    nodes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    nodes.truncate(width);
    for node in nodes.iter_mut() {
        truncate_width(&mut node.children, width);
    }
}

fn sort_by_count(nodes: &mut Vec<IndexPathNode>) {
    nodes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    for node in nodes.iter_mut() {
        sort_by_count(&mut node.children);
    }
}

/// Derive the stats block from coverage counts, the depth distribution, and
/// the folded tree.
pub fn build_index_stats(
    counts: MemoryCounts,
    depth_dist: &[DepthCount],
    tree: &[IndexPathNode],
) -> IndexStats {
    let total = counts.total;
    let ratio = |part: i64| {
        if total > 0 {
            part as f64 / total as f64
        } else {
            0.0
        }
    };

    let mut depth_sum = 0i64;
    let mut depth_count = 0i64;
    let mut max_depth = 0i64;
    for item in depth_dist {
        depth_sum += item.depth * item.count;
        depth_count += item.count;
        max_depth = max_depth.max(item.depth);
    }
    let avg_depth = if depth_count > 0 {
        depth_sum as f64 / depth_count as f64
    } else {
        0.0
    };

    let (child_sum, internal_nodes) = branching(tree);
    let branching_factor = if internal_nodes > 0 {
        child_sum as f64 / internal_nodes as f64
    } else {
        0.0
    };

    IndexStats {
        total_memories: total,
        axes_coverage: ratio(counts.with_axes),
        index_path_coverage: ratio(counts.with_index_path),
        avg_path_depth: avg_depth,
        max_path_depth: max_depth,
        branching_factor,
        depth_distribution: depth_dist.to_vec(),
    }
}

/// (total children across internal nodes, number of internal nodes)
fn branching(nodes: &[IndexPathNode]) -> (usize, usize) {
    let mut children = 0;
    let mut internal = 0;
    for node in nodes {
        if !node.children.is_empty() {
            internal += 1;
            children += node.children.len();
            let (c, i) = branching(&node.children);
            children += c;
            internal += i;
        }
    }
    (children, internal)
}
