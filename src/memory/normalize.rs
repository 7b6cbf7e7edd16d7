//! Deterministic input normalization, applied before validation on every
//! entry point: trim, resolve the owner, derive project identity, lowercase
//! and dedup axis values, drop empty path segments, and fill defaults.

use crate::config::MemexConfig;
use crate::error::{Error, Result};
use crate::memory::types::{
    ArbitrationHistoryInput, IndexInput, IngestMemoryInput, ListProjectsInput, MemoryAxes,
    SearchInput, TimelineInput,
};

pub const DEFAULT_OWNER_ID: &str = "personal";
pub const DEFAULT_SEARCH_LIMIT: i64 = 20;
pub const DEFAULT_TIMELINE_DAYS: i64 = 7;
pub const DEFAULT_TIMELINE_LIMIT: i64 = 20;
pub const DEFAULT_LIST_PROJECTS_LIMIT: i64 = 50;
pub const DEFAULT_INDEX_LIMIT: i64 = 20;

/// Trim, dedup, and drop empty tags, preserving order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for tag in tags {
        let value = tag.trim();
        if value.is_empty() || !seen.insert(value.to_string()) {
            continue;
        }
        result.push(value.to_string());
    }
    result
}

/// Trim, dedup, and drop empty strings, preserving order.
pub fn unique_strings(values: &[String]) -> Vec<String> {
    normalize_tags(values)
}

/// Lowercase, trim, and dedup the values of every axis.
pub fn normalize_axes(axes: &MemoryAxes) -> Option<MemoryAxes> {
    let mut out = MemoryAxes::default();
    for axis in MemoryAxes::AXIS_NAMES {
        let lowered: Vec<String> = axes
            .values(axis)
            .iter()
            .map(|v| v.trim().to_lowercase())
            .collect();
        if let Some(slot) = out.values_mut(axis) {
            *slot = normalize_tags(&lowered);
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Trim segments and drop empty ones.
pub fn normalize_index_path(path: &[String]) -> Vec<String> {
    path.iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Last path component of a POSIX or Windows path.
pub fn base_name(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        return path.to_string();
    }
    trimmed
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

/// Resolve the effective owner. The request value wins but must agree with
/// the server-configured owner when both are present.
pub fn resolve_owner_id(input_owner: &str, config: &MemexConfig) -> Result<String> {
    let owner = input_owner.trim();
    let configured = config.project.owner_id.trim();
    if !owner.is_empty() {
        if !configured.is_empty() && owner != configured {
            return Err(Error::invalid(
                "ERR_OWNER_MISMATCH",
                "owner_id does not match the configured owner",
            ));
        }
        return Ok(owner.to_string());
    }
    if !configured.is_empty() {
        return Ok(configured.to_string());
    }
    Ok(DEFAULT_OWNER_ID.to_string())
}

/// Derive `(project_key, project_name)` from whichever of name/key/path the
/// caller supplied. At least one must be non-empty.
pub fn resolve_project_identity(
    project_name: &str,
    project_key: &str,
    project_path: &str,
) -> Result<(String, String)> {
    let name = project_name.trim();
    let mut key = project_key.trim().to_string();
    let path = project_path.trim();

    let mut key_from_path = false;
    if key.is_empty() {
        if !name.is_empty() {
            key = name.to_string();
        } else if !path.is_empty() {
            key = path.to_string();
            key_from_path = true;
        }
    }

    let mut name = name.to_string();
    if name.is_empty() {
        if key_from_path && !path.is_empty() {
            name = base_name(path);
        } else if !key.is_empty() {
            name = key.clone();
        } else if !path.is_empty() {
            name = base_name(path);
        }
    }

    if key.is_empty() {
        return Err(Error::invalid(
            "ERR_INVALID_PROJECT",
            "one of project_key, project_name, or project_path is required",
        ));
    }
    Ok((key, name))
}

fn has_project_selector(name: &str, key: &str, path: &str) -> bool {
    !name.trim().is_empty() || !key.trim().is_empty() || !path.trim().is_empty()
}

pub fn normalize_ingest_input(
    mut input: IngestMemoryInput,
    config: &MemexConfig,
    now_ts: i64,
) -> Result<IngestMemoryInput> {
    input.owner_id = resolve_owner_id(&input.owner_id, config)?;

    let (key, name) =
        resolve_project_identity(&input.project_name, &input.project_key, &input.project_path)?;
    input.project_key = key;
    input.project_name = name;
    input.machine_name = input.machine_name.trim().to_string();
    input.project_path = input.project_path.trim().to_string();
    input.summary = input.summary.trim().to_string();
    if let Some(tags) = &input.tags {
        if !tags.is_empty() {
            input.tags = Some(normalize_tags(tags));
        }
    }
    input.axes = input.axes.as_ref().and_then(normalize_axes);
    input.index_path = input.index_path.as_ref().map(|p| normalize_index_path(p));

    if input.ts <= 0 {
        input.ts = now_ts;
    }
    Ok(input)
}

pub fn normalize_search_input(
    mut input: SearchInput,
    config: &MemexConfig,
) -> Result<SearchInput> {
    input.owner_id = resolve_owner_id(&input.owner_id, config)?;
    input.machine_name = input.machine_name.trim().to_string();
    input.project_path = input.project_path.trim().to_string();

    if has_project_selector(&input.project_name, &input.project_key, &input.project_path) {
        let (key, name) = resolve_project_identity(
            &input.project_name,
            &input.project_key,
            &input.project_path,
        )?;
        input.project_key = key;
        input.project_name = name;
    }

    input.query = input.query.trim().to_string();
    input.scope = input.scope.trim().to_string();
    if input.scope.is_empty() {
        input.scope = "all".into();
    }
    input.axes = input.axes.as_ref().and_then(normalize_axes);
    input.index_path = input.index_path.as_ref().map(|p| normalize_index_path(p));
    if input.limit <= 0 {
        input.limit = DEFAULT_SEARCH_LIMIT;
    }
    Ok(input)
}

pub fn normalize_timeline_input(
    mut input: TimelineInput,
    config: &MemexConfig,
) -> Result<TimelineInput> {
    input.owner_id = resolve_owner_id(&input.owner_id, config)?;
    input.machine_name = input.machine_name.trim().to_string();
    input.project_path = input.project_path.trim().to_string();

    if has_project_selector(&input.project_name, &input.project_key, &input.project_path) {
        let (key, name) = resolve_project_identity(
            &input.project_name,
            &input.project_key,
            &input.project_path,
        )?;
        input.project_key = key;
        input.project_name = name;
    }

    if input.days <= 0 {
        input.days = DEFAULT_TIMELINE_DAYS;
    }
    if input.limit <= 0 {
        input.limit = DEFAULT_TIMELINE_LIMIT;
    }
    Ok(input)
}

pub fn normalize_list_projects_input(
    mut input: ListProjectsInput,
    config: &MemexConfig,
) -> Result<ListProjectsInput> {
    input.owner_id = resolve_owner_id(&input.owner_id, config)?;
    if input.limit <= 0 {
        input.limit = DEFAULT_LIST_PROJECTS_LIMIT;
    }
    Ok(input)
}

pub fn normalize_index_input(mut input: IndexInput, config: &MemexConfig) -> Result<IndexInput> {
    input.owner_id = resolve_owner_id(&input.owner_id, config)?;
    input.machine_name = input.machine_name.trim().to_string();
    input.project_path = input.project_path.trim().to_string();

    if has_project_selector(&input.project_name, &input.project_key, &input.project_path) {
        let (key, name) = resolve_project_identity(
            &input.project_name,
            &input.project_key,
            &input.project_path,
        )?;
        input.project_key = key;
        input.project_name = name;
    }
    input.index_path = input.index_path.as_ref().map(|p| normalize_index_path(p));

    if input.limit <= 0 {
        input.limit = DEFAULT_INDEX_LIMIT;
    }
    if input.path_tree_depth < 0 {
        input.path_tree_depth = 0;
    }
    if input.path_tree_width < 0 {
        input.path_tree_width = 0;
    }
    Ok(input)
}

pub fn normalize_arbitration_history_input(
    mut input: ArbitrationHistoryInput,
    config: &MemexConfig,
) -> Result<ArbitrationHistoryInput> {
    input.owner_id = resolve_owner_id(&input.owner_id, config)?;
    input.memory_id = input.memory_id.trim().to_string();
    input.project_key = input.project_key.trim().to_string();
    if input.limit <= 0 {
        input.limit = 20;
    }
    if input.limit > 100 {
        input.limit = 100;
    }
    Ok(input)
}
