//! Request validation. Runs after normalization; every failure maps to a
//! stable `ERR_*` code and HTTP 400.

use crate::error::{Error, Result};
use crate::memory::types::{
    ArbitrationHistoryInput, ContentType, IndexInput, IngestMemoryInput, ListProjectsInput,
    MemoryAxes, SearchInput, SearchMode, SearchProfile, TimelineInput,
};

pub const MAX_CONTENT_BYTES: usize = 1024 * 1024;
pub const MAX_AXIS_VALUES: usize = 20;
pub const MAX_AXIS_VALUE_RUNES: usize = 100;
pub const MAX_INDEX_PATH_DEPTH: usize = 10;
pub const MAX_INDEX_PATH_SEGMENT_RUNES: usize = 100;
/// Millisecond timestamps would land beyond this; reject them.
pub const MAX_TS: i64 = 9_000_000_000_000;

fn contains_control(value: &str) -> bool {
    value.chars().any(|c| c.is_control())
}

fn has_meaningful_content(value: &str) -> bool {
    value.chars().any(|c| c.is_alphanumeric())
}

fn is_absolute_path(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with("\\\\") {
        return true;
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 3 {
        let drive = bytes[0] as char;
        if drive.is_ascii_alphabetic()
            && bytes[1] == b':'
            && (bytes[2] == b'\\' || bytes[2] == b'/')
        {
            return true;
        }
    }
    false
}

fn validate_owner_id(value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid("ERR_INVALID_OWNER", "owner_id is required"));
    }
    if trimmed.chars().count() > 255 {
        return Err(Error::invalid("ERR_INVALID_OWNER", "owner_id too long"));
    }
    if contains_control(trimmed) {
        return Err(Error::invalid(
            "ERR_INVALID_OWNER",
            "owner_id contains control characters",
        ));
    }
    Ok(())
}

fn validate_project_key(value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid(
            "ERR_INVALID_PROJECT",
            "project_key is required",
        ));
    }
    if trimmed.chars().count() > 1024 {
        return Err(Error::invalid("ERR_INVALID_PROJECT", "project_key too long"));
    }
    if trimmed.contains('\u{0}') || contains_control(trimmed) {
        return Err(Error::invalid(
            "ERR_INVALID_PROJECT",
            "project_key contains illegal characters",
        ));
    }
    Ok(())
}

fn validate_project_name(value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid(
            "ERR_INVALID_PROJECT_NAME",
            "project_name is required",
        ));
    }
    if trimmed.chars().count() > 255 {
        return Err(Error::invalid(
            "ERR_INVALID_PROJECT_NAME",
            "project_name too long",
        ));
    }
    if contains_control(trimmed) {
        return Err(Error::invalid(
            "ERR_INVALID_PROJECT_NAME",
            "project_name contains illegal characters",
        ));
    }
    Ok(())
}

fn validate_machine_name_optional(value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    if trimmed.chars().count() > 255 {
        return Err(Error::invalid("ERR_INVALID_MACHINE", "machine_name too long"));
    }
    if contains_control(trimmed) {
        return Err(Error::invalid(
            "ERR_INVALID_MACHINE",
            "machine_name contains illegal characters",
        ));
    }
    Ok(())
}

fn validate_project_path_optional(value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    if trimmed.chars().count() > 1024 {
        return Err(Error::invalid(
            "ERR_INVALID_PROJECT_PATH",
            "project_path too long",
        ));
    }
    if trimmed.contains('\u{0}') {
        return Err(Error::invalid(
            "ERR_INVALID_PROJECT_PATH",
            "project_path contains a NUL byte",
        ));
    }
    if !is_absolute_path(trimmed) {
        return Err(Error::invalid(
            "ERR_INVALID_PROJECT_PATH",
            "project_path must be absolute",
        ));
    }
    Ok(())
}

fn validate_timestamp(ts: i64, now_ts: i64) -> Result<()> {
    if ts <= 0 {
        return Err(Error::invalid("ERR_INVALID_TS", "ts must be positive"));
    }
    if ts > now_ts + 10 {
        return Err(Error::invalid("ERR_INVALID_TS", "ts is in the future"));
    }
    if ts >= MAX_TS {
        return Err(Error::invalid(
            "ERR_INVALID_TS",
            "ts out of range (unix seconds expected)",
        ));
    }
    Ok(())
}

fn validate_summary(summary: &str) -> Result<()> {
    if summary.trim().is_empty() {
        return Ok(());
    }
    if summary.chars().count() > 5000 {
        return Err(Error::invalid("ERR_INVALID_SUMMARY", "summary too long"));
    }
    if contains_control(summary) {
        return Err(Error::invalid(
            "ERR_INVALID_SUMMARY",
            "summary contains control characters",
        ));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.is_empty() {
        return Ok(());
    }
    if tags.len() > 50 {
        return Err(Error::invalid("ERR_INVALID_TAGS", "too many tags"));
    }
    for tag in tags {
        let item = tag.trim();
        if item.is_empty() {
            continue;
        }
        if item.chars().count() > 100 {
            return Err(Error::invalid("ERR_INVALID_TAGS", "tag too long"));
        }
        if contains_control(item) {
            return Err(Error::invalid(
                "ERR_INVALID_TAGS",
                "tag contains control characters",
            ));
        }
    }
    Ok(())
}

fn validate_axes(axes: Option<&MemoryAxes>) -> Result<()> {
    let Some(axes) = axes else { return Ok(()) };
    for axis in MemoryAxes::AXIS_NAMES {
        let values = axes.values(axis);
        if values.is_empty() {
            continue;
        }
        if values.len() > MAX_AXIS_VALUES {
            return Err(Error::invalid(
                "ERR_INVALID_AXES",
                format!("too many values for axis {axis}"),
            ));
        }
        for value in values {
            let item = value.trim();
            if item.is_empty() {
                continue;
            }
            if item.chars().count() > MAX_AXIS_VALUE_RUNES {
                return Err(Error::invalid(
                    "ERR_INVALID_AXES",
                    format!("axis {axis} value too long"),
                ));
            }
            if contains_control(item) {
                return Err(Error::invalid(
                    "ERR_INVALID_AXES",
                    format!("axis {axis} value contains control characters"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_index_path(path: Option<&Vec<String>>) -> Result<()> {
    let Some(path) = path else { return Ok(()) };
    if path.is_empty() {
        return Ok(());
    }
    if path.len() > MAX_INDEX_PATH_DEPTH {
        return Err(Error::invalid("ERR_INVALID_INDEX_PATH", "index_path too deep"));
    }
    for segment in path {
        let item = segment.trim();
        if item.is_empty() {
            continue;
        }
        if item.chars().count() > MAX_INDEX_PATH_SEGMENT_RUNES {
            return Err(Error::invalid(
                "ERR_INVALID_INDEX_PATH",
                "index_path segment too long",
            ));
        }
        if contains_control(item) {
            return Err(Error::invalid(
                "ERR_INVALID_INDEX_PATH",
                "index_path contains control characters",
            ));
        }
    }
    Ok(())
}

pub fn validate_ingest_input(input: &IngestMemoryInput, now_ts: i64) -> Result<()> {
    validate_owner_id(&input.owner_id)?;
    validate_project_key(&input.project_key)?;
    validate_project_name(&input.project_name)?;
    validate_machine_name_optional(&input.machine_name)?;
    validate_project_path_optional(&input.project_path)?;
    if !ContentType::is_valid(&input.content_type) {
        return Err(Error::invalid(
            "ERR_INVALID_CONTENT_TYPE",
            "content_type must be one of requirement/plan/development/testing/insight",
        ));
    }
    if input.content.trim().is_empty() {
        return Err(Error::invalid("ERR_INVALID_CONTENT", "content is required"));
    }
    if input.content.contains('\u{0}') {
        return Err(Error::invalid(
            "ERR_INVALID_CONTENT",
            "content contains a NUL byte",
        ));
    }
    if input.content.len() > MAX_CONTENT_BYTES {
        return Err(Error::invalid(
            "ERR_INVALID_CONTENT",
            "content exceeds the 1 MiB limit",
        ));
    }
    validate_timestamp(input.ts, now_ts)?;
    validate_summary(&input.summary)?;
    if let Some(tags) = &input.tags {
        validate_tags(tags)?;
    }
    validate_axes(input.axes.as_ref())?;
    validate_index_path(input.index_path.as_ref())?;
    Ok(())
}

pub fn validate_search_input(input: &SearchInput) -> Result<()> {
    validate_owner_id(&input.owner_id)?;
    if !input.project_key.is_empty() || !input.project_name.is_empty() {
        validate_project_key(&input.project_key)?;
        validate_project_name(&input.project_name)?;
    }
    validate_machine_name_optional(&input.machine_name)?;
    validate_project_path_optional(&input.project_path)?;

    let query = input.query.trim();
    if query.is_empty() {
        return Err(Error::invalid("ERR_INVALID_QUERY", "query is required"));
    }
    if !has_meaningful_content(query) {
        return Err(Error::invalid(
            "ERR_INVALID_QUERY",
            "query has no letters or digits",
        ));
    }
    let runes = query.chars().count();
    if runes < 2 {
        return Err(Error::invalid("ERR_INVALID_QUERY", "query too short"));
    }
    if runes > 1000 {
        return Err(Error::invalid("ERR_INVALID_QUERY", "query too long"));
    }

    if input.scope.is_empty() {
        return Err(Error::invalid("ERR_INVALID_SCOPE", "scope is required"));
    }
    if input.scope != "all" && !ContentType::is_valid(&input.scope) {
        return Err(Error::invalid("ERR_INVALID_SCOPE", "invalid scope"));
    }
    if let Some(profile) = &input.profile {
        if !SearchProfile::is_valid(profile) {
            return Err(Error::invalid("ERR_INVALID_PROFILE", "invalid profile"));
        }
    }
    if let Some(mode) = &input.mode {
        if !SearchMode::is_valid(mode) {
            return Err(Error::invalid("ERR_INVALID_MODE", "invalid mode"));
        }
    }
    if input.limit < 1 || input.limit > 100 {
        return Err(Error::invalid(
            "ERR_INVALID_LIMIT",
            "limit must be between 1 and 100",
        ));
    }
    validate_axes(input.axes.as_ref())?;
    validate_index_path(input.index_path.as_ref())?;
    Ok(())
}

pub fn validate_timeline_input(input: &TimelineInput) -> Result<()> {
    validate_owner_id(&input.owner_id)?;
    if !input.project_key.is_empty() || !input.project_name.is_empty() {
        validate_project_key(&input.project_key)?;
        validate_project_name(&input.project_name)?;
    }
    validate_machine_name_optional(&input.machine_name)?;
    validate_project_path_optional(&input.project_path)?;
    if input.days < 1 {
        return Err(Error::invalid("ERR_INVALID_DAYS", "days must be >= 1"));
    }
    if input.limit < 1 || input.limit > 100 {
        return Err(Error::invalid(
            "ERR_INVALID_LIMIT",
            "limit must be between 1 and 100",
        ));
    }
    Ok(())
}

pub fn validate_list_projects_input(input: &ListProjectsInput) -> Result<()> {
    validate_owner_id(&input.owner_id)?;
    if input.limit < 1 || input.limit > 1000 {
        return Err(Error::invalid(
            "ERR_INVALID_LIMIT",
            "limit must be between 1 and 1000",
        ));
    }
    Ok(())
}

pub fn validate_index_input(input: &IndexInput) -> Result<()> {
    validate_owner_id(&input.owner_id)?;
    if !input.project_key.is_empty() || !input.project_name.is_empty() {
        validate_project_key(&input.project_key)?;
        validate_project_name(&input.project_name)?;
    }
    validate_machine_name_optional(&input.machine_name)?;
    validate_project_path_optional(&input.project_path)?;
    validate_index_path(input.index_path.as_ref())?;
    if input.limit < 1 || input.limit > 200 {
        return Err(Error::invalid(
            "ERR_INVALID_LIMIT",
            "limit must be between 1 and 200",
        ));
    }
    if input.path_tree_depth < 0 || input.path_tree_depth > MAX_INDEX_PATH_DEPTH as i64 {
        return Err(Error::invalid(
            "ERR_INVALID_PATH_TREE_DEPTH",
            "path_tree_depth must be between 0 and 10",
        ));
    }
    if input.path_tree_width < 0 || input.path_tree_width > 100 {
        return Err(Error::invalid(
            "ERR_INVALID_PATH_TREE_WIDTH",
            "path_tree_width must be between 0 and 100",
        ));
    }
    Ok(())
}

pub fn validate_arbitration_history_input(input: &ArbitrationHistoryInput) -> Result<()> {
    validate_owner_id(&input.owner_id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000;

    fn valid_ingest() -> IngestMemoryInput {
        IngestMemoryInput {
            owner_id: "personal".into(),
            project_key: "test-project".into(),
            project_name: "test-project".into(),
            content_type: "development".into(),
            content: "hello".into(),
            ts: NOW,
            ..Default::default()
        }
    }

    fn valid_search() -> SearchInput {
        SearchInput {
            owner_id: "personal".into(),
            project_key: "p".into(),
            project_name: "p".into(),
            query: "test query".into(),
            scope: "all".into(),
            limit: 5,
            ..Default::default()
        }
    }

    #[test]
    fn accepts_valid_ingest() {
        assert!(validate_ingest_input(&valid_ingest(), NOW).is_ok());
    }

    #[test]
    fn rejects_bad_content_type() {
        let mut input = valid_ingest();
        input.content_type = "episodic".into();
        let err = validate_ingest_input(&input, NOW).unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_CONTENT_TYPE");
    }

    #[test]
    fn rejects_nul_in_content() {
        let mut input = valid_ingest();
        input.content = "abc\u{0}def".into();
        let err = validate_ingest_input(&input, NOW).unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_CONTENT");
    }

    #[test]
    fn rejects_oversized_content() {
        let mut input = valid_ingest();
        input.content = "a".repeat(MAX_CONTENT_BYTES + 1);
        assert!(validate_ingest_input(&input, NOW).is_err());
    }

    #[test]
    fn rejects_relative_project_path() {
        let mut input = valid_ingest();
        input.project_path = "relative/path".into();
        let err = validate_ingest_input(&input, NOW).unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_PROJECT_PATH");
    }

    #[test]
    fn accepts_windows_and_unc_paths() {
        let mut input = valid_ingest();
        input.project_path = "C:\\Users\\test\\project".into();
        assert!(validate_ingest_input(&input, NOW).is_ok());
        input.project_path = "\\\\share\\project".into();
        assert!(validate_ingest_input(&input, NOW).is_ok());
        input.project_path = "D:/work".into();
        assert!(validate_ingest_input(&input, NOW).is_ok());
    }

    #[test]
    fn rejects_future_and_millisecond_ts() {
        let mut input = valid_ingest();
        input.ts = NOW + 60;
        assert_eq!(
            validate_ingest_input(&input, NOW).unwrap_err().code(),
            "ERR_INVALID_TS"
        );
        input.ts = 9_000_000_000_001;
        assert!(validate_ingest_input(&input, NOW).is_err());
    }

    #[test]
    fn rejects_short_query() {
        let mut input = valid_search();
        input.query = "a".into();
        assert_eq!(
            validate_search_input(&input).unwrap_err().code(),
            "ERR_INVALID_QUERY"
        );
    }

    #[test]
    fn rejects_meaningless_query() {
        let mut input = valid_search();
        input.query = "???!!!".into();
        assert_eq!(
            validate_search_input(&input).unwrap_err().code(),
            "ERR_INVALID_QUERY"
        );
    }

    #[test]
    fn rejects_bad_scope_and_limit() {
        let mut input = valid_search();
        input.scope = "everything".into();
        assert_eq!(
            validate_search_input(&input).unwrap_err().code(),
            "ERR_INVALID_SCOPE"
        );

        let mut input = valid_search();
        input.limit = 101;
        assert_eq!(
            validate_search_input(&input).unwrap_err().code(),
            "ERR_INVALID_LIMIT"
        );
    }

    #[test]
    fn rejects_too_many_axis_values() {
        let mut input = valid_search();
        input.axes = Some(MemoryAxes {
            domain: (0..=MAX_AXIS_VALUES).map(|i| format!("v{i}")).collect(),
            ..Default::default()
        });
        assert_eq!(
            validate_search_input(&input).unwrap_err().code(),
            "ERR_INVALID_AXES"
        );
    }

    #[test]
    fn rejects_deep_index_path() {
        let mut input = valid_search();
        input.index_path = Some(
            (0..=MAX_INDEX_PATH_DEPTH)
                .map(|i| format!("node-{i}"))
                .collect(),
        );
        assert_eq!(
            validate_search_input(&input).unwrap_err().code(),
            "ERR_INVALID_INDEX_PATH"
        );
    }

    #[test]
    fn index_input_bounds() {
        let input = IndexInput {
            owner_id: "personal".into(),
            limit: 20,
            path_tree_depth: 11,
            ..Default::default()
        };
        assert_eq!(
            validate_index_input(&input).unwrap_err().code(),
            "ERR_INVALID_PATH_TREE_DEPTH"
        );
    }

    #[test]
    fn list_projects_limit_bounds() {
        let input = ListProjectsInput {
            owner_id: "personal".into(),
            limit: 1001,
        };
        assert!(validate_list_projects_input(&input).is_err());
    }
}
