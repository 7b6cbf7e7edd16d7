//! Core domain types — content taxonomy, axes, and the request/response
//! shapes shared by the tool and HTTP surfaces.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The five content types of the memory taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// PRDs, feature descriptions, business rules.
    Requirement,
    /// Task lists, milestones, execution steps.
    Plan,
    /// Architecture, API definitions, implementation notes.
    Development,
    /// Test plans, cases, acceptance reports.
    Testing,
    /// Lessons learned, best practices, gotchas.
    Insight,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requirement => "requirement",
            Self::Plan => "plan",
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Insight => "insight",
        }
    }

    pub const ALL: [&'static str; 5] =
        ["requirement", "plan", "development", "testing", "insight"];

    pub fn is_valid(value: &str) -> bool {
        Self::ALL.contains(&value)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "requirement" => Ok(Self::Requirement),
            "plan" => Ok(Self::Plan),
            "development" => Ok(Self::Development),
            "testing" => Ok(Self::Testing),
            "insight" => Ok(Self::Insight),
            _ => Err(format!("unknown content type: {s}")),
        }
    }
}

/// Five named keyword vectors supplementing free-form tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MemoryAxes {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub problem: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lifecycle: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component: Vec<String>,
}

impl MemoryAxes {
    pub const AXIS_NAMES: [&'static str; 5] =
        ["domain", "stack", "problem", "lifecycle", "component"];

    pub fn is_empty(&self) -> bool {
        self.domain.is_empty()
            && self.stack.is_empty()
            && self.problem.is_empty()
            && self.lifecycle.is_empty()
            && self.component.is_empty()
    }

    pub fn values(&self, axis: &str) -> &[String] {
        match axis {
            "domain" => &self.domain,
            "stack" => &self.stack,
            "problem" => &self.problem,
            "lifecycle" => &self.lifecycle,
            "component" => &self.component,
            _ => &[],
        }
    }

    pub fn values_mut(&mut self, axis: &str) -> Option<&mut Vec<String>> {
        match axis {
            "domain" => Some(&mut self.domain),
            "stack" => Some(&mut self.stack),
            "problem" => Some(&mut self.problem),
            "lifecycle" => Some(&mut self.lifecycle),
            "component" => Some(&mut self.component),
            _ => None,
        }
    }
}

/// How wide the search fans out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchProfile {
    Fast,
    Balanced,
    Deep,
}

impl SearchProfile {
    /// Multiplier applied to `limit` for the per-source candidate pool.
    pub fn initial_multiplier(&self) -> usize {
        match self {
            Self::Fast => 3,
            Self::Balanced => 5,
            Self::Deep => 8,
        }
    }

    /// Lenient parse with the service default (`deep`).
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "fast" => Self::Fast,
            "balanced" => Self::Balanced,
            _ => Self::Deep,
        }
    }

    pub fn is_valid(value: &str) -> bool {
        matches!(value, "" | "fast" | "balanced" | "deep")
    }
}

/// How much of each result to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Ids,
    Compact,
    Full,
}

impl SearchMode {
    /// Lenient parse with the service default (`compact`).
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "ids" => Self::Ids,
            "full" => Self::Full,
            _ => Self::Compact,
        }
    }

    pub fn is_valid(value: &str) -> bool {
        matches!(value, "" | "ids" | "compact" | "full")
    }
}

// ── Tool / HTTP inputs ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IngestMemoryInput {
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub project_key: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub project_path: String,
    pub content_type: String,
    pub content: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub skip_llm: bool,
    #[serde(default)]
    pub axes: Option<MemoryAxes>,
    #[serde(default)]
    pub index_path: Option<Vec<String>>,
    /// Unix seconds; defaults to now when missing or zero.
    #[serde(default)]
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMemoryOutput {
    pub id: String,
    /// One of `created`, `updated`, `duplicate`, `skipped`.
    pub status: String,
    pub ts: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchInput {
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub project_key: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub project_path: String,
    pub query: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub axes: Option<MemoryAxes>,
    #[serde(default)]
    pub index_path: Option<Vec<String>>,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchTrace {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub ranks: std::collections::BTreeMap<String, usize>,
    pub rrf_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axes: Option<MemoryAxes>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub index_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<SearchTrace>,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub score: f64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub ts: i64,
    #[serde(default)]
    pub chunk_index: i32,
    #[serde(default)]
    pub total_chunks: i32,
}

fn is_zero_f64(v: &f64) -> bool {
    *v == 0.0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub total: usize,
    pub returned: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub next_action: String,
}

impl SearchMetadata {
    pub fn counted(total: usize, returned: usize) -> Self {
        Self {
            total,
            returned,
            next_action: String::new(),
        }
    }

    pub fn with_next_action(total: usize, returned: usize) -> Self {
        Self {
            total,
            returned,
            next_action: "use_ids_to_call_mem_get".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub metadata: SearchMetadata,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            metadata: SearchMetadata::with_next_action(0, 0),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GetMemoriesInput {
    pub ids: Vec<String>,
    #[serde(default)]
    pub owner_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub content_type: String,
    pub summary: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axes: Option<MemoryAxes>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub index_path: Vec<String>,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMemoriesResponse {
    pub results: Vec<MemoryRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TimelineInput {
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub project_key: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub project_path: String,
    #[serde(default)]
    pub days: i64,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id: String,
    pub content_type: String,
    pub summary: String,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineResponse {
    pub results: Vec<TimelineItem>,
    pub metadata: SearchMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListProjectsInput {
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectListItem {
    pub owner_id: String,
    pub project_key: String,
    pub machine_name: String,
    pub project_path: String,
    pub project_name: String,
    pub memory_count: i64,
    pub latest_ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListProjectsResponse {
    pub results: Vec<ProjectListItem>,
    pub metadata: SearchMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IndexInput {
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub project_key: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub project_path: String,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub index_path: Option<Vec<String>>,
    #[serde(default)]
    pub path_tree_depth: i64,
    #[serde(default)]
    pub path_tree_width: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisCount {
    pub value: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexAxis {
    pub axis: String,
    pub values: Vec<AxisCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexPathCount {
    pub path: Vec<String>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexPathNode {
    pub name: String,
    pub count: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<IndexPathNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthCount {
    pub depth: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_memories: i64,
    pub axes_coverage: f64,
    pub index_path_coverage: f64,
    pub avg_path_depth: f64,
    pub max_path_depth: i64,
    pub branching_factor: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depth_distribution: Vec<DepthCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexResponse {
    pub axes: Vec<IndexAxis>,
    pub paths: Vec<IndexPathCount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_tree: Vec<IndexPathNode>,
    pub stats: IndexStats,
    pub metadata: SearchMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ArbitrationHistoryInput {
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub memory_id: String,
    #[serde(default)]
    pub project_key: String,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationRecord {
    pub id: i64,
    pub candidate_memory_id: String,
    pub new_memory_id: String,
    /// `REPLACE`, `KEEP_BOTH`, or `SKIP`.
    pub action: String,
    pub similarity: f64,
    pub old_summary: String,
    pub new_summary: String,
    pub model: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationHistoryResponse {
    pub results: Vec<ArbitrationRecord>,
    pub metadata: SearchMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MemoryChainInput {
    #[serde(default)]
    pub owner_id: String,
    pub memory_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryVersionItem {
    pub version_id: i64,
    pub summary: String,
    pub content_type: String,
    pub ts: i64,
    pub replaced_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryChainResponse {
    pub memory_id: String,
    pub current_summary: String,
    /// Historical versions, newest first.
    pub versions: Vec<MemoryVersionItem>,
    pub arbitrations: Vec<ArbitrationRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RollbackInput {
    #[serde(default)]
    pub owner_id: String,
    pub arbitration_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackOutput {
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub restored_memory_id: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_round_trip() {
        for name in ContentType::ALL {
            let parsed: ContentType = name.parse().unwrap();
            assert_eq!(parsed.as_str(), name);
        }
        assert!("episodic".parse::<ContentType>().is_err());
    }

    #[test]
    fn profile_multipliers() {
        assert_eq!(SearchProfile::Fast.initial_multiplier(), 3);
        assert_eq!(SearchProfile::Balanced.initial_multiplier(), 5);
        assert_eq!(SearchProfile::Deep.initial_multiplier(), 8);
    }

    #[test]
    fn profile_defaults_to_deep() {
        assert_eq!(SearchProfile::parse_or_default(""), SearchProfile::Deep);
        assert_eq!(SearchProfile::parse_or_default("FAST"), SearchProfile::Fast);
        assert_eq!(SearchProfile::parse_or_default("bogus"), SearchProfile::Deep);
    }

    #[test]
    fn mode_defaults_to_compact() {
        assert_eq!(SearchMode::parse_or_default(""), SearchMode::Compact);
        assert_eq!(SearchMode::parse_or_default("ids"), SearchMode::Ids);
        assert_eq!(SearchMode::parse_or_default("Full"), SearchMode::Full);
    }

    #[test]
    fn axes_empty_check() {
        let mut axes = MemoryAxes::default();
        assert!(axes.is_empty());
        axes.stack.push("rust".into());
        assert!(!axes.is_empty());
        assert_eq!(axes.values("stack"), &["rust".to_string()]);
        assert!(axes.values("bogus").is_empty());
    }

    #[test]
    fn unknown_fields_rejected() {
        let raw = r#"{"owner_id":"personal","content_type":"plan","content":"x","bogus":1}"#;
        assert!(serde_json::from_str::<IngestMemoryInput>(raw).is_err());
    }
}
