//! Hybrid retrieval: parallel vector / substring / full-text sub-searches
//! fused by weighted Reciprocal Rank Fusion, deduplicated per memory, with
//! optional query expansion and an optional external reranker.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::app::AppState;
use crate::db::search::{FragmentFilters, FragmentRow, SearchTarget};
use crate::error::{Error, Result};
use crate::memory::normalize::{normalize_search_input, unique_strings};
use crate::memory::truncate_runes;
use crate::memory::types::{
    SearchInput, SearchMetadata, SearchMode, SearchProfile, SearchResponse, SearchResult,
    SearchTrace,
};
use crate::memory::validate::validate_search_input;

/// RRF rank constant.
const RRF_K: f64 = 60.0;
/// Vector hits carry less weight than lexical hits in the fusion.
const VECTOR_SOURCE_WEIGHT: f64 = 0.4;
const LEXICAL_SOURCE_WEIGHT: f64 = 1.0;
/// Minimum query length before expansion is worth a model call.
const EXPANSION_MIN_QUERY_RUNES: usize = 4;
/// Documents sent to the reranker are truncated to this many runes.
const RERANK_DOC_RUNES: usize = 2000;

/// One ranked list entering the fusion.
pub struct SourceList {
    pub name: String,
    pub weight: f64,
    pub rows: Vec<FragmentRow>,
}

/// A fragment after fusion; `row.rank_score` holds the fused score.
pub struct FusedRow {
    pub row: FragmentRow,
    pub trace: Option<SearchTrace>,
}

pub async fn search(state: &AppState, input: SearchInput) -> Result<SearchResponse> {
    let input = normalize_search_input(input, &state.config)?;
    validate_search_input(&input)?;

    let limit = input.limit as usize;
    let profile = SearchProfile::parse_or_default(input.profile.as_deref().unwrap_or(""));
    let mode = SearchMode::parse_or_default(input.mode.as_deref().unwrap_or(""));

    // A named project that does not exist is an empty result, not an error.
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
            None => return Ok(SearchResponse::empty()),
        }
    };
    let target = match project_id {
        Some(id) => SearchTarget::Project(id),
        None => SearchTarget::Owner(input.owner_id.as_str()),
    };

    let empty_path = Vec::new();
    let filters = FragmentFilters {
        scope: &input.scope,
        axes: input.axes.as_ref(),
        index_path: input.index_path.as_deref().unwrap_or(&empty_path),
    };

    let initial_limit = (limit * profile.initial_multiplier()) as i64;

    // Vector sub-search — skipped for the mock embedder, degraded on
    // provider failure, fatal only on storage failure.
    let mut vector_rows: Vec<FragmentRow> = Vec::new();
    if !state.embedder.is_mock() {
        match state.embedder.embed_query(&input.query).await {
            Ok(vector) => {
                vector_rows = state
                    .store
                    .search_vector_fragments(&vector, &target, &filters, initial_limit)
                    .await
                    .map_err(Error::Internal)?;
            }
            Err(err) => warn!(error = %err, "query embedding failed, skipping vector source"),
        }
    }

    let lexical_query = {
        let normalized = normalize_query(&input.query);
        if normalized.is_empty() {
            input.query.clone()
        } else {
            normalized
        }
    };

    let keyword_rows = state
        .store
        .search_keyword_fragments(&lexical_query, &target, &filters, initial_limit)
        .await
        .map_err(Error::Internal)?;
    let fts_rows = state
        .store
        .search_fts_fragments(&lexical_query, &target, &filters, initial_limit)
        .await
        .map_err(Error::Internal)?;

    // Guard against vector noise: once any lexical source has evidence, a
    // vector hit must contain every query token to stay in the pool.
    let had_lexical_hits = !keyword_rows.is_empty() || !fts_rows.is_empty();
    if had_lexical_hits {
        let tokens = query_tokens(&input.query);
        vector_rows = noise_guard(vector_rows, &tokens);
    }

    let mut sources: Vec<SourceList> = Vec::new();
    if !vector_rows.is_empty() {
        sources.push(SourceList {
            name: "vector".into(),
            weight: VECTOR_SOURCE_WEIGHT,
            rows: vector_rows,
        });
    }
    if !keyword_rows.is_empty() {
        sources.push(SourceList {
            name: "keyword".into(),
            weight: LEXICAL_SOURCE_WEIGHT,
            rows: keyword_rows,
        });
    }
    if !fts_rows.is_empty() {
        sources.push(SourceList {
            name: "bm25".into(),
            weight: LEXICAL_SOURCE_WEIGHT,
            rows: fts_rows,
        });
    }

    if should_expand(state, &input, profile, &sources, had_lexical_hits) {
        let synonyms = state
            .llm
            .expand_query(&input.query, state.config.query_expansion.max_keywords)
            .await;
        let synonyms = unique_strings(&synonyms);
        for synonym in synonyms {
            if synonym.is_empty() || synonym == lexical_query {
                continue;
            }
            let rows = state
                .store
                .search_keyword_fragments(&synonym, &target, &filters, initial_limit)
                .await
                .map_err(Error::Internal)?;
            if !rows.is_empty() {
                sources.push(SourceList {
                    name: format!("keyword:{synonym}"),
                    weight: LEXICAL_SOURCE_WEIGHT,
                    rows,
                });
            }
            let rows = state
                .store
                .search_fts_fragments(&synonym, &target, &filters, initial_limit)
                .await
                .map_err(Error::Internal)?;
            if !rows.is_empty() {
                sources.push(SourceList {
                    name: format!("bm25:{synonym}"),
                    weight: LEXICAL_SOURCE_WEIGHT,
                    rows,
                });
            }
        }
    }

    let source_count = sources.len();
    let fused = rrf_merge(sources, state.config.search.explain);
    if fused.is_empty() {
        return Ok(SearchResponse::empty());
    }

    let mut combined = dedupe_by_memory(fused, limit * 3);
    let total = combined.len();
    combined = maybe_rerank(state, &input.query, combined, limit, source_count).await;
    combined.truncate(limit);

    let results: Vec<SearchResult> = combined
        .into_iter()
        .map(|fused| shape_result(fused, mode))
        .collect();
    debug!(total, returned = results.len(), "search complete");

    Ok(SearchResponse {
        metadata: SearchMetadata::with_next_action(total, results.len()),
        results,
    })
}

/// Replace every non-alphanumeric rune with a space and collapse runs.
pub fn normalize_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut last_space = false;
    for c in query.chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim().to_string()
}

/// Lowercased query tokens of length >= 2.
pub fn query_tokens(query: &str) -> Vec<String> {
    normalize_query(query)
        .split_whitespace()
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Keep only vector rows whose content contains every query token.
pub fn noise_guard(rows: Vec<FragmentRow>, tokens: &[String]) -> Vec<FragmentRow> {
    if tokens.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            let content = row.content.to_lowercase();
            tokens.iter().all(|token| content.contains(token))
        })
        .collect()
}

fn should_expand(
    state: &AppState,
    input: &SearchInput,
    profile: SearchProfile,
    sources: &[SourceList],
    had_lexical_hits: bool,
) -> bool {
    if !state.config.query_expansion.enabled || state.llm.is_mock() {
        return false;
    }
    if profile == SearchProfile::Fast {
        return false;
    }
    let query_runes = input.query.chars().count();
    if query_runes < EXPANSION_MIN_QUERY_RUNES && profile != SearchProfile::Deep {
        return false;
    }
    let unique_memories: HashSet<&str> = sources
        .iter()
        .flat_map(|s| s.rows.iter().map(|r| r.memory_id.as_str()))
        .collect();
    unique_memories.len() < state.config.search.expansion_min_memories || !had_lexical_hits
}

/// Weighted Reciprocal Rank Fusion. Each source contributes
/// `weight / (k + rank)` per fragment; ties break by ts descending.
pub fn rrf_merge(sources: Vec<SourceList>, explain: bool) -> Vec<FusedRow> {
    let mut combined: HashMap<String, FusedRow> = HashMap::new();
    for source in sources {
        for (idx, row) in source.rows.into_iter().enumerate() {
            let rank = idx + 1;
            let score = source.weight / (RRF_K + rank as f64);
            let entry = combined
                .entry(row.fragment_id.clone())
                .or_insert_with(|| FusedRow {
                    row: FragmentRow {
                        rank_score: 0.0,
                        ..row
                    },
                    trace: if explain {
                        Some(SearchTrace {
                            sources: Vec::new(),
                            ranks: BTreeMap::new(),
                            rrf_score: 0.0,
                        })
                    } else {
                        None
                    },
                });
            entry.row.rank_score += score;
            if let Some(trace) = &mut entry.trace {
                trace.sources.push(source.name.clone());
                trace.ranks.insert(source.name.clone(), rank);
                trace.rrf_score = entry.row.rank_score;
            }
        }
    }

    let mut results: Vec<FusedRow> = combined.into_values().collect();
    results.sort_by(|a, b| {
        b.row
            .rank_score
            .partial_cmp(&a.row.rank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.row.ts.cmp(&a.row.ts))
    });
    results
}

/// Keep the highest-ranked fragment per memory, capped at `limit`.
pub fn dedupe_by_memory(rows: Vec<FusedRow>, limit: usize) -> Vec<FusedRow> {
    let limit = if limit == 0 { rows.len() } else { limit };
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for row in rows {
        if !seen.insert(row.row.memory_id.clone()) {
            continue;
        }
        result.push(row);
        if result.len() >= limit {
            break;
        }
    }
    result
}

async fn maybe_rerank(
    state: &AppState,
    query: &str,
    rows: Vec<FusedRow>,
    limit: usize,
    source_count: usize,
) -> Vec<FusedRow> {
    if !state.config.rerank.enabled
        || state.llm.is_mock()
        || rows.len() <= limit
        || source_count <= 1
    {
        return rows;
    }
    let top_n = if state.config.rerank.top_n == 0 {
        limit.max(10)
    } else {
        state.config.rerank.top_n
    }
    .min(rows.len());

    let docs: Vec<String> = rows
        .iter()
        .map(|r| truncate_runes(r.row.content.trim(), RERANK_DOC_RUNES))
        .collect();
    let entries = match state
        .llm
        .rerank(&state.config.rerank.model, query, &docs, top_n)
        .await
    {
        Ok(entries) if !entries.is_empty() => entries,
        Ok(_) => return rows,
        Err(err) => {
            // rerank is best-effort: keep the fused order
            warn!(error = %err, "rerank failed, keeping RRF order");
            return rows;
        }
    };

    let mut by_index: Vec<Option<FusedRow>> = rows.into_iter().map(Some).collect();
    let mut ordered = Vec::new();
    let mut seen = HashSet::new();
    for entry in entries {
        if entry.index >= by_index.len() || !seen.insert(entry.index) {
            continue;
        }
        if let Some(mut fused) = by_index[entry.index].take() {
            fused.row.rank_score = entry.relevance_score;
            ordered.push(fused);
        }
    }
    if ordered.is_empty() {
        return by_index.into_iter().flatten().collect();
    }
    ordered.sort_by(|a, b| {
        b.row
            .rank_score
            .partial_cmp(&a.row.rank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.row.ts.cmp(&a.row.ts))
    });
    ordered
}

/// First 200 runes of the trimmed content, with an ellipsis when truncated.
pub fn build_snippet(content: &str, limit: usize) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    format!("{}...", truncate_runes(trimmed, limit))
}

fn shape_result(fused: FusedRow, mode: SearchMode) -> SearchResult {
    let row = fused.row;
    match mode {
        SearchMode::Ids => SearchResult {
            id: row.memory_id,
            snippet: String::new(),
            content_type: String::new(),
            project_key: String::new(),
            axes: None,
            index_path: Vec::new(),
            trace: None,
            score: 0.0,
            ts: 0,
            chunk_index: 0,
            total_chunks: 0,
        },
        SearchMode::Compact => SearchResult {
            id: row.memory_id,
            snippet: String::new(),
            content_type: row.content_type,
            project_key: String::new(),
            axes: None,
            index_path: Vec::new(),
            trace: None,
            score: row.rank_score,
            ts: row.ts,
            chunk_index: row.chunk_index,
            total_chunks: row.chunk_count,
        },
        SearchMode::Full => SearchResult {
            id: row.memory_id,
            snippet: build_snippet(&row.content, 200),
            content_type: row.content_type,
            project_key: row.project_key,
            axes: row.axes,
            index_path: row.index_path,
            trace: fused.trace,
            score: row.rank_score,
            ts: row.ts,
            chunk_index: row.chunk_index,
            total_chunks: row.chunk_count,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(fragment_id: &str, memory_id: &str, ts: i64, content: &str) -> FragmentRow {
        FragmentRow {
            fragment_id: fragment_id.into(),
            memory_id: memory_id.into(),
            chunk_index: 0,
            content: content.into(),
            content_type: "development".into(),
            project_key: "p1".into(),
            ts,
            chunk_count: 1,
            axes: None,
            index_path: Vec::new(),
            distance: 0.0,
            rank_score: 0.0,
        }
    }

    fn source(name: &str, weight: f64, rows: Vec<FragmentRow>) -> SourceList {
        SourceList {
            name: name.into(),
            weight,
            rows,
        }
    }

    #[test]
    fn normalize_query_strips_punctuation() {
        assert_eq!(normalize_query("hello, world!"), "hello world");
        assert_eq!(normalize_query("PostgreSQL+pgvector"), "PostgreSQL pgvector");
        assert_eq!(normalize_query("???"), "");
    }

    #[test]
    fn query_tokens_filter_short() {
        assert_eq!(query_tokens("a MySQL DB"), vec!["mysql", "db"]);
        assert!(query_tokens("a b c").is_empty());
    }

    #[test]
    fn rrf_scores_shared_fragments_higher() {
        let sources = vec![
            source(
                "keyword",
                1.0,
                vec![
                    fragment("f1", "m1", 10, "x"),
                    fragment("f2", "m2", 20, "y"),
                ],
            ),
            source("bm25", 1.0, vec![fragment("f1", "m1", 10, "x")]),
        ];
        let fused = rrf_merge(sources, false);
        assert_eq!(fused[0].row.fragment_id, "f1");
        let expected = 1.0 / 61.0 + 1.0 / 61.0;
        assert!((fused[0].row.rank_score - expected).abs() < 1e-12);
    }

    #[test]
    fn rrf_vector_weight_is_lower() {
        let sources = vec![
            source("vector", VECTOR_SOURCE_WEIGHT, vec![fragment("f1", "m1", 10, "x")]),
            source("keyword", 1.0, vec![fragment("f2", "m2", 10, "y")]),
        ];
        let fused = rrf_merge(sources, false);
        assert_eq!(fused[0].row.fragment_id, "f2");
        assert!((fused[1].row.rank_score - 0.4 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn rrf_adding_a_source_never_decreases_scores() {
        let base = vec![source("keyword", 1.0, vec![fragment("f1", "m1", 10, "x")])];
        let before = rrf_merge(base, false)[0].row.rank_score;

        let extended = vec![
            source("keyword", 1.0, vec![fragment("f1", "m1", 10, "x")]),
            source("bm25", 1.0, vec![fragment("f1", "m1", 10, "x")]),
        ];
        let after = rrf_merge(extended, false)[0].row.rank_score;
        assert!(after >= before);
    }

    #[test]
    fn rrf_ties_break_by_ts_desc() {
        // equal scores: both fragments sit at rank 1 of a weight-1.0 source
        let sources = vec![
            source("keyword", 1.0, vec![fragment("f1", "m1", 10, "x")]),
            source("bm25", 1.0, vec![fragment("f2", "m2", 99, "y")]),
        ];
        let fused = rrf_merge(sources, false);
        assert_eq!(fused[0].row.fragment_id, "f2");
    }

    #[test]
    fn rrf_trace_records_sources_and_ranks() {
        let sources = vec![
            source("keyword", 1.0, vec![fragment("f1", "m1", 10, "x")]),
            source("bm25", 1.0, vec![fragment("f1", "m1", 10, "x")]),
        ];
        let fused = rrf_merge(sources, true);
        let trace = fused[0].trace.as_ref().unwrap();
        assert_eq!(trace.sources.len(), 2);
        assert_eq!(trace.ranks["keyword"], 1);
        assert!((trace.rrf_score - fused[0].row.rank_score).abs() < 1e-12);
    }

    #[test]
    fn dedupe_keeps_first_fragment_per_memory() {
        let fused = rrf_merge(
            vec![source(
                "keyword",
                1.0,
                vec![
                    fragment("f1", "m1", 10, "x"),
                    fragment("f2", "m1", 10, "y"),
                    fragment("f3", "m2", 10, "z"),
                ],
            )],
            false,
        );
        let deduped = dedupe_by_memory(fused, 10);
        assert_eq!(deduped.len(), 2);
        let ids: HashSet<&str> = deduped.iter().map(|r| r.row.memory_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn dedupe_caps_at_limit() {
        let rows: Vec<FragmentRow> = (0..10)
            .map(|i| fragment(&format!("f{i}"), &format!("m{i}"), 10, "x"))
            .collect();
        let fused = rrf_merge(vec![source("keyword", 1.0, rows)], false);
        assert_eq!(dedupe_by_memory(fused, 3).len(), 3);
    }

    #[test]
    fn noise_guard_requires_all_tokens() {
        let rows = vec![
            fragment("f1", "m1", 10, "we picked MySQL for compatibility"),
            fragment("f2", "m2", 10, "completely unrelated"),
        ];
        let tokens = query_tokens("MySQL");
        let kept = noise_guard(rows, &tokens);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].fragment_id, "f1");
    }

    #[test]
    fn noise_guard_empty_tokens_is_noop() {
        let rows = vec![fragment("f1", "m1", 10, "anything")];
        assert_eq!(noise_guard(rows, &[]).len(), 1);
    }

    #[test]
    fn snippet_truncates_at_200_runes() {
        assert_eq!(build_snippet("short", 200), "short");
        let long = "记".repeat(250);
        let snippet = build_snippet(&long, 200);
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), 203);
    }

    #[test]
    fn shape_ids_mode_strips_everything() {
        let fused = FusedRow {
            row: fragment("f1", "m1", 10, "content"),
            trace: None,
        };
        let result = shape_result(fused, SearchMode::Ids);
        assert_eq!(result.id, "m1");
        assert!(result.snippet.is_empty());
        assert!(result.content_type.is_empty());
        assert_eq!(result.ts, 0);
    }

    #[test]
    fn shape_full_mode_carries_context() {
        let mut row = fragment("f1", "m1", 10, "content body");
        row.rank_score = 0.5;
        row.index_path = vec!["a".into()];
        let result = shape_result(FusedRow { row, trace: None }, SearchMode::Full);
        assert_eq!(result.snippet, "content body");
        assert_eq!(result.project_key, "p1");
        assert_eq!(result.index_path, vec!["a"]);
        assert_eq!(result.score, 0.5);
    }
}
