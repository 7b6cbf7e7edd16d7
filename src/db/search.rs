//! Fragment sub-searches (vector kNN, substring, FTS) and the memory-level
//! vector shortlist used by conflict detection.
//!
//! All three sub-searches share the same join shape (fragment → memory →
//! project) and the same optional filters: content-type scope, axes
//! containment, and index-path prefix.

use anyhow::Result;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{decode_axes, decode_index_path, Store};
use crate::memory::types::MemoryAxes;

/// Which slice of the corpus a search runs against.
#[derive(Debug, Clone)]
pub enum SearchTarget<'a> {
    Project(Uuid),
    Owner(&'a str),
}

/// Filters applied inside every sub-search query.
#[derive(Debug, Clone, Default)]
pub struct FragmentFilters<'a> {
    /// `all` (or empty) disables the content-type filter.
    pub scope: &'a str,
    pub axes: Option<&'a MemoryAxes>,
    pub index_path: &'a [String],
}

/// One fragment hit joined to its memory and project.
#[derive(Debug, Clone)]
pub struct FragmentRow {
    pub fragment_id: String,
    pub memory_id: String,
    pub chunk_index: i32,
    pub content: String,
    pub content_type: String,
    pub project_key: String,
    pub ts: i64,
    pub chunk_count: i32,
    pub axes: Option<MemoryAxes>,
    pub index_path: Vec<String>,
    /// Cosine distance (vector sub-search only).
    pub distance: f64,
    /// Raw FTS rank on fetch; overwritten with the fused RRF score.
    pub rank_score: f64,
}

#[derive(Debug, Clone)]
pub struct MemoryVectorRow {
    pub id: String,
    pub content_type: String,
    pub distance: f64,
}

enum Bind {
    Text(String),
    TextArray(Vec<String>),
}

const FRAGMENT_SELECT: &str = r#"
SELECT f.id AS fragment_id, f.memory_id, f.chunk_index, f.content,
       m.content_type, m.ts, m.chunk_count, m.axes, m.index_path,
       p.project_key"#;

const FRAGMENT_JOIN: &str = r#"
FROM fragments f
JOIN memories m ON f.memory_id = m.id
JOIN projects p ON m.project_id = p.id"#;

fn push_target(sql: &mut String, param: &mut usize, target: &SearchTarget<'_>) {
    match target {
        SearchTarget::Project(_) => sql.push_str(&format!("\nWHERE m.project_id = ${param}")),
        SearchTarget::Owner(_) => sql.push_str(&format!("\nWHERE p.owner_id = ${param}")),
    }
    *param += 1;
}

/// Append scope/axes/index-path conditions and queue their bind values.
fn push_filters(
    sql: &mut String,
    binds: &mut Vec<Bind>,
    param: &mut usize,
    filters: &FragmentFilters<'_>,
) {
    if !filters.scope.is_empty() && filters.scope != "all" {
        sql.push_str(&format!(" AND m.content_type = ${param}"));
        binds.push(Bind::Text(filters.scope.to_string()));
        *param += 1;
    }
    if let Some(axes) = filters.axes {
        for axis in MemoryAxes::AXIS_NAMES {
            let values = axes.values(axis);
            if values.is_empty() {
                continue;
            }
            // match when the memory's axis array holds any requested value
            sql.push_str(&format!(" AND m.axes->'{axis}' ?| ${param}"));
            binds.push(Bind::TextArray(values.to_vec()));
            *param += 1;
        }
    }
    for (depth, segment) in filters.index_path.iter().enumerate() {
        sql.push_str(&format!(" AND m.index_path->>{depth} = ${param}"));
        binds.push(Bind::Text(segment.clone()));
        *param += 1;
    }
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    binds: &'q [Bind],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for bind in binds {
        query = match bind {
            Bind::Text(value) => query.bind(value),
            Bind::TextArray(values) => query.bind(values),
        };
    }
    query
}

fn scan_fragment_row(row: &PgRow, distance: f64, rank_score: f64) -> Result<FragmentRow> {
    Ok(FragmentRow {
        fragment_id: row.try_get("fragment_id")?,
        memory_id: row.try_get("memory_id")?,
        chunk_index: row.try_get("chunk_index")?,
        content: row.try_get("content")?,
        content_type: row.try_get("content_type")?,
        project_key: row.try_get("project_key")?,
        ts: row.try_get("ts")?,
        chunk_count: row.try_get("chunk_count")?,
        axes: decode_axes(row.try_get("axes")?),
        index_path: decode_index_path(row.try_get("index_path")?),
        distance,
        rank_score,
    })
}

impl Store {
    /// Memory-level kNN over `avg_embedding`, project-scoped, for the
    /// semantic-conflict shortlist.
    pub async fn search_memory_vectors(
        &self,
        vector: &[f32],
        project_id: Uuid,
        limit: i64,
    ) -> Result<Vec<MemoryVectorRow>> {
        let rows = sqlx::query(
            r#"
SELECT id, content_type, (avg_embedding <=> $1) AS distance
FROM memories
WHERE project_id = $2 AND avg_embedding IS NOT NULL
ORDER BY avg_embedding <=> $1
LIMIT $3"#,
        )
        .bind(Vector::from(vector.to_vec()))
        .bind(project_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(MemoryVectorRow {
                    id: row.try_get("id")?,
                    content_type: row.try_get("content_type")?,
                    distance: row.try_get("distance")?,
                })
            })
            .collect()
    }

    /// Cosine kNN over fragment embeddings.
    pub async fn search_vector_fragments(
        &self,
        vector: &[f32],
        target: &SearchTarget<'_>,
        filters: &FragmentFilters<'_>,
        limit: i64,
    ) -> Result<Vec<FragmentRow>> {
        let mut sql = format!(
            "{FRAGMENT_SELECT}, (f.embedding <=> $1) AS distance{FRAGMENT_JOIN}"
        );
        let mut param = 2;
        push_target(&mut sql, &mut param, target);
        let mut binds = Vec::new();
        push_filters(&mut sql, &mut binds, &mut param, filters);
        sql.push_str(&format!("\nORDER BY f.embedding <=> $1 LIMIT ${param}"));

        let mut query = sqlx::query(&sql).bind(Vector::from(vector.to_vec()));
        query = match target {
            SearchTarget::Project(id) => query.bind(*id),
            SearchTarget::Owner(owner) => query.bind(*owner),
        };
        query = bind_all(query, &binds);
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let distance: f64 = row.try_get("distance")?;
                scan_fragment_row(row, distance, 0.0)
            })
            .collect()
    }

    /// Case-insensitive substring search over fragment content, newest first.
    pub async fn search_keyword_fragments(
        &self,
        keyword: &str,
        target: &SearchTarget<'_>,
        filters: &FragmentFilters<'_>,
        limit: i64,
    ) -> Result<Vec<FragmentRow>> {
        let mut sql = format!("{FRAGMENT_SELECT}{FRAGMENT_JOIN}");
        let mut param = 1;
        push_target(&mut sql, &mut param, target);
        sql.push_str(&format!(" AND f.content ILIKE ${param}"));
        param += 1;
        let mut binds = Vec::new();
        push_filters(&mut sql, &mut binds, &mut param, filters);
        sql.push_str(&format!("\nORDER BY m.ts DESC LIMIT ${param}"));

        let mut query = sqlx::query(&sql);
        query = match target {
            SearchTarget::Project(id) => query.bind(*id),
            SearchTarget::Owner(owner) => query.bind(*owner),
        };
        let pattern = format!("%{}%", escape_like(keyword));
        query = query.bind(pattern);
        query = bind_all(query, &binds);
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|row| scan_fragment_row(row, 0.0, 0.0)).collect()
    }

    /// Full-text search (`simple` configuration) ranked by `ts_rank_cd`.
    pub async fn search_fts_fragments(
        &self,
        keyword: &str,
        target: &SearchTarget<'_>,
        filters: &FragmentFilters<'_>,
        limit: i64,
    ) -> Result<Vec<FragmentRow>> {
        let mut sql = format!("{FRAGMENT_SELECT}, ts_rank_cd(to_tsvector('simple', f.content), plainto_tsquery('simple', $1)) AS rank{FRAGMENT_JOIN}");
        let mut param = 2;
        push_target(&mut sql, &mut param, target);
        sql.push_str(
            " AND to_tsvector('simple', f.content) @@ plainto_tsquery('simple', $1)",
        );
        let mut binds = Vec::new();
        push_filters(&mut sql, &mut binds, &mut param, filters);
        sql.push_str(&format!("\nORDER BY rank DESC LIMIT ${param}"));

        let mut query = sqlx::query(&sql).bind(keyword);
        query = match target {
            SearchTarget::Project(id) => query.bind(*id),
            SearchTarget::Owner(owner) => query.bind(*owner),
        };
        query = bind_all(query, &binds);
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let rank: f32 = row.try_get("rank")?;
                scan_fragment_row(row, 0.0, rank as f64)
            })
            .collect()
    }
}

/// Escape LIKE wildcards in user-supplied keywords.
fn escape_like(keyword: &str) -> String {
    keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
