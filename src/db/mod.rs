//! PostgreSQL DAO — connection pool, write transactions, and row types.
//!
//! Sub-search queries live in [`search`], aggregation queries in [`index`],
//! DDL in [`schema`]. All JSONB columns (`tags`, `axes`, `index_path`) go
//! through the decode helpers at the bottom so missing/NULL values read as
//! empty.

pub mod index;
pub mod schema;
pub mod search;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::memory::normalize::normalize_tags;
use crate::memory::types::MemoryAxes;

/// Shared store handle. Cloning shares the pool.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: PgPool,
}

#[derive(Debug, Clone)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub project_key: String,
    pub project_name: String,
}

#[derive(Debug, Clone)]
pub struct MemoryRow {
    pub id: String,
    pub content_type: String,
    pub content: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub axes: Option<MemoryAxes>,
    pub index_path: Vec<String>,
    pub ts: i64,
}

#[derive(Debug, Clone)]
pub struct TimelineRecord {
    pub id: String,
    pub content_type: String,
    pub summary: String,
    pub ts: i64,
}

#[derive(Debug, Clone)]
pub struct MemorySummaryRow {
    pub id: String,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct ProjectListRow {
    pub owner_id: String,
    pub project_key: String,
    pub machine_name: String,
    pub project_path: String,
    pub project_name: String,
    pub memory_count: i64,
    pub latest_ts: i64,
}

/// Everything needed to insert or overwrite a memory row.
#[derive(Debug, Clone)]
pub struct MemoryInsert {
    pub id: String,
    pub project_id: Uuid,
    pub content_type: String,
    pub content: String,
    pub content_hash: String,
    pub ts: i64,
    pub summary: String,
    pub tags: Vec<String>,
    pub axes: Option<MemoryAxes>,
    pub index_path: Vec<String>,
    pub chunk_count: i32,
    pub embedding_done: bool,
    pub avg_embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct FragmentInsert {
    pub id: String,
    pub memory_id: String,
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ArbitrationInsert {
    pub owner_id: String,
    pub project_id: Uuid,
    pub candidate_memory_id: String,
    pub new_memory_id: String,
    pub action: String,
    pub similarity: f64,
    pub old_summary: String,
    pub new_summary: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ArbitrationRow {
    pub id: i64,
    pub candidate_memory_id: String,
    pub new_memory_id: String,
    pub action: String,
    pub similarity: f64,
    pub old_summary: String,
    pub new_summary: String,
    pub model: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct VersionRow {
    pub version_id: i64,
    pub summary: String,
    pub content_type: String,
    pub ts: i64,
    pub replaced_at: i64,
}

impl Store {
    /// Connect with a production-shaped pool: a warm floor, idle cleanup, and
    /// bounded connection age.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .context("failed to connect to database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self, dimension: usize, reset: bool) -> Result<()> {
        schema::ensure_schema(&self.pool, dimension, reset).await
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.context("failed to begin transaction")
    }

    // ── Projects ──────────────────────────────────────────────────────────────

    pub async fn upsert_project(
        &self,
        owner_id: &str,
        project_key: &str,
        project_name: &str,
        machine_name: &str,
        project_path: &str,
    ) -> Result<ProjectRecord> {
        let row = sqlx::query(
            r#"
INSERT INTO projects (owner_id, project_key, project_name, machine_name, project_path)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (owner_id, project_key)
DO UPDATE SET project_name = EXCLUDED.project_name,
              machine_name = CASE WHEN EXCLUDED.machine_name IS NULL THEN projects.machine_name ELSE EXCLUDED.machine_name END,
              project_path = CASE WHEN EXCLUDED.project_path IS NULL THEN projects.project_path ELSE EXCLUDED.project_path END,
              updated_at = NOW()
RETURNING id, owner_id, project_key, project_name"#,
        )
        .bind(owner_id)
        .bind(project_key)
        .bind(project_name)
        .bind(nullable(machine_name))
        .bind(nullable(project_path))
        .fetch_one(&self.pool)
        .await?;

        Ok(ProjectRecord {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            project_key: row.try_get("project_key")?,
            project_name: row.try_get("project_name")?,
        })
    }

    pub async fn find_project_id(
        &self,
        owner_id: &str,
        project_key: &str,
    ) -> Result<Option<Uuid>> {
        let row =
            sqlx::query("SELECT id FROM projects WHERE owner_id = $1 AND project_key = $2")
                .bind(owner_id)
                .bind(project_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("id")?),
            None => None,
        })
    }

    pub async fn list_projects(&self, owner_id: &str, limit: i64) -> Result<Vec<ProjectListRow>> {
        let rows = sqlx::query(
            r#"
SELECT p.owner_id,
       p.project_key,
       COALESCE(p.machine_name, '') AS machine_name,
       COALESCE(p.project_path, '') AS project_path,
       p.project_name,
       COUNT(m.id) AS memory_count,
       COALESCE(MAX(m.ts), 0) AS latest_ts
FROM projects p
LEFT JOIN memories m ON m.project_id = p.id
WHERE p.owner_id = $1
GROUP BY p.id
ORDER BY COALESCE(MAX(m.ts), 0) DESC
LIMIT $2"#,
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ProjectListRow {
                    owner_id: row.try_get("owner_id")?,
                    project_key: row.try_get("project_key")?,
                    machine_name: row.try_get("machine_name")?,
                    project_path: row.try_get("project_path")?,
                    project_name: row.try_get("project_name")?,
                    memory_count: row.try_get("memory_count")?,
                    latest_ts: row.try_get("latest_ts")?,
                })
            })
            .collect()
    }

    // ── Memories ──────────────────────────────────────────────────────────────

    pub async fn find_duplicate_memory(
        &self,
        project_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT id FROM memories WHERE project_id = $1 AND content_hash = $2 LIMIT 1",
        )
        .bind(project_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("id")?),
            None => None,
        })
    }

    pub async fn update_memory_timestamp(&self, memory_id: &str, ts: i64) -> Result<()> {
        sqlx::query("UPDATE memories SET ts = $2, updated_at = NOW() WHERE id = $1")
            .bind(memory_id)
            .bind(ts)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn fetch_memories(&self, ids: &[String]) -> Result<Vec<MemoryRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
SELECT id, content_type, content, COALESCE(summary, '') AS summary,
       tags, axes, index_path, ts
FROM memories
WHERE id = ANY($1)"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_memory).collect()
    }

    pub async fn fetch_memory_summary(&self, memory_id: &str) -> Result<Option<MemorySummaryRow>> {
        let row =
            sqlx::query("SELECT id, COALESCE(summary, '') AS summary FROM memories WHERE id = $1")
                .bind(memory_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match row {
            Some(row) => Some(MemorySummaryRow {
                id: row.try_get("id")?,
                summary: row.try_get("summary")?,
            }),
            None => None,
        })
    }

    pub async fn fetch_timeline(
        &self,
        project_id: Option<Uuid>,
        owner_id: &str,
        since_ts: i64,
        limit: i64,
    ) -> Result<Vec<TimelineRecord>> {
        let rows = match project_id {
            Some(project_id) => {
                sqlx::query(
                    r#"
SELECT id, content_type, COALESCE(summary, '') AS summary, ts
FROM memories
WHERE project_id = $1 AND ts >= $2
ORDER BY ts DESC
LIMIT $3"#,
                )
                .bind(project_id)
                .bind(since_ts)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
SELECT m.id, m.content_type, COALESCE(m.summary, '') AS summary, m.ts
FROM memories m
JOIN projects p ON m.project_id = p.id
WHERE p.owner_id = $1 AND m.ts >= $2
ORDER BY m.ts DESC
LIMIT $3"#,
                )
                .bind(owner_id)
                .bind(since_ts)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|row| {
                Ok(TimelineRecord {
                    id: row.try_get("id")?,
                    content_type: row.try_get("content_type")?,
                    summary: row.try_get("summary")?,
                    ts: row.try_get("ts")?,
                })
            })
            .collect()
    }

    // ── Transactional write path ──────────────────────────────────────────────

    pub async fn insert_memory_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        memory: &MemoryInsert,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
INSERT INTO memories (
  id, project_id, content_type, content, content_hash, ts,
  summary, tags, axes, index_path, chunk_count, embedding_done, avg_embedding
) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)"#,
        )
        .bind(&memory.id)
        .bind(memory.project_id)
        .bind(&memory.content_type)
        .bind(&memory.content)
        .bind(&memory.content_hash)
        .bind(memory.ts)
        .bind(nullable(&memory.summary))
        .bind(serde_json::json!(memory.tags))
        .bind(encode_axes(memory.axes.as_ref()))
        .bind(encode_index_path(&memory.index_path))
        .bind(memory.chunk_count)
        .bind(memory.embedding_done)
        .bind(encode_vector(&memory.avg_embedding))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn update_memory_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        memory: &MemoryInsert,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
UPDATE memories
SET content_type = $2,
    content = $3,
    content_hash = $4,
    ts = $5,
    summary = $6,
    tags = $7,
    axes = $8,
    index_path = $9,
    chunk_count = $10,
    embedding_done = $11,
    avg_embedding = $12,
    updated_at = NOW()
WHERE id = $1"#,
        )
        .bind(&memory.id)
        .bind(&memory.content_type)
        .bind(&memory.content)
        .bind(&memory.content_hash)
        .bind(memory.ts)
        .bind(nullable(&memory.summary))
        .bind(serde_json::json!(memory.tags))
        .bind(encode_axes(memory.axes.as_ref()))
        .bind(encode_index_path(&memory.index_path))
        .bind(memory.chunk_count)
        .bind(memory.embedding_done)
        .bind(encode_vector(&memory.avg_embedding))
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("target memory does not exist: {}", memory.id);
        }
        Ok(())
    }

    pub async fn delete_fragments_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        memory_id: &str,
    ) -> Result<()> {
        sqlx::query("DELETE FROM fragments WHERE memory_id = $1")
            .bind(memory_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn insert_fragments_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        fragments: &[FragmentInsert],
    ) -> Result<()> {
        for frag in fragments {
            sqlx::query(
                r#"
INSERT INTO fragments (id, memory_id, chunk_index, content, embedding)
VALUES ($1,$2,$3,$4,$5)"#,
            )
            .bind(&frag.id)
            .bind(&frag.memory_id)
            .bind(frag.chunk_index)
            .bind(&frag.content)
            .bind(Vector::from(frag.embedding.clone()))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Snapshot the current `memories` row into `memory_versions` before an
    /// overwrite.
    pub async fn insert_memory_version_from_memory_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        memory_id: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
INSERT INTO memory_versions (
  memory_id, project_id, content_type, content, content_hash, ts,
  summary, tags, axes, index_path, chunk_count, avg_embedding, created_at, replaced_at
)
SELECT id, project_id, content_type, content, content_hash, ts,
       summary, tags, axes, index_path, chunk_count, avg_embedding, created_at, NOW()
FROM memories
WHERE id = $1"#,
        )
        .bind(memory_id)
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("memory to version does not exist: {memory_id}");
        }
        Ok(())
    }

    pub async fn insert_arbitration_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        log: &ArbitrationInsert,
    ) -> Result<()> {
        sqlx::query(
            r#"
INSERT INTO memory_arbitrations (
  owner_id, project_id, candidate_memory_id, new_memory_id,
  action, similarity, old_summary, new_summary, model
) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)"#,
        )
        .bind(&log.owner_id)
        .bind(log.project_id)
        .bind(nullable(&log.candidate_memory_id))
        .bind(nullable(&log.new_memory_id))
        .bind(&log.action)
        .bind(log.similarity)
        .bind(nullable(&log.old_summary))
        .bind(nullable(&log.new_summary))
        .bind(nullable(&log.model))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Pool-side arbitration insert for decisions that never open a
    /// transaction (SKIP).
    pub async fn insert_arbitration(&self, log: &ArbitrationInsert) -> Result<()> {
        sqlx::query(
            r#"
INSERT INTO memory_arbitrations (
  owner_id, project_id, candidate_memory_id, new_memory_id,
  action, similarity, old_summary, new_summary, model
) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)"#,
        )
        .bind(&log.owner_id)
        .bind(log.project_id)
        .bind(nullable(&log.candidate_memory_id))
        .bind(nullable(&log.new_memory_id))
        .bind(&log.action)
        .bind(log.similarity)
        .bind(nullable(&log.old_summary))
        .bind(nullable(&log.new_summary))
        .bind(nullable(&log.model))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Arbitration history & versions ────────────────────────────────────────

    pub async fn fetch_arbitration_history(
        &self,
        owner_id: &str,
        memory_id: &str,
        project_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ArbitrationRow>> {
        let mut sql = String::from(
            r#"
SELECT id,
       COALESCE(candidate_memory_id, '') AS candidate_memory_id,
       COALESCE(new_memory_id, '') AS new_memory_id,
       action,
       COALESCE(similarity, 0) AS similarity,
       COALESCE(old_summary, '') AS old_summary,
       COALESCE(new_summary, '') AS new_summary,
       COALESCE(model, '') AS model,
       created_at
FROM memory_arbitrations
WHERE owner_id = $1"#,
        );
        let mut param = 2;
        if !memory_id.is_empty() {
            sql.push_str(&format!(
                " AND (candidate_memory_id = ${param} OR new_memory_id = ${param})"
            ));
            param += 1;
        }
        if project_id.is_some() {
            sql.push_str(&format!(" AND project_id = ${param}"));
            param += 1;
        }
        sql.push_str(&format!(" ORDER BY created_at DESC, id DESC LIMIT ${param}"));

        let mut query = sqlx::query(&sql).bind(owner_id);
        if !memory_id.is_empty() {
            query = query.bind(memory_id);
        }
        if let Some(project_id) = project_id {
            query = query.bind(project_id);
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_arbitration).collect()
    }

    pub async fn fetch_arbitration_by_id(&self, id: i64) -> Result<Option<ArbitrationRow>> {
        let row = sqlx::query(
            r#"
SELECT id,
       COALESCE(candidate_memory_id, '') AS candidate_memory_id,
       COALESCE(new_memory_id, '') AS new_memory_id,
       action,
       COALESCE(similarity, 0) AS similarity,
       COALESCE(old_summary, '') AS old_summary,
       COALESCE(new_summary, '') AS new_summary,
       COALESCE(model, '') AS model,
       created_at
FROM memory_arbitrations
WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_arbitration).transpose()
    }

    /// Historical versions of a memory, newest first.
    pub async fn fetch_memory_versions(&self, memory_id: &str) -> Result<Vec<VersionRow>> {
        let rows = sqlx::query(
            r#"
SELECT id, COALESCE(summary, '') AS summary, content_type, ts, replaced_at
FROM memory_versions
WHERE memory_id = $1
ORDER BY replaced_at DESC, id DESC"#,
        )
        .bind(memory_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let replaced_at: Option<DateTime<Utc>> = row.try_get("replaced_at")?;
                Ok(VersionRow {
                    version_id: row.try_get("id")?,
                    summary: row.try_get("summary")?,
                    content_type: row.try_get("content_type")?,
                    ts: row.try_get("ts")?,
                    replaced_at: replaced_at.map(|t| t.timestamp()).unwrap_or(0),
                })
            })
            .collect()
    }

    /// Copy the most recent snapshot of `memory_id` back over the live row.
    /// Returns false when no snapshot exists. Fragments are not touched.
    pub async fn restore_memory_from_latest_version(&self, memory_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
UPDATE memories m
SET content_type = v.content_type,
    content = v.content,
    content_hash = v.content_hash,
    ts = v.ts,
    summary = v.summary,
    tags = v.tags,
    axes = v.axes,
    index_path = v.index_path,
    chunk_count = v.chunk_count,
    avg_embedding = v.avg_embedding,
    updated_at = NOW()
FROM (
    SELECT *
    FROM memory_versions
    WHERE memory_id = $1
    ORDER BY replaced_at DESC, id DESC
    LIMIT 1
) v
WHERE m.id = v.memory_id"#,
        )
        .bind(memory_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ── Encode/decode helpers ─────────────────────────────────────────────────────

/// Empty strings become SQL NULL.
pub(crate) fn nullable(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

pub(crate) fn encode_vector(embedding: &[f32]) -> Option<Vector> {
    if embedding.is_empty() {
        None
    } else {
        Some(Vector::from(embedding.to_vec()))
    }
}

pub(crate) fn encode_axes(axes: Option<&MemoryAxes>) -> Option<serde_json::Value> {
    match axes {
        Some(axes) if !axes.is_empty() => serde_json::to_value(axes).ok(),
        _ => None,
    }
}

pub(crate) fn encode_index_path(path: &[String]) -> Option<serde_json::Value> {
    if path.is_empty() {
        None
    } else {
        Some(serde_json::json!(path))
    }
}

pub(crate) fn decode_tags(raw: Option<serde_json::Value>) -> Vec<String> {
    match raw {
        Some(value) => serde_json::from_value::<Vec<String>>(value)
            .map(|tags| normalize_tags(&tags))
            .unwrap_or_default(),
        None => Vec::new(),
    }
}

pub(crate) fn decode_axes(raw: Option<serde_json::Value>) -> Option<MemoryAxes> {
    let axes = serde_json::from_value::<MemoryAxes>(raw?).ok()?;
    if axes.is_empty() {
        None
    } else {
        Some(axes)
    }
}

pub(crate) fn decode_index_path(raw: Option<serde_json::Value>) -> Vec<String> {
    match raw {
        Some(value) => serde_json::from_value(value).unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Unique-violation check for the (project_id, content_hash) guard.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation))
        .unwrap_or(false)
}

fn row_to_memory(row: &PgRow) -> Result<MemoryRow> {
    Ok(MemoryRow {
        id: row.try_get("id")?,
        content_type: row.try_get("content_type")?,
        content: row.try_get("content")?,
        summary: row.try_get("summary")?,
        tags: decode_tags(row.try_get("tags")?),
        axes: decode_axes(row.try_get("axes")?),
        index_path: decode_index_path(row.try_get("index_path")?),
        ts: row.try_get("ts")?,
    })
}

fn row_to_arbitration(row: &PgRow) -> Result<ArbitrationRow> {
    let created_at: Option<DateTime<Utc>> = row.try_get("created_at")?;
    Ok(ArbitrationRow {
        id: row.try_get("id")?,
        candidate_memory_id: row.try_get("candidate_memory_id")?,
        new_memory_id: row.try_get("new_memory_id")?,
        action: row.try_get("action")?,
        similarity: row.try_get("similarity")?,
        old_summary: row.try_get("old_summary")?,
        new_summary: row.try_get("new_summary")?,
        model: row.try_get("model")?,
        created_at: created_at.map(|t| t.timestamp()).unwrap_or(0),
    })
}
