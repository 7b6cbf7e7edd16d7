//! DDL for all memex tables.
//!
//! Bootstrap is idempotent: `CREATE TABLE IF NOT EXISTS` everywhere, guarded
//! `ALTER TABLE ... ADD COLUMN` for columns older deployments may lack, and
//! `CREATE INDEX IF NOT EXISTS` for the full index set. `reset` drops and
//! recreates from scratch.

use anyhow::{Context, Result};
use sqlx::PgPool;

fn core_tables(dimension: usize) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS projects (
  id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
  owner_id TEXT NOT NULL,
  project_key TEXT NOT NULL,
  project_name TEXT NOT NULL,
  machine_name TEXT,
  project_path TEXT,
  created_at TIMESTAMPTZ DEFAULT NOW(),
  updated_at TIMESTAMPTZ DEFAULT NOW(),
  UNIQUE(owner_id, project_key)
);

CREATE TABLE IF NOT EXISTS memories (
  id TEXT PRIMARY KEY,
  project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  content_type TEXT NOT NULL,
  content TEXT NOT NULL,
  content_hash TEXT,
  ts BIGINT NOT NULL,
  created_at TIMESTAMPTZ DEFAULT NOW(),
  updated_at TIMESTAMPTZ DEFAULT NOW(),
  summary TEXT,
  tags JSONB,
  axes JSONB,
  index_path JSONB,
  chunk_count INT DEFAULT 1,
  embedding_done BOOLEAN DEFAULT false,
  avg_embedding VECTOR({dimension})
);

CREATE TABLE IF NOT EXISTS fragments (
  id TEXT PRIMARY KEY,
  memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
  chunk_index INT NOT NULL,
  content TEXT NOT NULL,
  embedding VECTOR({dimension}),
  ts TIMESTAMPTZ DEFAULT NOW(),
  UNIQUE(memory_id, chunk_index)
);

CREATE TABLE IF NOT EXISTS memory_versions (
  id BIGSERIAL PRIMARY KEY,
  memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
  project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  content_type TEXT NOT NULL,
  content TEXT NOT NULL,
  content_hash TEXT,
  ts BIGINT NOT NULL,
  summary TEXT,
  tags JSONB,
  axes JSONB,
  index_path JSONB,
  chunk_count INT DEFAULT 1,
  avg_embedding VECTOR({dimension}),
  created_at TIMESTAMPTZ,
  replaced_at TIMESTAMPTZ DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS memory_arbitrations (
  id BIGSERIAL PRIMARY KEY,
  owner_id TEXT NOT NULL,
  project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  candidate_memory_id TEXT,
  new_memory_id TEXT,
  action TEXT NOT NULL,
  similarity DOUBLE PRECISION,
  old_summary TEXT,
  new_summary TEXT,
  model TEXT,
  created_at TIMESTAMPTZ DEFAULT NOW()
);
"#
    )
}

/// Column adds for tables created by earlier releases. Each statement checks
/// `information_schema` first so reruns are no-ops.
fn column_migrations(dimension: usize) -> Vec<String> {
    let guarded = |table: &str, column: &str, ddl: &str| {
        format!(
            r#"DO $$ BEGIN
    IF NOT EXISTS (SELECT 1 FROM information_schema.columns WHERE table_name='{table}' AND column_name='{column}') THEN
        ALTER TABLE {table} ADD COLUMN {ddl};
    END IF;
END $$"#
        )
    };
    vec![
        guarded("memories", "summary", "summary TEXT"),
        guarded("memories", "tags", "tags JSONB"),
        guarded("memories", "axes", "axes JSONB"),
        guarded("memories", "index_path", "index_path JSONB"),
        guarded("memories", "updated_at", "updated_at TIMESTAMPTZ DEFAULT NOW()"),
        guarded(
            "memories",
            "avg_embedding",
            &format!("avg_embedding VECTOR({dimension})"),
        ),
        guarded("memory_versions", "axes", "axes JSONB"),
        guarded("memory_versions", "index_path", "index_path JSONB"),
    ]
}

const INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_owner_key ON projects(owner_id, project_key)",
    "CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id)",
    "CREATE INDEX IF NOT EXISTS idx_memories_project ON memories(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(content_type)",
    "CREATE INDEX IF NOT EXISTS idx_memories_ts ON memories(ts DESC)",
    "CREATE INDEX IF NOT EXISTS idx_memories_hash ON memories(content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at DESC)",
    // one row per (project, content); concurrent identical ingests collapse here
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_memories_project_hash ON memories(project_id, content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_memories_avg_embedding ON memories USING hnsw (avg_embedding vector_cosine_ops)",
    "CREATE INDEX IF NOT EXISTS idx_fragments_memory ON fragments(memory_id)",
    "CREATE INDEX IF NOT EXISTS idx_fragments_embedding ON fragments USING hnsw (embedding vector_cosine_ops)",
    "CREATE INDEX IF NOT EXISTS idx_fragments_fts ON fragments USING GIN (to_tsvector('simple', content))",
    "CREATE INDEX IF NOT EXISTS idx_memories_path_0 ON memories ((index_path->>0))",
    "CREATE INDEX IF NOT EXISTS idx_memories_path_1 ON memories ((index_path->>1))",
    "CREATE INDEX IF NOT EXISTS idx_memories_path_2 ON memories ((index_path->>2))",
    "CREATE INDEX IF NOT EXISTS idx_memory_versions_memory ON memory_versions(memory_id)",
    "CREATE INDEX IF NOT EXISTS idx_memory_versions_project ON memory_versions(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_memory_arbitrations_project ON memory_arbitrations(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_memory_arbitrations_owner ON memory_arbitrations(owner_id)",
];

const RESET_SQL: &str = r#"
DROP TABLE IF EXISTS memory_arbitrations CASCADE;
DROP TABLE IF EXISTS memory_versions CASCADE;
DROP TABLE IF EXISTS fragments CASCADE;
DROP TABLE IF EXISTS memories CASCADE;
DROP TABLE IF EXISTS projects CASCADE;
"#;

/// Initialize extensions, tables, defensive column adds, and indexes.
pub async fn ensure_schema(pool: &PgPool, dimension: usize, reset: bool) -> Result<()> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await
        .context("pgvector extension unavailable")?;
    sqlx::query("CREATE EXTENSION IF NOT EXISTS pgcrypto")
        .execute(pool)
        .await
        .context("pgcrypto extension unavailable")?;

    if reset {
        sqlx::raw_sql(RESET_SQL)
            .execute(pool)
            .await
            .context("failed to drop tables")?;
    }

    sqlx::raw_sql(&core_tables(dimension))
        .execute(pool)
        .await
        .context("failed to create tables")?;

    for stmt in column_migrations(dimension) {
        sqlx::query(&stmt)
            .execute(pool)
            .await
            .context("column migration failed")?;
    }

    for stmt in INDEXES {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .with_context(|| format!("failed to create index: {stmt}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_mentions_every_table() {
        let ddl = core_tables(1536);
        for table in [
            "projects",
            "memories",
            "fragments",
            "memory_versions",
            "memory_arbitrations",
        ] {
            assert!(ddl.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")));
        }
        assert!(ddl.contains("VECTOR(1536)"));
        assert!(ddl.contains("UNIQUE(memory_id, chunk_index)"));
        assert!(ddl.contains("UNIQUE(owner_id, project_key)"));
    }

    #[test]
    fn migrations_are_guarded() {
        for stmt in column_migrations(64) {
            assert!(stmt.contains("IF NOT EXISTS"));
        }
    }

    #[test]
    fn index_set_covers_contract() {
        let joined = INDEXES.join("\n");
        assert!(joined.contains("uq_memories_project_hash"));
        assert!(joined.contains("hnsw (avg_embedding vector_cosine_ops)"));
        assert!(joined.contains("hnsw (embedding vector_cosine_ops)"));
        assert!(joined.contains("GIN (to_tsvector('simple', content))"));
    }
}
