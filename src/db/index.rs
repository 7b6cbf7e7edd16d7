//! Aggregation queries backing the index overview and metrics — tag/axis
//! value counts, distinct index paths, coverage counts, and the path depth
//! distribution.

use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use super::{decode_index_path, Store};
use crate::memory::types::{AxisCount, DepthCount, IndexPathCount};

/// Coverage counters for the stats block.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryCounts {
    pub total: i64,
    pub with_axes: i64,
    pub with_index_path: i64,
}

/// Scope + path-prefix filter shared by every aggregation query.
#[derive(Debug, Clone)]
pub struct AggregateScope<'a> {
    pub project_id: Option<Uuid>,
    pub owner_id: &'a str,
    pub path_prefix: &'a [String],
}

impl AggregateScope<'_> {
    /// Render the WHERE clause and remember which values to bind.
    /// Binding order: project-or-owner, then prefix segments.
    fn where_clause(&self, param: &mut usize) -> String {
        let mut sql = if self.project_id.is_some() {
            let clause = format!("WHERE m.project_id = ${param}");
            *param += 1;
            clause
        } else {
            let clause = format!("WHERE p.owner_id = ${param}");
            *param += 1;
            clause
        };
        for depth in 0..self.path_prefix.len() {
            sql.push_str(&format!(" AND m.index_path->>{depth} = ${param}"));
            *param += 1;
        }
        sql
    }

    fn bind<'q>(
        &'q self,
        mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        query = match self.project_id {
            Some(project_id) => query.bind(project_id),
            None => query.bind(self.owner_id),
        };
        for segment in self.path_prefix {
            query = query.bind(segment);
        }
        query
    }
}

impl Store {
    /// Count memories per tag value, most used first.
    pub async fn fetch_tag_counts(
        &self,
        scope: &AggregateScope<'_>,
        limit: i64,
    ) -> Result<Vec<AxisCount>> {
        let mut param = 1;
        let where_clause = scope.where_clause(&mut param);
        let sql = format!(
            r#"
SELECT t.value AS value, COUNT(DISTINCT m.id) AS count
FROM memories m
JOIN projects p ON m.project_id = p.id,
     jsonb_array_elements_text(m.tags) AS t(value)
{where_clause} AND m.tags IS NOT NULL
GROUP BY t.value
ORDER BY count DESC, value ASC
LIMIT ${param}"#
        );
        let query = scope.bind(sqlx::query(&sql)).bind(limit);
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(AxisCount {
                    value: row.try_get("value")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    /// Count memories per value of one axis.
    pub async fn fetch_axis_counts(
        &self,
        scope: &AggregateScope<'_>,
        axis: &str,
        limit: i64,
    ) -> Result<Vec<AxisCount>> {
        // axis names come from the fixed taxonomy, never from user input
        let mut param = 1;
        let where_clause = scope.where_clause(&mut param);
        let sql = format!(
            r#"
SELECT t.value AS value, COUNT(DISTINCT m.id) AS count
FROM memories m
JOIN projects p ON m.project_id = p.id,
     jsonb_array_elements_text(m.axes->'{axis}') AS t(value)
{where_clause} AND m.axes ? '{axis}'
GROUP BY t.value
ORDER BY count DESC, value ASC
LIMIT ${param}"#
        );
        let query = scope.bind(sqlx::query(&sql)).bind(limit);
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(AxisCount {
                    value: row.try_get("value")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    /// Top-N distinct index paths with usage counts.
    pub async fn fetch_index_paths(
        &self,
        scope: &AggregateScope<'_>,
        limit: i64,
    ) -> Result<Vec<IndexPathCount>> {
        let mut param = 1;
        let where_clause = scope.where_clause(&mut param);
        let sql = format!(
            r#"
SELECT m.index_path AS path, COUNT(*) AS count
FROM memories m
JOIN projects p ON m.project_id = p.id
{where_clause} AND m.index_path IS NOT NULL AND jsonb_array_length(m.index_path) > 0
GROUP BY m.index_path
ORDER BY count DESC
LIMIT ${param}"#
        );
        let query = scope.bind(sqlx::query(&sql)).bind(limit);
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(IndexPathCount {
                    path: decode_index_path(row.try_get("path")?),
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    /// Totals and coverage counts for the stats block.
    pub async fn fetch_memory_counts(
        &self,
        scope: &AggregateScope<'_>,
    ) -> Result<MemoryCounts> {
        let mut param = 1;
        let where_clause = scope.where_clause(&mut param);
        let sql = format!(
            r#"
SELECT COUNT(*) AS total,
       COUNT(*) FILTER (WHERE m.axes IS NOT NULL) AS with_axes,
       COUNT(*) FILTER (WHERE m.index_path IS NOT NULL AND jsonb_array_length(m.index_path) > 0) AS with_index_path
FROM memories m
JOIN projects p ON m.project_id = p.id
{where_clause}"#
        );
        let row = scope.bind(sqlx::query(&sql)).fetch_one(&self.pool).await?;
        Ok(MemoryCounts {
            total: row.try_get("total")?,
            with_axes: row.try_get("with_axes")?,
            with_index_path: row.try_get("with_index_path")?,
        })
    }

    /// How many memories carry an index path of each depth.
    pub async fn fetch_depth_distribution(
        &self,
        scope: &AggregateScope<'_>,
    ) -> Result<Vec<DepthCount>> {
        let mut param = 1;
        let where_clause = scope.where_clause(&mut param);
        let sql = format!(
            r#"
SELECT jsonb_array_length(m.index_path) AS depth, COUNT(*) AS count
FROM memories m
JOIN projects p ON m.project_id = p.id
{where_clause} AND m.index_path IS NOT NULL AND jsonb_array_length(m.index_path) > 0
GROUP BY depth
ORDER BY depth ASC"#
        );
        let query = scope.bind(sqlx::query(&sql));
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let depth: i32 = row.try_get("depth")?;
                Ok(DepthCount {
                    depth: depth as i64,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_project_scoped_with_prefix() {
        let prefix = vec!["proj".to_string(), "mod".to_string()];
        let scope = AggregateScope {
            project_id: Some(Uuid::nil()),
            owner_id: "personal",
            path_prefix: &prefix,
        };
        let mut param = 1;
        let clause = scope.where_clause(&mut param);
        assert_eq!(
            clause,
            "WHERE m.project_id = $1 AND m.index_path->>0 = $2 AND m.index_path->>1 = $3"
        );
        assert_eq!(param, 4);
    }

    #[test]
    fn where_clause_owner_scoped() {
        let scope = AggregateScope {
            project_id: None,
            owner_id: "personal",
            path_prefix: &[],
        };
        let mut param = 1;
        assert_eq!(scope.where_clause(&mut param), "WHERE p.owner_id = $1");
        assert_eq!(param, 2);
    }
}
