//! Shared application state and the operations that are thin store reads —
//! fetch by ids, timeline, project listing. The heavier pipelines live in
//! [`crate::memory::ingest`] and [`crate::memory::search`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result as AnyResult;
use tracing::info;

use crate::config::MemexConfig;
use crate::db::Store;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::llm::{self, LlmProvider};
use crate::memory::metrics::MetricsCache;
use crate::memory::normalize::{
    normalize_list_projects_input, normalize_timeline_input, unique_strings,
};
use crate::memory::types::{
    GetMemoriesResponse, ListProjectsInput, ListProjectsResponse, MemoryRecord, ProjectListItem,
    SearchMetadata, TimelineInput, TimelineItem, TimelineResponse,
};
use crate::memory::validate::{validate_list_projects_input, validate_timeline_input};

/// Everything a request handler needs, shared behind one `Arc`.
pub struct AppState {
    pub config: MemexConfig,
    pub store: Store,
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub metrics_cache: MetricsCache,
}

impl AppState {
    /// Wire up the store and providers from config.
    pub async fn new(config: MemexConfig) -> AnyResult<Arc<Self>> {
        let store = Store::connect(&config.storage.database_url).await?;
        info!("database pool ready");

        let api_key = config.llm_api_key();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(embedding::create_provider(
            &config.embedding,
            &config.llm,
            api_key.clone(),
        )?);
        let llm: Arc<dyn LlmProvider> = Arc::from(llm::create_provider(&config, api_key));
        info!(
            embedding_provider = %config.embedding.provider,
            mock_llm = llm.is_mock(),
            "providers ready"
        );

        let metrics_cache = MetricsCache::new(Duration::from_secs(config.metrics.cache_ttl_secs));
        Ok(Arc::new(Self {
            config,
            store,
            llm,
            embedder,
            metrics_cache,
        }))
    }

    /// Run the idempotent schema bootstrap.
    pub async fn ensure_schema(&self, reset: bool) -> AnyResult<()> {
        self.store
            .ensure_schema(self.config.embedding.dimension, reset)
            .await
    }

    /// Second-stage fetch: hydrate up to 10 memories by id, input order kept.
    pub async fn get_memories(&self, ids: &[String]) -> Result<GetMemoriesResponse> {
        let ids = unique_strings(ids);
        if ids.is_empty() {
            return Ok(GetMemoriesResponse {
                results: Vec::new(),
            });
        }
        if ids.len() > 10 {
            return Err(Error::invalid("ERR_INVALID_IDS", "at most 10 ids per call"));
        }
        let rows = self.store.fetch_memories(&ids).await.map_err(Error::Internal)?;

        let mut by_id: std::collections::HashMap<String, MemoryRecord> = rows
            .into_iter()
            .map(|row| {
                (
                    row.id.clone(),
                    MemoryRecord {
                        id: row.id,
                        content: row.content,
                        content_type: row.content_type,
                        summary: row.summary,
                        tags: row.tags,
                        axes: row.axes,
                        index_path: row.index_path,
                        ts: row.ts,
                    },
                )
            })
            .collect();

        let results: Vec<MemoryRecord> =
            ids.iter().filter_map(|id| by_id.remove(id)).collect();
        Ok(GetMemoriesResponse { results })
    }

    /// Recent memories within a day window, project- or owner-scoped.
    pub async fn timeline(&self, input: TimelineInput) -> Result<TimelineResponse> {
        let input = normalize_timeline_input(input, &self.config)?;
        validate_timeline_input(&input)?;

        let project_id = if input.project_key.is_empty() {
            None
        } else {
            match self
                .store
                .find_project_id(&input.owner_id, &input.project_key)
                .await
                .map_err(Error::Internal)?
            {
                Some(id) => Some(id),
                None => {
                    return Ok(TimelineResponse {
                        results: Vec::new(),
                        metadata: SearchMetadata::counted(0, 0),
                    })
                }
            }
        };

        let since_ts = chrono::Utc::now().timestamp() - input.days * 24 * 3600;
        let rows = self
            .store
            .fetch_timeline(project_id, &input.owner_id, since_ts, input.limit)
            .await
            .map_err(Error::Internal)?;

        let results: Vec<TimelineItem> = rows
            .into_iter()
            .map(|row| TimelineItem {
                id: row.id,
                content_type: row.content_type,
                summary: row.summary,
                ts: row.ts,
            })
            .collect();
        let returned = results.len();
        Ok(TimelineResponse {
            results,
            metadata: SearchMetadata::counted(returned, returned),
        })
    }

    /// Projects with memory counts and the latest activity timestamp.
    pub async fn list_projects(&self, input: ListProjectsInput) -> Result<ListProjectsResponse> {
        let input = normalize_list_projects_input(input, &self.config)?;
        validate_list_projects_input(&input)?;

        let rows = self
            .store
            .list_projects(&input.owner_id, input.limit)
            .await
            .map_err(Error::Internal)?;
        let results: Vec<ProjectListItem> = rows
            .into_iter()
            .map(|row| ProjectListItem {
                owner_id: row.owner_id,
                project_key: row.project_key,
                machine_name: row.machine_name,
                project_path: row.project_path,
                project_name: row.project_name,
                memory_count: row.memory_count,
                latest_ts: row.latest_ts,
            })
            .collect();
        let returned = results.len();
        Ok(ListProjectsResponse {
            results,
            metadata: SearchMetadata::counted(returned, returned),
        })
    }
}
