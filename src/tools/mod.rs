//! The `mem.*` MCP tool surface, one file per tool. This module holds the
//! shared [`MemexTools`] handler and combines the per-tool routers; parameter
//! schemas come from the `schemars`-derived input types in
//! [`crate::memory::types`].

pub mod arbitration_history;
pub mod get;
pub mod index;
pub mod ingest_memory;
pub mod list_projects;
pub mod memory_chain;
pub mod metrics;
pub mod rollback;
pub mod search;
pub mod timeline;

use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::{tool_handler, ServerHandler};

use crate::app::AppState;
use crate::error::Error;

#[derive(Clone)]
pub struct MemexTools {
    tool_router: ToolRouter<Self>,
    state: Arc<AppState>,
}

impl MemexTools {
    pub fn new(state: Arc<AppState>) -> Self {
        let tool_router = Self::ingest_memory_router()
            + Self::search_router()
            + Self::get_router()
            + Self::timeline_router()
            + Self::list_projects_router()
            + Self::index_router()
            + Self::metrics_router()
            + Self::arbitration_history_router()
            + Self::memory_chain_router()
            + Self::rollback_router();
        Self { tool_router, state }
    }
}

fn to_tool_error(err: Error) -> String {
    format!("{}: {}", err.code(), err.public_message())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_handler]
impl ServerHandler for MemexTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "memex is a persistent semantic memory service. Two-stage \
                 retrieval: mem.search for ranked summaries, then mem.get for \
                 full content. Write with mem.ingest_memory; browse with \
                 mem.timeline, mem.index, and mem.list_projects; audit writes \
                 with mem.arbitration_history, mem.memory_chain, and \
                 mem.rollback."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
