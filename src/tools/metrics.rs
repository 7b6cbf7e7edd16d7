//! MCP `mem.metrics` tool — index stats in Prometheus exposition format.

use std::future::Future;

use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_router};

use super::{to_json, to_tool_error, MemexTools};
use crate::memory::metrics;
use crate::memory::types::IndexInput;

#[tool_router(router = metrics_router, vis = "pub")]
impl MemexTools {
    #[tool(
        name = "mem.metrics",
        description = "Index stats rendered in Prometheus exposition format."
    )]
    async fn metrics(&self, Parameters(params): Parameters<IndexInput>) -> Result<String, String> {
        let output = metrics::metrics(&self.state, params)
            .await
            .map_err(to_tool_error)?;
        to_json(&output)
    }
}
