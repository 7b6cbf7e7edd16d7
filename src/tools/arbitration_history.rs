//! MCP `mem.arbitration_history` tool — the append-only decision log.

use std::future::Future;

use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_router};

use super::{to_json, to_tool_error, MemexTools};
use crate::memory::history;
use crate::memory::types::ArbitrationHistoryInput;

#[tool_router(router = arbitration_history_router, vis = "pub")]
impl MemexTools {
    #[tool(
        name = "mem.arbitration_history",
        description = "Arbitration decisions (REPLACE / KEEP_BOTH / SKIP) for an owner, optionally filtered by memory or project."
    )]
    async fn arbitration_history(
        &self,
        Parameters(params): Parameters<ArbitrationHistoryInput>,
    ) -> Result<String, String> {
        let output = history::arbitration_history(&self.state, params)
            .await
            .map_err(to_tool_error)?;
        to_json(&output)
    }
}
