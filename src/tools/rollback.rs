//! MCP `mem.rollback` tool — undo a REPLACE arbitration.

use std::future::Future;

use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_router};

use super::{to_json, to_tool_error, MemexTools};
use crate::memory::history;
use crate::memory::types::RollbackInput;

#[tool_router(router = rollback_router, vis = "pub")]
impl MemexTools {
    #[tool(
        name = "mem.rollback",
        description = "Undo a REPLACE arbitration: restore the replaced memory from its latest version snapshot."
    )]
    async fn rollback(
        &self,
        Parameters(params): Parameters<RollbackInput>,
    ) -> Result<String, String> {
        let output = history::rollback(&self.state, params)
            .await
            .map_err(to_tool_error)?;
        to_json(&output)
    }
}
