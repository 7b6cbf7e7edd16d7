//! MCP `mem.memory_chain` tool — version history for one memory.

use std::future::Future;

use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_router};

use super::{to_json, to_tool_error, MemexTools};
use crate::memory::history;
use crate::memory::types::MemoryChainInput;

#[tool_router(router = memory_chain_router, vis = "pub")]
impl MemexTools {
    #[tool(
        name = "mem.memory_chain",
        description = "Version history and related arbitrations for one memory, newest first."
    )]
    async fn memory_chain(
        &self,
        Parameters(params): Parameters<MemoryChainInput>,
    ) -> Result<String, String> {
        let output = history::memory_chain(&self.state, params)
            .await
            .map_err(to_tool_error)?;
        to_json(&output)
    }
}
