//! MCP `mem.get` tool — second-stage fetch by ids.

use std::future::Future;

use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_router};

use super::{to_json, to_tool_error, MemexTools};
use crate::memory::types::GetMemoriesInput;

#[tool_router(router = get_router, vis = "pub")]
impl MemexTools {
    #[tool(
        name = "mem.get",
        description = "Second-stage fetch: full content for up to 10 memory ids from mem.search."
    )]
    async fn get(&self, Parameters(params): Parameters<GetMemoriesInput>) -> Result<String, String> {
        let output = self
            .state
            .get_memories(&params.ids)
            .await
            .map_err(to_tool_error)?;
        to_json(&output)
    }
}
