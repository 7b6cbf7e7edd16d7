//! MCP `mem.search` tool — first-stage retrieval.

use std::future::Future;

use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_router};

use super::{to_json, to_tool_error, MemexTools};
use crate::memory::search;
use crate::memory::types::SearchInput;

#[tool_router(router = search_router, vis = "pub")]
impl MemexTools {
    #[tool(
        name = "mem.search",
        description = "First-stage retrieval: hybrid vector + keyword + full-text search fused by RRF, one summary row per memory. Follow up with mem.get on the returned ids."
    )]
    async fn search(&self, Parameters(params): Parameters<SearchInput>) -> Result<String, String> {
        let output = search::search(&self.state, params)
            .await
            .map_err(to_tool_error)?;
        to_json(&output)
    }
}
