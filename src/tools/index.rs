//! MCP `mem.index` tool — axis/tag/path aggregation.

use std::future::Future;

use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_router};

use super::{to_json, to_tool_error, MemexTools};
use crate::memory::index;
use crate::memory::types::IndexInput;

#[tool_router(router = index_router, vis = "pub")]
impl MemexTools {
    #[tool(
        name = "mem.index",
        description = "Tag/axis/path aggregation for browsing the knowledge structure, with a foldable path tree and coverage stats."
    )]
    async fn index(&self, Parameters(params): Parameters<IndexInput>) -> Result<String, String> {
        let output = index::index_overview(&self.state, params)
            .await
            .map_err(to_tool_error)?;
        to_json(&output)
    }
}
