//! MCP `mem.timeline` tool — recent memories within a day window.

use std::future::Future;

use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_router};

use super::{to_json, to_tool_error, MemexTools};
use crate::memory::types::TimelineInput;

#[tool_router(router = timeline_router, vis = "pub")]
impl MemexTools {
    #[tool(
        name = "mem.timeline",
        description = "Recent memories within a day window, newest first. Optional project scoping."
    )]
    async fn timeline(
        &self,
        Parameters(params): Parameters<TimelineInput>,
    ) -> Result<String, String> {
        let output = self.state.timeline(params).await.map_err(to_tool_error)?;
        to_json(&output)
    }
}
