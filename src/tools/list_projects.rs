//! MCP `mem.list_projects` tool — projects with counts and latest activity.

use std::future::Future;

use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_router};

use super::{to_json, to_tool_error, MemexTools};
use crate::memory::types::ListProjectsInput;

#[tool_router(router = list_projects_router, vis = "pub")]
impl MemexTools {
    #[tool(
        name = "mem.list_projects",
        description = "Projects for an owner with memory counts and latest activity."
    )]
    async fn list_projects(
        &self,
        Parameters(params): Parameters<ListProjectsInput>,
    ) -> Result<String, String> {
        let output = self
            .state
            .list_projects(params)
            .await
            .map_err(to_tool_error)?;
        to_json(&output)
    }
}
