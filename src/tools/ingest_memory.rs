//! MCP `mem.ingest_memory` tool — the write pipeline entry point.

use std::future::Future;

use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_router};

use super::{to_json, to_tool_error, MemexTools};
use crate::memory::ingest;
use crate::memory::types::IngestMemoryInput;

#[tool_router(router = ingest_memory_router, vis = "pub")]
impl MemexTools {
    #[tool(
        name = "mem.ingest_memory",
        description = "Write a memory. content_type: requirement (business rules), plan (designs/roadmaps), development (implementation/APIs), testing (test plans/bugs), insight (lessons learned). Near-duplicate content is arbitrated into REPLACE / KEEP_BOTH / SKIP automatically."
    )]
    async fn ingest_memory(
        &self,
        Parameters(params): Parameters<IngestMemoryInput>,
    ) -> Result<String, String> {
        let output = ingest::ingest_memory(&self.state, params)
            .await
            .map_err(to_tool_error)?;
        to_json(&output)
    }
}
