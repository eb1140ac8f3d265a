// ABOUTME: ToolHandler trait - the seam between the MCP transport and tool logic
// ABOUTME: Also defines the tool descriptor returned by tools/list

use crate::error::ToolError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A tool as advertised by tools/list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Executes tool calls on behalf of the server.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Tools this handler serves.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Run one tool call and return the text content of its result.
    async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String, ToolError>;
}
