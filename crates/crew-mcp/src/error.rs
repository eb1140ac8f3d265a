// ABOUTME: Error types for tool execution.
// ABOUTME: Tool errors are reported to the client as isError results, not protocol errors.

use crew_core::WorkerError;
use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The requested tool does not exist.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments did not match the tool's input schema.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The registry rejected the operation.
    #[error(transparent)]
    Worker(#[from] WorkerError),
}
