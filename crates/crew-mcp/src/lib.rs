// ABOUTME: crew-mcp library - JSON-RPC transport and worker tools.
// ABOUTME: The binary wires these to stdin/stdout; tests drive them over in-memory pipes.

pub mod error;
pub mod handler;
pub mod jsonrpc;
pub mod server;
pub mod tools;

pub use error::ToolError;
pub use handler::{ToolDefinition, ToolHandler};
pub use server::McpServer;
pub use tools::WorkerTools;
