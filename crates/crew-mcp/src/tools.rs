// ABOUTME: The seven worker tools and their dispatch onto WorkerRegistry.
// ABOUTME: Confirmations are compact JSON text; worker_read returns raw output text.

use crate::error::ToolError;
use crate::handler::{ToolDefinition, ToolHandler};
use async_trait::async_trait;
use chrono::SecondsFormat;
use crew_core::{SpawnRequest, WorkerInfo, WorkerRegistry, WorkerStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpawnParams {
    id: Option<String>,
    system_prompt: String,
    working_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageParams {
    worker_id: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkerParams {
    worker_id: String,
}

/// One entry of the worker_list result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListedWorker<'a> {
    id: &'a str,
    status: WorkerStatus,
    created_at: String,
}

impl<'a> From<&'a WorkerInfo> for ListedWorker<'a> {
    fn from(info: &'a WorkerInfo) -> Self {
        Self {
            id: &info.id,
            status: info.status,
            created_at: info.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

/// Exposes a [`WorkerRegistry`] as MCP tools.
pub struct WorkerTools {
    registry: Arc<WorkerRegistry>,
}

impl WorkerTools {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }

    /// Run a tool synchronously. Registry operations never wait on workers.
    pub fn call(&self, tool_name: &str, arguments: Value) -> Result<String, ToolError> {
        let result = match tool_name {
            "worker_spawn" => {
                let params: SpawnParams = parse(arguments)?;
                let request = SpawnRequest {
                    id: params.id,
                    system_prompt: params.system_prompt,
                    working_dir: params.working_dir,
                };
                let worker = self.registry.spawn(request)?;
                json!({"id": worker.id, "status": worker.status})
            }
            "worker_send" => {
                let params: MessageParams = parse(arguments)?;
                self.registry.send(&params.worker_id, &params.message)?;
                json!({"sent": true, "workerId": params.worker_id})
            }
            "worker_read" => {
                let params: WorkerParams = parse(arguments)?;
                // Raw text, not JSON
                return Ok(self.registry.read(&params.worker_id)?.concat());
            }
            "worker_status" => {
                let params: WorkerParams = parse(arguments)?;
                let status = self.registry.status(&params.worker_id)?;
                json!({"workerId": params.worker_id, "status": status})
            }
            "worker_interrupt" => {
                let params: MessageParams = parse(arguments)?;
                self.registry.interrupt(&params.worker_id, &params.message)?;
                json!({"interrupted": true, "workerId": params.worker_id})
            }
            "worker_kill" => {
                let params: WorkerParams = parse(arguments)?;
                let killed = self.registry.kill(&params.worker_id);
                json!({"killed": killed, "workerId": params.worker_id})
            }
            "worker_list" => {
                let workers = self.registry.list();
                let listed: Vec<ListedWorker<'_>> =
                    workers.iter().map(ListedWorker::from).collect();
                json!(listed)
            }
            other => return Err(ToolError::UnknownTool(other.to_string())),
        };

        Ok(result.to_string())
    }
}

#[async_trait]
impl ToolHandler for WorkerTools {
    fn tools(&self) -> Vec<ToolDefinition> {
        worker_tools()
    }

    async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String, ToolError> {
        self.call(tool_name, arguments)
    }
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Definitions for every worker tool, in the order they are listed.
pub fn worker_tools() -> Vec<ToolDefinition> {
    let worker_id = json!({"type": "string", "description": "Worker ID"});

    vec![
        tool(
            "worker_spawn",
            "Start an independent Claude worker session. For parallel work, spawn several workers and send each a task. \
             systemPrompt sets the worker's role (e.g. \"code reviewer\", \"test writer\"). The session keeps its \
             conversation context across messages.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Worker ID (generated as worker_1, worker_2, ... when omitted)"},
                    "systemPrompt": {"type": "string", "description": "The worker's role and behaviour, e.g. \"You are a code reviewer. Only report bugs and security issues.\""},
                    "workingDir": {"type": "string", "description": "Working directory for the worker (base path for file access)"}
                },
                "required": ["systemPrompt"]
            }),
        ),
        tool(
            "worker_send",
            "Send a message to a worker. Returns immediately; poll worker_read for the answer. \
             Sending to several workers at once runs them in parallel.",
            json!({
                "type": "object",
                "properties": {
                    "workerId": {"type": "string", "description": "Target worker ID"},
                    "message": {"type": "string", "description": "Task or instruction for the worker"}
                },
                "required": ["workerId", "message"]
            }),
        ),
        tool(
            "worker_read",
            "Read worker output produced since the last read. When the status is idle the worker has finished; \
             when it is working, poll again later.",
            json!({
                "type": "object",
                "properties": {"workerId": worker_id},
                "required": ["workerId"]
            }),
        ),
        tool(
            "worker_status",
            "Get a worker's status: idle = waiting or finished, working = processing, done = process exited, \
             error = the process failed.",
            json!({
                "type": "object",
                "properties": {"workerId": worker_id},
                "required": ["workerId"]
            }),
        ),
        tool(
            "worker_interrupt",
            "Interrupt a worker's current task and inject a new instruction. Use it to cancel long-running work \
             or change direction.",
            json!({
                "type": "object",
                "properties": {
                    "workerId": {"type": "string", "description": "Worker ID"},
                    "message": {"type": "string", "description": "Message to send once the worker has stopped"}
                },
                "required": ["workerId", "message"]
            }),
        ),
        tool(
            "worker_kill",
            "Terminate a worker process. Its session and context are discarded. Use it to clean up workers \
             that are finished or no longer needed.",
            json!({
                "type": "object",
                "properties": {"workerId": {"type": "string", "description": "ID of the worker to terminate"}},
                "required": ["workerId"]
            }),
        ),
        tool(
            "worker_list",
            "List every active worker with its status, for managing and monitoring parallel work.",
            json!({"type": "object", "properties": {}}),
        ),
    ]
}
