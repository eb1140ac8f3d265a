// ABOUTME: Line-delimited JSON-RPC server speaking the MCP tool methods.
// ABOUTME: Dispatches tools/list and tools/call to a ToolHandler.

use crate::handler::ToolHandler;
use crate::jsonrpc::{
    JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version answered when the client does not name one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub const SERVER_NAME: &str = "crew-mcp";

#[derive(Debug, Deserialize)]
struct CallParams {
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

pub struct McpServer<H> {
    handler: H,
}

impl<H: ToolHandler> McpServer<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    /// Handle one raw input line. Returns the response to write, if any.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable request");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            // Malformed notifications get no answer
            Err(e) => id.map(|id| {
                JsonRpcResponse::failure(id, INVALID_REQUEST, format!("Invalid request: {}", e))
            }),
        }
    }

    /// Dispatch a parsed request. Notifications produce no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "Notification");
            return None;
        };

        tracing::debug!(method = %request.method, id = %id, "Request");
        let response = match request.method.as_str() {
            "initialize" => {
                let protocol_version = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_PROTOCOL_VERSION);
                JsonRpcResponse::success(
                    id,
                    json!({
                        "protocolVersion": protocol_version,
                        "capabilities": {"tools": {}},
                        "serverInfo": {
                            "name": SERVER_NAME,
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    }),
                )
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({"tools": self.handler.tools()})),
            "tools/call" => self.call_tool(id, request.params).await,
            other => JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };
        Some(response)
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params = params
            .and_then(|p| serde_json::from_value::<CallParams>(p).ok())
            .and_then(|p| Some((p.name?, p.arguments)));
        let Some((name, arguments)) = params else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing tool name");
        };

        let arguments = match arguments {
            Some(Value::Null) | None => json!({}),
            Some(arguments) => arguments,
        };

        let (text, is_error) = match self.handler.execute(&name, arguments).await {
            Ok(text) => (text, false),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool call failed");
                (e.to_string(), true)
            }
        };

        JsonRpcResponse::success(
            id,
            json!({
                "content": [{"type": "text", "text": text}],
                "isError": is_error,
            }),
        )
    }

    /// Serve newline-delimited requests from `reader` until EOF.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await.context("Failed to read request")? {
            if line.trim().is_empty() {
                continue;
            }
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let mut out = serde_json::to_string(&response).context("Failed to encode response")?;
            out.push('\n');
            writer
                .write_all(out.as_bytes())
                .await
                .context("Failed to write response")?;
            writer.flush().await.context("Failed to flush response")?;
        }
        tracing::info!("Client closed input");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::handler::ToolDefinition;
    use async_trait::async_trait;

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        fn tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "echo".to_string(),
                description: "Echo the arguments".to_string(),
                input_schema: json!({"type": "object"}),
            }]
        }

        async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String, ToolError> {
            match tool_name {
                "echo" => Ok(arguments.to_string()),
                "fail" => Err(ToolError::InvalidInput("nope".to_string())),
                other => Err(ToolError::UnknownTool(other.to_string())),
            }
        }
    }

    fn server() -> McpServer<EchoHandler> {
        McpServer::new(EchoHandler)
    }

    async fn respond(line: &str) -> Value {
        let response = server().handle_line(line).await.expect("response");
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_echoes_protocol_version() {
        let resp = respond(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#,
        )
        .await;
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(resp["result"]["serverInfo"]["name"], "crew-mcp");
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_initialize_defaults_protocol_version() {
        let resp = respond(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#).await;
        assert_eq!(resp["result"]["protocolVersion"], DEFAULT_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let line = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        assert!(server().handle_line(line).await.is_none());
        // Even for unknown methods
        let line = r#"{"jsonrpc":"2.0","method":"bogus"}"#;
        assert!(server().handle_line(line).await.is_none());
    }

    #[tokio::test]
    async fn test_ping() {
        let resp = respond(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#).await;
        assert_eq!(resp, json!({"jsonrpc": "2.0", "id": "p", "result": {}}));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let resp = respond(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).await;
        let tools = resp["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");
        assert_eq!(tools[0]["inputSchema"], json!({"type": "object"}));
    }

    #[tokio::test]
    async fn test_tools_call_success_and_failure() {
        let resp = respond(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"echo","arguments":{"a":1}}}"#,
        )
        .await;
        assert_eq!(
            resp["result"],
            json!({"content": [{"type": "text", "text": "{\"a\":1}"}], "isError": false})
        );

        let resp = respond(
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"fail"}}"#,
        )
        .await;
        assert_eq!(resp["result"]["isError"], true);
        assert_eq!(resp["result"]["content"][0]["text"], "invalid input: nope");
        assert!(resp.get("error").is_none());
    }

    #[tokio::test]
    async fn test_tools_call_defaults_arguments() {
        let resp = respond(
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"echo"}}"#,
        )
        .await;
        assert_eq!(resp["result"]["content"][0]["text"], "{}");
    }

    #[tokio::test]
    async fn test_tools_call_without_name() {
        let resp = respond(r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{}}"#).await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);

        let resp = respond(r#"{"jsonrpc":"2.0","id":7,"method":"tools/call"}"#).await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let resp = respond(r#"{"jsonrpc":"2.0","id":8,"method":"resources/list"}"#).await;
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(resp["id"], 8);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let resp = respond("{not json").await;
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
        assert_eq!(resp["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_invalid_request() {
        let resp = respond(r#"{"jsonrpc":"2.0","id":9}"#).await;
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);
        assert_eq!(resp["id"], 9);
    }

    #[tokio::test]
    async fn test_serve_until_eof() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );
        let mut output = Vec::new();
        server().serve(input.as_bytes(), &mut output).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["id"], 2);
    }
}
