//! MCP adapter for the Perforce REST gateway: a fixed tool catalog
//! served over stdio JSON-RPC.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

use mcp_core::{Tool, ToolDescriptor, ToolError};

pub mod client;
pub mod tools;

#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut map = HashMap::new();
        let mut order = Vec::new();

        for tool in tools {
            let name = tool.name().to_string();
            if map.insert(name.clone(), tool).is_none() {
                order.push(name);
            }
        }

        Self { tools: map, order }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.descriptor())
            .collect()
    }
}

pub struct McpServer {
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Serve newline-delimited JSON-RPC on stdin/stdout until EOF.
    pub async fn serve_stdio(&self) -> Result<()> {
        let stdin = io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut stdout = io::stdout();
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader.read_line(&mut line).await?;
            if read == 0 {
                tracing::debug!("client disconnected");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<Value>(trimmed) {
                Ok(request) => self.handle_jsonrpc(request).await,
                Err(err) => {
                    tracing::warn!(error = %err, "unparseable request line");
                    json!({
                        "jsonrpc": "2.0",
                        "id": Value::Null,
                        "error": { "code": -32700, "message": "Parse error" },
                    })
                }
            };

            let mut payload = serde_json::to_string(&response)?;
            payload.push('\n');
            stdout.write_all(payload.as_bytes()).await?;
            stdout.flush().await?;
        }

        Ok(())
    }

    pub async fn handle_jsonrpc(&self, request: Value) -> Value {
        let request: JsonRpcRequest = match serde_json::from_value(request) {
            Ok(request) => request,
            Err(err) => {
                return error_response(
                    Value::Null,
                    -32600,
                    format!("Invalid request: {err}"),
                );
            }
        };

        let JsonRpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;
        let id = id.unwrap_or(Value::Null);

        if jsonrpc != "2.0" {
            return error_response(
                id,
                -32600,
                format!("Unsupported JSON-RPC version: {jsonrpc}"),
            );
        }

        tracing::debug!(method = %method, "handling JSON-RPC request");

        match method.as_str() {
            "initialize" => result_response(
                id,
                json!({
                    "protocolVersion": "2025-06-18",
                    "capabilities": {
                        "tools": { "listChanged": false },
                    },
                    "serverInfo": {
                        "name": "p4-mcp-server",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            ),
            "tools/list" => result_response(
                id,
                json!({ "tools": self.registry.descriptors() }),
            ),
            "tools/call" => self.handle_tools_call(id, params).await,
            _ => error_response(id, -32601, format!("Unknown method: {method}")),
        }
    }

    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> Value {
        let params = match params {
            Some(Value::Object(map)) => map,
            _ => {
                return error_response(
                    id,
                    -32600,
                    "Missing params object for tools/call".to_string(),
                );
            }
        };

        let name = match params.get("name").and_then(Value::as_str) {
            Some(name) => name,
            None => {
                return error_response(id, -32600, "Missing 'name' in params".to_string());
            }
        };

        let tool = match self.registry.get(name) {
            Some(tool) => tool,
            None => {
                return error_response(id, -32601, format!("Unknown tool: {name}"));
            }
        };

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match tool.call(arguments).await {
            Ok(result) => result_response(id, result),
            Err(err) => tool_error_response(id, err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

fn result_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i32, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": JsonRpcError { code, message },
    })
}

fn tool_error_response(id: Value, err: ToolError) -> Value {
    error_response(id, err.code(), err.message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcp_core::{text_result, ToolResult};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the 'text' argument back"
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object", "properties": { "text": { "type": "string" } } })
        }

        async fn call(&self, params: Value) -> ToolResult<Value> {
            let text = params
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidParams("'text' is required".into()))?;
            Ok(text_result(text))
        }
    }

    fn server() -> McpServer {
        McpServer::new(ToolRegistry::new(vec![Arc::new(EchoTool)]))
    }

    #[tokio::test]
    async fn initialize_reports_server_identity() {
        let response = server()
            .handle_jsonrpc(json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" }))
            .await;
        assert_eq!(response["result"]["serverInfo"]["name"], "p4-mcp-server");
    }

    #[tokio::test]
    async fn tools_list_includes_descriptors() {
        let response = server()
            .handle_jsonrpc(json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }))
            .await;
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn tools_call_dispatches_to_the_tool() {
        let response = server()
            .handle_jsonrpc(json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": { "name": "echo", "arguments": { "text": "hi" } },
            }))
            .await;
        assert_eq!(response["result"]["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn unknown_tool_yields_method_not_found_code() {
        let response = server()
            .handle_jsonrpc(json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": { "name": "missing" },
            }))
            .await;
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn tool_errors_carry_their_code() {
        let response = server()
            .handle_jsonrpc(json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": { "name": "echo", "arguments": {} },
            }))
            .await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn wrong_version_is_rejected() {
        let response = server()
            .handle_jsonrpc(json!({ "jsonrpc": "1.0", "id": 6, "method": "tools/list" }))
            .await;
        assert_eq!(response["error"]["code"], -32600);
    }
}
