//! In-process ("sdk") MCP servers.
//!
//! The agent reaches these through its control channel instead of a child
//! process; [`dispatch`] answers the JSON-RPC messages it forwards.

use {
    async_trait::async_trait,
    serde_json::{Value, json},
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    types::{
        InitializeResult, JsonRpcRequest, JsonRpcResponse, McpToolDef, PROTOCOL_VERSION,
        ServerCapabilities, ServerInfo, ToolsCallParams, ToolsCallResult, ToolsCapability,
        ToolsListResult, codes,
    },
};

/// Name the agent uses for `tool` on `server`.
pub fn qualified_tool_name(server: &str, tool: &str) -> String {
    format!("mcp__{server}__{tool}")
}

/// A tool provider served from inside this process.
#[async_trait]
pub trait SdkMcpServer: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn tools(&self) -> Vec<McpToolDef>;

    /// Run a tool. Tool-level failures should come back as an `is_error`
    /// result; `Err` is for calls the server cannot route at all.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult>;

    /// Agent-facing names of every tool on this server.
    fn qualified_tool_names(&self) -> Vec<String> {
        self.tools()
            .iter()
            .map(|t| qualified_tool_name(self.name(), &t.name))
            .collect()
    }
}

/// Answer one JSON-RPC message for `server`. Notifications yield `None`.
pub async fn dispatch(server: &dyn SdkMcpServer, message: Value) -> Option<Value> {
    let request: JsonRpcRequest = match serde_json::from_value(message) {
        Ok(r) => r,
        Err(e) => {
            return to_value(JsonRpcResponse::failure(
                Value::Null,
                codes::INVALID_REQUEST,
                e.to_string(),
            ));
        },
    };

    let Some(id) = request.id.clone() else {
        debug!(server = %server.name(), method = %request.method, "mcp notification");
        return None;
    };

    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(
            id,
            json!(InitializeResult {
                protocol_version: PROTOCOL_VERSION.into(),
                capabilities: ServerCapabilities {
                    tools: Some(ToolsCapability::default()),
                },
                server_info: ServerInfo {
                    name: server.name().into(),
                    version: Some(server.version().into()),
                },
            }),
        ),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(
            id,
            json!(ToolsListResult {
                tools: server.tools(),
            }),
        ),
        "tools/call" => call(server, id, request.params).await,
        other => JsonRpcResponse::failure(
            id,
            codes::METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        ),
    };
    to_value(response)
}

async fn call(server: &dyn SdkMcpServer, id: Value, params: Option<Value>) -> JsonRpcResponse {
    let params: ToolsCallParams = match serde_json::from_value(params.unwrap_or(Value::Null)) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::failure(id, codes::INVALID_PARAMS, e.to_string()),
    };

    debug!(server = %server.name(), tool = %params.name, "mcp tool call");
    match server.call_tool(&params.name, params.arguments).await {
        Ok(result) => JsonRpcResponse::success(id, json!(result)),
        Err(e @ Error::UnknownTool { .. }) => {
            JsonRpcResponse::failure(id, codes::INVALID_PARAMS, e.to_string())
        },
        Err(e) => {
            warn!(server = %server.name(), tool = %params.name, error = %e, "mcp tool failed");
            JsonRpcResponse::success(id, json!(ToolsCallResult::error(e.to_string())))
        },
    }
}

fn to_value(response: JsonRpcResponse) -> Option<Value> {
    serde_json::to_value(response)
        .map_err(|e| warn!(error = %e, "failed to encode mcp response"))
        .ok()
}
