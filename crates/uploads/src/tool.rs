//! The built-in `file-ops` in-process MCP server.

use std::sync::Arc;

use {
    async_trait::async_trait,
    chatrelay_mcp::{McpToolDef, SdkMcpServer, ToolsCallResult, qualified_tool_name},
    serde_json::{Map, Value, json},
    tracing::info,
};

use crate::{
    handler::{UploadRequest, UploadResult},
    router::UploadRouter,
};

pub const FILE_OPS_SERVER: &str = "file-ops";
pub const UPLOAD_FILE_TOOL: &str = "upload_file";

/// `mcp__file-ops__upload_file`, granted to every session.
pub fn upload_tool_name() -> String {
    qualified_tool_name(FILE_OPS_SERVER, UPLOAD_FILE_TOOL)
}

/// Lets the agent send a file to the chat its session belongs to.
pub struct FileOpsServer {
    router: Arc<UploadRouter>,
    session_id: String,
}

impl FileOpsServer {
    pub fn new(router: Arc<UploadRouter>, session_id: impl Into<String>) -> Self {
        Self {
            router,
            session_id: session_id.into(),
        }
    }

    async fn upload(&self, arguments: Value) -> chatrelay_mcp::Result<ToolsCallResult> {
        let Value::Object(mut args) = arguments else {
            return Err(chatrelay_mcp::Error::invalid_arguments(
                UPLOAD_FILE_TOOL,
                "expected an object",
            ));
        };
        let file_path = match args.remove("file_path") {
            Some(Value::String(p)) if !p.trim().is_empty() => p,
            _ => {
                return Err(chatrelay_mcp::Error::invalid_arguments(
                    UPLOAD_FILE_TOOL,
                    "file_path is required",
                ));
            },
        };
        let title = take_string(&mut args, "title");
        let comment = take_string(&mut args, "comment");

        let request = UploadRequest {
            session_id: self.session_id.clone(),
            file_path: file_path.into(),
            title,
            comment,
            options: args,
        };
        info!(session = %self.session_id, file = %request.file_path.display(), "agent requested upload");

        Ok(match self.router.dispatch(request).await {
            Ok(result) => render(&result),
            Err(e) => ToolsCallResult::error(e.to_string()),
        })
    }
}

fn take_string(args: &mut Map<String, Value>, key: &str) -> Option<String> {
    match args.remove(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

fn render(result: &UploadResult) -> ToolsCallResult {
    if !result.success {
        let reason = result
            .error
            .as_deref()
            .or(result.message.as_deref())
            .unwrap_or("unknown error");
        return ToolsCallResult::error(format!("Upload of {} failed: {reason}", result.file_path));
    }

    let mut text = match &result.message {
        Some(message) => message.clone(),
        None => format!("Uploaded {}", result.file_path),
    };
    if let Some(url) = result.url() {
        text.push_str(&format!("\nURL: {url}"));
    }
    if let Some(id) = result.file_id() {
        text.push_str(&format!("\nFile ID: {id}"));
    }
    ToolsCallResult::text(text)
}

#[async_trait]
impl SdkMcpServer for FileOpsServer {
    fn name(&self) -> &str {
        FILE_OPS_SERVER
    }

    fn tools(&self) -> Vec<McpToolDef> {
        vec![McpToolDef {
            name: UPLOAD_FILE_TOOL.into(),
            description: Some(
                "Upload a local file to the current conversation. Extra properties are passed \
                 to the chat platform."
                    .into(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Path of the file to upload"},
                    "title": {"type": "string", "description": "Display title"},
                    "comment": {"type": "string", "description": "Message posted with the file"}
                },
                "required": ["file_path"],
                "additionalProperties": true
            }),
        }]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> chatrelay_mcp::Result<ToolsCallResult> {
        match name {
            UPLOAD_FILE_TOOL => self.upload(arguments).await,
            other => Err(chatrelay_mcp::Error::unknown_tool(FILE_OPS_SERVER, other)),
        }
    }
}
