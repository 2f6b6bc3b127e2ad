//! Typed messages read from the agent's output stream.

use {
    serde::Serialize,
    serde_json::{Value, json},
};

use crate::error::{Error, Result};

/// One block of an assistant or user message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
        is_error: bool,
    },
    Other(Value),
}

impl ContentBlock {
    /// Wire shape of the block.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text { text } => json!({"type": "text", "text": text}),
            Self::Thinking { thinking } => json!({"type": "thinking", "thinking": thinking}),
            Self::ToolUse { id, name, input } => {
                json!({"type": "tool_use", "id": id, "name": name, "input": input})
            },
            Self::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error,
            }),
            Self::Other(v) => v.clone(),
        }
    }

    fn parse(value: &Value) -> Self {
        let str_field = |k: &str| value.get(k).and_then(Value::as_str).map(String::from);
        match value.get("type").and_then(Value::as_str) {
            Some("text") => Self::Text {
                text: str_field("text").unwrap_or_default(),
            },
            Some("thinking") => Self::Thinking {
                thinking: str_field("thinking").unwrap_or_default(),
            },
            Some("tool_use") => Self::ToolUse {
                id: str_field("id").unwrap_or_default(),
                name: str_field("name").unwrap_or_default(),
                input: value.get("input").cloned().unwrap_or(Value::Null),
            },
            Some("tool_result") => Self::ToolResult {
                tool_use_id: str_field("tool_use_id").unwrap_or_default(),
                content: value.get("content").cloned().unwrap_or(Value::Null),
                is_error: value
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            _ => Self::Other(value.clone()),
        }
    }
}

/// The terminal message of a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultMessage {
    pub subtype: String,
    pub is_error: bool,
    pub result: Option<String>,
    pub session_id: Option<String>,
    pub total_cost_usd: Option<f64>,
    pub usage: Option<Value>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    Assistant {
        content: Vec<ContentBlock>,
        model: Option<String>,
    },
    /// Status messages. `data` is the full raw message.
    System {
        subtype: String,
        data: Value,
    },
    Result(ResultMessage),
    /// Tool results echoed back into the conversation.
    User {
        content: Vec<ContentBlock>,
    },
    /// Anything else the agent emits (partial stream events, unknown kinds).
    Other(Value),
}

impl AgentMessage {
    /// Parse one stream-json line.
    pub fn parse(value: Value) -> Result<Self> {
        let Some(kind) = value.get("type").and_then(Value::as_str).map(String::from) else {
            return Err(Error::protocol(format!("message without type: {value}")));
        };

        Ok(match kind.as_str() {
            "assistant" => Self::Assistant {
                content: blocks(value.pointer("/message/content")),
                model: value
                    .pointer("/message/model")
                    .and_then(Value::as_str)
                    .map(String::from),
            },
            "user" => Self::User {
                content: blocks(value.pointer("/message/content")),
            },
            "system" => Self::System {
                subtype: value
                    .get("subtype")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                data: value,
            },
            "result" => Self::Result(ResultMessage {
                subtype: value
                    .get("subtype")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                is_error: value
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                result: value
                    .get("result")
                    .and_then(Value::as_str)
                    .map(String::from),
                session_id: value
                    .get("session_id")
                    .and_then(Value::as_str)
                    .map(String::from),
                total_cost_usd: value.get("total_cost_usd").and_then(Value::as_f64),
                usage: value.get("usage").filter(|u| !u.is_null()).cloned(),
                duration_ms: value.get("duration_ms").and_then(Value::as_u64),
                num_turns: value.get("num_turns").and_then(Value::as_u64),
            }),
            _ => Self::Other(value),
        })
    }

    /// Text blocks of an assistant message, concatenated and trimmed.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Assistant { content, .. } => Some(
                content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<String>()
                    .trim()
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Upstream session id carried by system and result messages.
    pub fn upstream_session_id(&self) -> Option<&str> {
        match self {
            Self::System { data, .. } => data.get("session_id").and_then(Value::as_str),
            Self::Result(r) => r.session_id.as_deref(),
            _ => None,
        }
    }

    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }
}

fn blocks(content: Option<&Value>) -> Vec<ContentBlock> {
    match content {
        Some(Value::Array(items)) => items.iter().map(ContentBlock::parse).collect(),
        Some(Value::String(text)) => vec![ContentBlock::Text { text: text.clone() }],
        _ => Vec::new(),
    }
}
