use {
    chatrelay_agent::{AgentMessage, ContentBlock},
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Assistant,
    System,
    Result,
    Other,
}

/// One received agent message, as logged and handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub kind: EventKind,
    /// Assistant text, or the result's final text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub payload: Value,
}

impl StreamEvent {
    pub fn from_message(message: &AgentMessage) -> Self {
        match message {
            AgentMessage::Assistant { content, model } => Self {
                kind: EventKind::Assistant,
                text: message.text().filter(|t| !t.is_empty()),
                payload: json!({
                    "type": "assistant",
                    "model": model,
                    "content": blocks(content),
                }),
            },
            AgentMessage::System { data, .. } => Self {
                kind: EventKind::System,
                text: None,
                payload: data.clone(),
            },
            AgentMessage::Result(result) => {
                let mut payload = json!(result);
                if let Value::Object(map) = &mut payload {
                    map.insert("type".into(), json!("result"));
                }
                Self {
                    kind: EventKind::Result,
                    text: result.result.clone(),
                    payload,
                }
            },
            AgentMessage::User { content } => Self {
                kind: EventKind::Other,
                text: None,
                payload: json!({ "type": "user", "content": blocks(content) }),
            },
            AgentMessage::Other(value) => Self {
                kind: EventKind::Other,
                text: None,
                payload: value.clone(),
            },
        }
    }
}

fn blocks(content: &[ContentBlock]) -> Vec<Value> {
    content.iter().map(ContentBlock::to_json).collect()
}
