use std::path::PathBuf;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

use crate::error::Result;

/// An agent-initiated request to deliver a file to the session's chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub session_id: String,
    pub file_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Platform-specific options (`thread_ts`, `channel`, ...).
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl UploadRequest {
    pub fn new(session_id: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            session_id: session_id.into(),
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// What a platform reports back after an upload attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub success: bool,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Platform response fields such as `file_url`, `permalink` or `file_id`.
    #[serde(default)]
    pub platform_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn ok(file_path: impl Into<String>) -> Self {
        Self {
            success: true,
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    pub fn failed(file_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            file_path: file_path.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.platform_data.insert(key.into(), value);
        self
    }

    /// Link to the uploaded file, if the platform returned one.
    pub fn url(&self) -> Option<&str> {
        ["file_url", "permalink", "url"]
            .iter()
            .find_map(|k| self.platform_data.get(*k).and_then(Value::as_str))
    }

    pub fn file_id(&self) -> Option<&str> {
        self.platform_data.get("file_id").and_then(Value::as_str)
    }
}

/// Implemented once per chat platform. The router hands it requests for
/// sessions carrying the platform's prefix; the handler owns path checks and
/// the network call.
#[async_trait]
pub trait FileUploadHandler: Send + Sync {
    async fn upload_file(&self, request: UploadRequest) -> Result<UploadResult>;
}
