use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error("failed to read MCP settings {path}: {message}")]
    Settings { path: PathBuf, message: String },
    #[error("unknown tool '{tool}' on server '{server}'")]
    UnknownTool { server: String, tool: String },
    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
}

impl Error {
    #[must_use]
    pub fn settings(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Settings {
            path: path.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unknown_tool(server: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::UnknownTool {
            server: server.into(),
            tool: tool.into(),
        }
    }

    #[must_use]
    pub fn invalid_arguments(tool: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
