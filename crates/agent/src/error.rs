use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("working directory '{0}' does not exist")]
    WorkingDirectory(PathBuf),

    #[error("agent protocol error: {0}")]
    Protocol(String),

    #[error("agent process is not connected")]
    NotConnected,

    #[error("agent process failed to start: {0}")]
    Spawn(String),

    #[error("control request '{subtype}' failed: {message}")]
    ControlRequest { subtype: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    #[must_use]
    pub fn control_request(subtype: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ControlRequest {
            subtype: subtype.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
