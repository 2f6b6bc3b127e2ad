use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The agent process could not be started or handshaken.
    #[error("agent connection failed for session {session_id}: {message}")]
    Connect { session_id: String, message: String },

    #[error("interrupt failed for session {session_id}: {message}")]
    Interrupt { session_id: String, message: String },

    /// Options could not be derived from the config (e.g. missing cwd).
    #[error(transparent)]
    Options(#[from] chatrelay_agent::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error("file lock failed: {message}")]
    Lock { message: String },
}

impl Error {
    #[must_use]
    pub fn connect(session_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Connect {
            session_id: session_id.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn interrupt(session_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Interrupt {
            session_id: session_id.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn lock_failed(message: impl Into<String>) -> Self {
        Self::Lock {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
