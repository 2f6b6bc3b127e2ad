use thiserror::Error;

/// Marker appended to user-facing agent failures so monitoring can count them.
pub const AGENT_ERROR_MARKER: &str = "[agent-error]";

#[derive(Debug, Error)]
pub enum Error {
    /// The agent connection failed, timed out, or produced nothing usable.
    /// The session has been torn down.
    #[error("agent error: {message}")]
    Agent { message: String },

    /// The session's configuration is missing or invalid.
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("no upload handler for platform '{prefix}' (registered: {})", .known.join(", "))]
    UnsupportedAdapter { prefix: String, known: Vec<String> },

    #[error("upload rejected: {message}")]
    Validation { message: String },

    #[error("upload failed: {message}")]
    Upload { message: String },
}

impl Error {
    #[must_use]
    pub fn agent(message: impl std::fmt::Display) -> Self {
        Self::Agent {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn config(message: impl std::fmt::Display) -> Self {
        Self::Config {
            message: message.to_string(),
        }
    }

    pub fn is_agent_error(&self) -> bool {
        matches!(self, Self::Agent { .. })
    }

    /// Text an adapter can show the end user.
    ///
    /// Agent failures get a short apology carrying [`AGENT_ERROR_MARKER`];
    /// everything else is operator-facing and rendered as-is.
    pub fn user_message(&self) -> String {
        match self {
            Self::Agent { .. } => format!(
                "Sorry, I ran into a problem answering that. Please try again. {AGENT_ERROR_MARKER}"
            ),
            other => other.to_string(),
        }
    }
}

impl From<chatrelay_config::Error> for Error {
    fn from(e: chatrelay_config::Error) -> Self {
        Self::config(e)
    }
}

impl From<chatrelay_sessions::Error> for Error {
    fn from(e: chatrelay_sessions::Error) -> Self {
        match e {
            chatrelay_sessions::Error::Options(inner) => Self::config(inner),
            other => Self::agent(other),
        }
    }
}

impl From<chatrelay_uploads::Error> for Error {
    fn from(e: chatrelay_uploads::Error) -> Self {
        match e {
            chatrelay_uploads::Error::UnsupportedAdapter { prefix, known } => {
                Self::UnsupportedAdapter { prefix, known }
            },
            chatrelay_uploads::Error::Validation { message } => Self::Validation { message },
            other => Self::Upload {
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
