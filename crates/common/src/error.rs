use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid session id '{session_id}': {reason}")]
    InvalidSessionId { session_id: String, reason: String },
}

impl Error {
    #[must_use]
    pub fn invalid_session_id(session_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSessionId {
            session_id: session_id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
