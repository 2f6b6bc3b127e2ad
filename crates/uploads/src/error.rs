use std::error::Error as StdError;

/// Crate-wide result type for upload operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No handler is registered for the session's platform prefix.
    #[error("no upload handler for platform '{prefix}' (registered: {})", .known.join(", "))]
    UnsupportedAdapter { prefix: String, known: Vec<String> },

    /// The file is not acceptable for upload (location, size, type).
    #[error("upload rejected: {message}")]
    Validation { message: String },

    /// The platform call failed.
    #[error("upload failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn unsupported_adapter(prefix: impl Into<String>, known: Vec<String>) -> Self {
        Self::UnsupportedAdapter {
            prefix: prefix.into(),
            known,
        }
    }

    #[must_use]
    pub fn validation(message: impl std::fmt::Display) -> Self {
        Self::Validation {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
