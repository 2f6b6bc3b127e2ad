use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported config format: .{0}")]
    UnsupportedFormat(String),

    #[error("missing required config field: {0}")]
    MissingField(String),

    #[error("invalid path for {field} '{path}': {reason}")]
    InvalidPath {
        field: String,
        path: PathBuf,
        reason: String,
    },

    #[error("config validation failed: {0}")]
    Validation(String),

    #[error("no config file found (searched from {0})")]
    NotFound(PathBuf),
}

impl Error {
    #[must_use]
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    #[must_use]
    pub fn invalid_path(
        field: impl Into<String>,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidPath {
            field: field.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
