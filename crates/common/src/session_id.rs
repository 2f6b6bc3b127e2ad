//! Composite session identifiers: `<platform prefix>_<platform-local id>`.
//!
//! Adapters build ids such as `slack_C123`, `rcs_15551234567` or `http_default`.
//! The prefix selects the upload handler and the config document; the local
//! part selects the channel-level override inside that document.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between platform prefix and platform-local id.
pub const SEPARATOR: char = '_';

/// Platform prefix of a session id: the text before the first separator.
///
/// An id without a separator is its own prefix.
pub fn platform_prefix(session_id: &str) -> &str {
    session_id
        .split_once(SEPARATOR)
        .map_or(session_id, |(prefix, _)| prefix)
}

/// A parsed, validated session id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Parse a composite id. Both halves must be non-empty.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        match raw.split_once(SEPARATOR) {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => Ok(Self(raw)),
            Some(_) => Err(Error::invalid_session_id(
                raw,
                "prefix and local id must both be non-empty",
            )),
            None => Err(Error::invalid_session_id(
                raw,
                format!("expected '<platform>{SEPARATOR}<id>'"),
            )),
        }
    }

    /// Build an id from its parts.
    pub fn from_parts(prefix: &str, local: &str) -> Result<Self> {
        Self::parse(format!("{prefix}{SEPARATOR}{local}"))
    }

    pub fn prefix(&self) -> &str {
        platform_prefix(&self.0)
    }

    /// Platform-local part (channel id, phone number, device id).
    pub fn local(&self) -> &str {
        self.0
            .split_once(SEPARATOR)
            .map_or("", |(_, local)| local)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("slack_C123", "slack")]
    #[case("rcs_555", "rcs")]
    #[case("http_ios_device_1", "http")]
    #[case("standalone", "standalone")]
    #[case("", "")]
    fn prefix_is_text_before_first_separator(#[case] id: &str, #[case] expected: &str) {
        assert_eq!(platform_prefix(id), expected);
    }

    #[test]
    fn parse_splits_on_first_separator_only() {
        let id = SessionId::parse("http_ios_device_1").unwrap();
        assert_eq!(id.prefix(), "http");
        assert_eq!(id.local(), "ios_device_1");
    }

    #[rstest]
    #[case("nounderscore")]
    #[case("_C123")]
    #[case("slack_")]
    fn parse_rejects_incomplete_ids(#[case] raw: &str) {
        assert!(matches!(
            SessionId::parse(raw),
            Err(Error::InvalidSessionId { .. })
        ));
    }

    #[test]
    fn serde_goes_through_validation() {
        let ok: SessionId = serde_json::from_str("\"slack_D1\"").unwrap();
        assert_eq!(ok.as_str(), "slack_D1");
        assert!(serde_json::from_str::<SessionId>("\"bogus\"").is_err());
    }
}
