//! Config document types: a `global` section, per-channel overrides keyed by
//! platform-local id, and the owning adapter's identity.
//!
//! Field names follow the current schema; the older `claude_*` spellings are
//! accepted as aliases so existing documents keep loading.

use std::{collections::BTreeMap, fmt, path::PathBuf};

use serde::{Deserialize, Deserializer, Serialize, de};

/// Default agent executable.
pub const DEFAULT_AGENT_COMMAND: &str = "claude";
/// Default ceiling for a single response, in characters.
pub const DEFAULT_MAX_RESPONSE_LENGTH: usize = 3900;
/// Default log directory, relative to the project root.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Root of a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    pub global: GlobalConfig,
    pub channels: BTreeMap<String, ChannelConfig>,
    pub adapter: AdapterConfig,
}

/// Which adapter owns this document and the identity it speaks as.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Session-id prefix this document serves (`slack`, `rcs`, `http`).
    pub prefix: String,
    /// Sender or channel identity: bot user, phone number, API client name.
    pub identity: String,
    /// Adapter-private settings, passed through untouched.
    pub settings: BTreeMap<String, serde_json::Value>,
}

/// Whitelist-only permissions. Anything not listed is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    pub tools: Vec<String>,
    /// MCP server name to the tools allowed on it.
    pub mcp: BTreeMap<String, Vec<String>>,
    pub mode: Option<String>,
}

impl Permissions {
    /// Merge `self` (the more specific side) over `fallback`, field by field.
    ///
    /// An empty field on `self` takes the fallback's value for that field only.
    #[must_use]
    pub fn merge_with(&self, fallback: Option<&Permissions>) -> Permissions {
        let Some(fallback) = fallback else {
            return self.clone();
        };
        Permissions {
            tools: if self.tools.is_empty() {
                fallback.tools.clone()
            } else {
                self.tools.clone()
            },
            mcp: if self.mcp.is_empty() {
                fallback.mcp.clone()
            } else {
                self.mcp.clone()
            },
            mode: self
                .mode
                .clone()
                .filter(|m| !m.trim().is_empty())
                .or_else(|| fallback.mode.clone()),
        }
    }
}

/// Attachment limits handed to upload handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentsConfig {
    pub max_size_mb: Option<u64>,
    /// Extensions (`.pdf`, `png`) or families (`image`, `audio`, `video`).
    pub allowed_types: StringList,
}

/// Global defaults for every session served by a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub project_root: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub history_dir: Option<PathBuf>,
    #[serde(alias = "claude_command")]
    pub agent_command: Option<String>,
    pub max_response_length: Option<usize>,
    pub system_prompt: Option<String>,
    #[serde(alias = "claude_model")]
    pub model: Option<String>,
    #[serde(alias = "claude_max_turns")]
    pub max_turns: Option<u32>,
    #[serde(alias = "claude_verbose")]
    pub verbose: Option<bool>,
    #[serde(alias = "claude_add_dirs")]
    pub add_dirs: StringList,
    #[serde(alias = "claude_initial_path")]
    pub initial_path: Option<PathBuf>,
    pub mcp_config_path: Option<PathBuf>,
    pub permissions: Option<Permissions>,
    pub attachments: AttachmentsConfig,
    pub log_stream_errors: Option<bool>,

    // Deprecated, additive only.
    #[serde(alias = "claude_allowed_tools")]
    pub allowed_tools: StringList,
    #[serde(alias = "claude_disallowed_tools")]
    pub disallowed_tools: StringList,
    pub permission_mode: Option<String>,

    /// Platform-specific keys this schema does not know about.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

/// Per-channel overrides. Every field is optional; unset fields inherit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub system_prompt: Option<String>,
    #[serde(alias = "claude_model")]
    pub model: Option<String>,
    #[serde(alias = "claude_max_turns")]
    pub max_turns: Option<u32>,
    #[serde(alias = "claude_verbose")]
    pub verbose: Option<bool>,
    #[serde(alias = "claude_add_dirs")]
    pub add_dirs: StringList,
    #[serde(alias = "claude_initial_path")]
    pub initial_path: Option<PathBuf>,
    pub mcp_config_path: Option<PathBuf>,
    pub max_response_length: Option<usize>,
    pub permissions: Option<Permissions>,
    pub log_stream_errors: Option<bool>,

    #[serde(alias = "claude_allowed_tools")]
    pub allowed_tools: StringList,
    #[serde(alias = "claude_disallowed_tools")]
    pub disallowed_tools: StringList,
    pub permission_mode: Option<String>,

    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

// ── StringList ──────────────────────────────────────────────────────────────

/// A list that also accepts the legacy comma-separated string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StringList(pub Vec<String>);

impl StringList {
    /// Split a comma-separated string, trimming entries and dropping empties.
    pub fn from_csv(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for StringList {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = StringList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of strings or a comma-separated string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<StringList, E> {
                Ok(StringList::from_csv(v))
            }

            fn visit_unit<E: de::Error>(self) -> Result<StringList, E> {
                Ok(StringList::default())
            }

            fn visit_none<E: de::Error>(self) -> Result<StringList, E> {
                Ok(StringList::default())
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<StringList, D::Error> {
                d.deserialize_any(self)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<StringList, A::Error> {
                let mut out = Vec::new();
                while let Some(item) = seq.next_element::<String>()? {
                    let item = item.trim();
                    if !item.is_empty() {
                        out.push(item.to_string());
                    }
                }
                Ok(StringList(out))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}
