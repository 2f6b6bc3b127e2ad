//! McpRegistry: MCP servers declared in a project's agent settings file,
//! narrowed per session by the permissions whitelist.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// Settings file consulted when no explicit path is configured.
pub const DEFAULT_SETTINGS_FILE: &str = ".claude/settings.local.json";

/// Transport type for MCP server connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    #[default]
    Stdio,
    Sse,
    Http,
    /// Served in-process by the relay itself.
    Sdk,
}

/// Configuration for a single MCP server, as the agent expects it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerEntry {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportType>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Server name, only meaningful for `sdk` servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl McpServerEntry {
    /// Entry pointing the agent at an in-process server.
    pub fn sdk(name: impl Into<String>) -> Self {
        Self {
            transport: Some(TransportType::Sdk),
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default, rename = "mcpServers")]
    mcp_servers: Option<BTreeMap<String, McpServerEntry>>,
}

/// Servers declared in one settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpRegistry {
    pub servers: BTreeMap<String, McpServerEntry>,
    path: Option<PathBuf>,
}

impl McpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the settings file lives for a project.
    ///
    /// A configured path is taken relative to `project_root`; a directory means
    /// the default settings file inside it.
    pub fn settings_path(project_root: &Path, configured: Option<&Path>) -> PathBuf {
        match configured {
            Some(p) => {
                let p = if p.is_absolute() {
                    p.to_path_buf()
                } else {
                    project_root.join(p)
                };
                if p.is_dir() {
                    p.join(DEFAULT_SETTINGS_FILE)
                } else {
                    p
                }
            },
            None => project_root.join(DEFAULT_SETTINGS_FILE),
        }
    }

    /// Load from a settings file. A missing file yields an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "MCP settings file not found, using empty");
            return Ok(Self {
                path: Some(path.to_path_buf()),
                ..Default::default()
            });
        }

        let data = std::fs::read_to_string(path).map_err(|e| Error::settings(path, e))?;
        let parsed: SettingsFile =
            serde_json::from_str(&data).map_err(|e| Error::settings(path, e))?;
        Ok(Self {
            servers: parsed.mcp_servers.unwrap_or_default(),
            path: Some(path.to_path_buf()),
        })
    }

    /// Like [`McpRegistry::load`], but an unreadable file is logged and
    /// treated as declaring nothing.
    pub fn load_lenient(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring unreadable MCP settings");
            Self::default()
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Keep only servers named in `whitelist` (case-insensitive).
    ///
    /// An empty whitelist attaches nothing.
    pub fn filter_whitelisted<V>(
        &self,
        whitelist: &BTreeMap<String, V>,
    ) -> BTreeMap<String, McpServerEntry> {
        if whitelist.is_empty() {
            return BTreeMap::new();
        }
        let allowed: Vec<String> = whitelist.keys().map(|k| k.to_lowercase()).collect();
        self.servers
            .iter()
            .filter(|(name, _)| allowed.contains(&name.to_lowercase()))
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }
}

/// Environment variables declared on the given servers. Empty keys and values
/// are skipped; later servers win on conflicts.
pub fn collect_env(servers: &BTreeMap<String, McpServerEntry>) -> BTreeMap<String, String> {
    servers
        .values()
        .flat_map(|entry| entry.env.iter())
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
