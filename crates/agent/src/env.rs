//! Process environment for the agent subprocess.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    path::{Path, PathBuf},
};

use tracing::warn;

/// Variable the agent CLI reads to locate its own executable.
pub const AGENT_EXECUTABLE_ENV: &str = "CLAUDE_CODE_EXECUTABLE";

/// Session metadata key carrying the user's IANA timezone.
pub const USER_TIMEZONE_KEY: &str = "user_timezone";

/// Variable MCP servers read to scope which projects they may touch.
pub const MCP_ALLOWED_PROJECTS_ENV: &str = "MCP_ALLOWED_PROJECTS";

static EMPTY_ENV: BTreeMap<String, String> = BTreeMap::new();

/// Inputs beyond the config that shape the environment.
#[derive(Debug, Clone)]
pub struct EnvInputs<'a> {
    /// Inherited environment snapshot.
    pub base: &'a BTreeMap<String, String>,
    /// Env declared on whitelisted MCP servers.
    pub mcp_env: &'a BTreeMap<String, String>,
    /// Directory of a located companion runtime (node), prepended to PATH.
    pub runtime_dir: Option<&'a Path>,
    /// Extra directories appended to PATH when missing.
    pub extra_path_dirs: &'a [PathBuf],
    pub user_timezone: Option<&'a str>,
    /// Comma-separated project names exported to MCP servers.
    pub allowed_projects: Option<&'a str>,
}

impl Default for EnvInputs<'_> {
    fn default() -> Self {
        Self {
            base: &EMPTY_ENV,
            mcp_env: &EMPTY_ENV,
            runtime_dir: None,
            extra_path_dirs: &[],
            user_timezone: None,
            allowed_projects: None,
        }
    }
}

/// Inherited env, plus MCP server env, plus PATH amendments and timezone.
///
/// A server's own `MCP_ALLOWED_PROJECTS` wins over the configured projects.
pub fn build_process_env(agent_command: &str, inputs: &EnvInputs<'_>) -> BTreeMap<String, String> {
    let mut env = inputs.base.clone();
    if let Some(projects) = inputs.allowed_projects.map(str::trim).filter(|p| !p.is_empty()) {
        env.insert(MCP_ALLOWED_PROJECTS_ENV.into(), projects.to_string());
    }
    env.extend(
        inputs
            .mcp_env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    let original_path = env.get("PATH").cloned().unwrap_or_default();
    let mut parts: Vec<PathBuf> = if original_path.is_empty() {
        Vec::new()
    } else {
        std::env::split_paths(&original_path).collect()
    };

    let command = agent_command.trim();
    if command.contains('/') {
        let cmd_path = chatrelay_config::paths::expand_home(Path::new(command));
        let cmd_path = std::fs::canonicalize(&cmd_path).unwrap_or(cmd_path);
        if let Some(dir) = cmd_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            prepend_unique(&mut parts, dir.to_path_buf());
        }
        env.entry(AGENT_EXECUTABLE_ENV.to_string())
            .or_insert_with(|| cmd_path.display().to_string());
    }

    if let Some(dir) = inputs.runtime_dir {
        prepend_unique(&mut parts, dir.to_path_buf());
    }
    for dir in inputs.extra_path_dirs {
        if !parts.contains(dir) {
            parts.push(dir.clone());
        }
    }

    if !parts.is_empty() {
        match std::env::join_paths(&parts).map(OsString::into_string) {
            Ok(Ok(joined)) => {
                env.insert("PATH".into(), joined);
            },
            _ => warn!("could not rebuild PATH, keeping inherited value"),
        }
    }

    if let Some(tz) = inputs.user_timezone.map(str::trim).filter(|t| !t.is_empty()) {
        env.insert("TZ".into(), tz.to_string());
        env.insert("USER_TIMEZONE".into(), tz.to_string());
    }

    env
}

fn prepend_unique(parts: &mut Vec<PathBuf>, dir: PathBuf) {
    if !parts.contains(&dir) {
        parts.insert(0, dir);
    }
}
