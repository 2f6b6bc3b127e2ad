//! The per-session configuration every downstream component consumes.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    error::{Error, Result},
    paths,
    schema::{
        AttachmentsConfig, ChannelConfig, DEFAULT_AGENT_COMMAND, DEFAULT_LOG_DIR,
        DEFAULT_MAX_RESPONSE_LENGTH, GlobalConfig, Permissions, StringList,
    },
    validate::{check_add_dirs, check_initial_path, check_max_turns},
};

/// Fully merged configuration for one session. Every field is present;
/// "unset" is `None` or empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub project_root: PathBuf,
    pub log_dir: PathBuf,
    pub history_dir: PathBuf,
    pub agent_command: String,
    pub max_response_length: usize,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub verbose: bool,
    /// Deprecated allow-list, added to the whitelist.
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub add_dirs: Vec<PathBuf>,
    pub initial_path: Option<PathBuf>,
    pub mcp_config_path: Option<PathBuf>,
    /// Deprecated scalar; `permissions.mode` wins when both are set.
    pub permission_mode: Option<String>,
    pub permissions: Option<Permissions>,
    pub attachments: AttachmentsConfig,
    pub log_stream_errors: bool,
    /// Sender identity of the owning adapter.
    pub identity: String,
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl EffectiveConfig {
    /// Defaults rooted at `project_root`, with nothing else configured.
    pub fn with_defaults(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let log_dir = project_root.join(DEFAULT_LOG_DIR);
        Self {
            history_dir: log_dir.join("history"),
            log_dir,
            project_root,
            agent_command: DEFAULT_AGENT_COMMAND.into(),
            max_response_length: DEFAULT_MAX_RESPONSE_LENGTH,
            system_prompt: None,
            model: None,
            max_turns: None,
            verbose: false,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            add_dirs: Vec::new(),
            initial_path: None,
            mcp_config_path: None,
            permission_mode: None,
            permissions: None,
            attachments: AttachmentsConfig::default(),
            log_stream_errors: false,
            identity: String::new(),
            extensions: BTreeMap::new(),
        }
    }

    /// Merge `channel` over `global`. Relative paths resolve against
    /// `config_dir` (project root) and then the project root.
    pub fn resolve(
        global: &GlobalConfig,
        channel: Option<&ChannelConfig>,
        config_dir: &Path,
        identity: &str,
    ) -> Result<Self> {
        let raw_root = global
            .project_root
            .as_deref()
            .ok_or_else(|| Error::missing("global.project_root"))?;
        let project_root = paths::resolve(config_dir, raw_root);
        if !project_root.is_dir() {
            return Err(Error::invalid_path(
                "project_root",
                raw_root,
                "must be an existing directory",
            ));
        }
        if identity.trim().is_empty() {
            return Err(Error::missing("adapter.identity"));
        }

        check_max_turns("global.max_turns", global.max_turns)?;
        let default_channel = ChannelConfig::default();
        let ch = channel.unwrap_or(&default_channel);
        check_max_turns("channel.max_turns", ch.max_turns)?;

        let log_dir = paths::resolve(
            &project_root,
            global
                .log_dir
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_LOG_DIR)),
        );
        let history_dir = match &global.history_dir {
            Some(p) => paths::resolve(&project_root, p),
            None => log_dir.join("history"),
        };

        let initial_path = match (&ch.initial_path, &global.initial_path) {
            (Some(p), _) => Some(check_initial_path("channel.initial_path", &project_root, p)?),
            (None, Some(p)) => Some(check_initial_path("global.initial_path", &project_root, p)?),
            (None, None) => None,
        };

        let add_dirs_raw = prefer_list(&ch.add_dirs, &global.add_dirs);
        let mut add_dirs = check_add_dirs("add_dirs", &project_root, add_dirs_raw.iter())?;
        if history_dir.is_dir() && !add_dirs.contains(&history_dir) {
            add_dirs.push(history_dir.clone());
        }

        let permissions = match (&ch.permissions, &global.permissions) {
            (Some(specific), fallback) => Some(specific.merge_with(fallback.as_ref())),
            (None, fallback) => fallback.clone(),
        };

        let mut extensions = global.extensions.clone();
        extensions.extend(ch.extensions.clone());

        Ok(Self {
            agent_command: non_empty(None, global.agent_command.as_ref())
                .unwrap_or_else(|| DEFAULT_AGENT_COMMAND.into()),
            max_response_length: ch
                .max_response_length
                .filter(|n| *n > 0)
                .or(global.max_response_length.filter(|n| *n > 0))
                .unwrap_or(DEFAULT_MAX_RESPONSE_LENGTH),
            system_prompt: non_empty(ch.system_prompt.as_ref(), global.system_prompt.as_ref()),
            model: non_empty(ch.model.as_ref(), global.model.as_ref()),
            max_turns: ch.max_turns.or(global.max_turns),
            verbose: ch.verbose.or(global.verbose).unwrap_or(false),
            allowed_tools: prefer_list(&ch.allowed_tools, &global.allowed_tools).into_vec(),
            disallowed_tools: prefer_list(&ch.disallowed_tools, &global.disallowed_tools)
                .into_vec(),
            add_dirs,
            initial_path,
            mcp_config_path: ch
                .mcp_config_path
                .as_ref()
                .or(global.mcp_config_path.as_ref())
                .map(|p| paths::resolve(&project_root, p)),
            permission_mode: non_empty(ch.permission_mode.as_ref(), global.permission_mode.as_ref()),
            permissions,
            attachments: global.attachments.clone(),
            log_stream_errors: ch
                .log_stream_errors
                .or(global.log_stream_errors)
                .unwrap_or(false),
            identity: identity.to_string(),
            extensions,
            project_root,
            log_dir,
            history_dir,
        })
    }

    /// Directory the agent subprocess starts in.
    pub fn working_dir(&self) -> &Path {
        self.initial_path.as_deref().unwrap_or(&self.project_root)
    }
}

fn non_empty(specific: Option<&String>, fallback: Option<&String>) -> Option<String> {
    specific
        .filter(|s| !s.trim().is_empty())
        .or(fallback.filter(|s| !s.trim().is_empty()))
        .cloned()
}

fn prefer_list(specific: &StringList, fallback: &StringList) -> StringList {
    if specific.is_empty() {
        fallback.clone()
    } else {
        specific.clone()
    }
}
