//! Connection options for one agent session and how they are derived from
//! an [`EffectiveConfig`].

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    chatrelay_config::EffectiveConfig,
    chatrelay_mcp::{McpRegistry, McpServerEntry, SdkMcpServer, collect_env},
    chrono::{Local, NaiveDate, Utc},
    serde_json::{Map, Value, json},
    tracing::debug,
};

use crate::{
    env::{EnvInputs, USER_TIMEZONE_KEY, build_process_env},
    error::{Error, Result},
    permissions::{PermissionMode, compute_allowed_tools, resolve_permission_mode},
    prompt::compose_system_prompt,
};

/// Directory appended to PATH when present (Apple Silicon Homebrew).
const HOMEBREW_BIN: &str = "/opt/homebrew/bin";

/// Extension key naming the projects MCP servers may touch.
const ALLOWED_PROJECTS_KEY: &str = "obsidian_allowed_projects";

/// Which agent settings files the process may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    User,
    Project,
    Local,
}

impl SettingSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Local => "local",
        }
    }
}

/// Everything needed to start one agent process.
#[derive(Clone, Default)]
pub struct AgentOptions {
    pub cli_path: String,
    pub cwd: PathBuf,
    pub system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub add_dirs: Vec<PathBuf>,
    pub permission_mode: Option<PermissionMode>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    /// Externally launched servers from the project's settings.
    pub mcp_servers: BTreeMap<String, McpServerEntry>,
    /// In-process servers, reached through the control channel.
    pub sdk_servers: Vec<Arc<dyn SdkMcpServer>>,
    pub env: BTreeMap<String, String>,
    pub setting_sources: Vec<SettingSource>,
    pub include_partial_messages: bool,
}

impl fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sdk: Vec<&str> = self.sdk_servers.iter().map(|s| s.name()).collect();
        f.debug_struct("AgentOptions")
            .field("cli_path", &self.cli_path)
            .field("cwd", &self.cwd)
            .field("allowed_tools", &self.allowed_tools)
            .field("disallowed_tools", &self.disallowed_tools)
            .field("add_dirs", &self.add_dirs)
            .field("permission_mode", &self.permission_mode)
            .field("model", &self.model)
            .field("max_turns", &self.max_turns)
            .field("mcp_servers", &self.mcp_servers.keys().collect::<Vec<_>>())
            .field("sdk_servers", &sdk)
            .field("env_vars", &self.env.len())
            .finish_non_exhaustive()
    }
}

impl AgentOptions {
    /// Look up an in-process server by name.
    pub fn sdk_server(&self, name: &str) -> Option<&Arc<dyn SdkMcpServer>> {
        self.sdk_servers.iter().find(|s| s.name() == name)
    }

    /// The `mcpServers` document handed to the agent: declared servers plus
    /// an `sdk` stub per in-process server.
    pub fn mcp_config(&self) -> Value {
        let mut servers = Map::new();
        for (name, entry) in &self.mcp_servers {
            servers.insert(name.clone(), json!(entry));
        }
        for server in &self.sdk_servers {
            servers.insert(server.name().to_string(), json!(McpServerEntry::sdk(server.name())));
        }
        json!({ "mcpServers": servers })
    }

    /// Arguments for a streaming-JSON session. `--verbose` is unconditional:
    /// the agent refuses `stream-json` output without it.
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--output-format",
            "stream-json",
            "--verbose",
            "--input-format",
            "stream-json",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let mut flag = |name: &str, value: String| {
            args.push(name.to_string());
            args.push(value);
        };

        if let Some(prompt) = &self.system_prompt {
            flag("--system-prompt", prompt.clone());
        }
        if !self.allowed_tools.is_empty() {
            flag("--allowedTools", self.allowed_tools.join(","));
        }
        if !self.disallowed_tools.is_empty() {
            flag("--disallowedTools", self.disallowed_tools.join(","));
        }
        if let Some(turns) = self.max_turns {
            flag("--max-turns", turns.to_string());
        }
        if let Some(model) = &self.model {
            flag("--model", model.clone());
        }
        if let Some(mode) = self.permission_mode {
            flag("--permission-mode", mode.to_string());
        }
        for dir in &self.add_dirs {
            flag("--add-dir", dir.display().to_string());
        }
        if !self.mcp_servers.is_empty() || !self.sdk_servers.is_empty() {
            flag("--mcp-config", self.mcp_config().to_string());
        }
        if !self.setting_sources.is_empty() {
            let sources: Vec<&str> = self.setting_sources.iter().map(|s| s.as_str()).collect();
            flag("--setting-sources", sources.join(","));
        }
        if self.include_partial_messages {
            args.push("--include-partial-messages".into());
        }
        args
    }
}

// ── Building options from config ────────────────────────────────────────────

/// Host facts that hold for the life of the process: its environment,
/// where `node` lives, and which optional PATH directories exist.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    pub base_env: BTreeMap<String, String>,
    pub runtime_dir: Option<PathBuf>,
    pub extra_path_dirs: Vec<PathBuf>,
}

impl ProcessSnapshot {
    pub fn capture() -> Self {
        let runtime_dir = which::which("node")
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        let extra_path_dirs = [PathBuf::from(HOMEBREW_BIN)]
            .into_iter()
            .filter(|p| p.is_dir())
            .collect();
        Self {
            base_env: std::env::vars().collect(),
            runtime_dir,
            extra_path_dirs,
        }
    }
}

/// Per-call inputs that do not come from the config file.
#[derive(Clone, Default)]
pub struct BuildContext {
    /// Session metadata supplied by the adapter (timezone, user, ...).
    pub metadata: Map<String, Value>,
    /// In-process servers attached to every session.
    pub builtin_servers: Vec<Arc<dyn SdkMcpServer>>,
    pub base_env: BTreeMap<String, String>,
    /// Companion runtime directory prepended to PATH.
    pub runtime_dir: Option<PathBuf>,
    pub extra_path_dirs: Vec<PathBuf>,
    /// Date used in the system prompt.
    pub today: NaiveDate,
}

impl BuildContext {
    /// Context for one turn on top of a previously captured snapshot. The
    /// date is computed now, in the user's timezone when the metadata
    /// names one.
    pub fn from_snapshot(
        snapshot: &ProcessSnapshot,
        metadata: Map<String, Value>,
        builtin_servers: Vec<Arc<dyn SdkMcpServer>>,
    ) -> Self {
        let today = user_today(user_timezone(&metadata));
        Self {
            metadata,
            builtin_servers,
            base_env: snapshot.base_env.clone(),
            runtime_dir: snapshot.runtime_dir.clone(),
            extra_path_dirs: snapshot.extra_path_dirs.clone(),
            today,
        }
    }

    pub fn user_timezone(&self) -> Option<&str> {
        user_timezone(&self.metadata)
    }
}

fn user_timezone(metadata: &Map<String, Value>) -> Option<&str> {
    metadata
        .get(USER_TIMEZONE_KEY)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Today's date in `tz`, or in the host's local zone when unset or unknown.
pub fn user_today(tz: Option<&str>) -> NaiveDate {
    match tz.and_then(|t| t.parse::<chrono_tz::Tz>().ok()) {
        Some(tz) => Utc::now().with_timezone(&tz).date_naive(),
        None => Local::now().date_naive(),
    }
}

/// The allowed-projects extension, as a string or a list of names.
fn allowed_projects(cfg: &EffectiveConfig) -> Option<String> {
    match cfg.extensions.get(ALLOWED_PROJECTS_KEY)? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let names: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            Some(names.join(","))
        },
        _ => None,
    }
}

/// Derive the connection options for a session.
///
/// Fails only when the working directory is missing; an unreadable MCP
/// settings file attaches no external servers.
pub fn build_agent_options(cfg: &EffectiveConfig, ctx: &BuildContext) -> Result<AgentOptions> {
    let cwd = cfg.working_dir().to_path_buf();
    if !cwd.is_dir() {
        return Err(Error::WorkingDirectory(cwd));
    }

    let builtin_tools: Vec<String> = ctx
        .builtin_servers
        .iter()
        .flat_map(|s| s.qualified_tool_names())
        .collect();
    let allowed_tools = compute_allowed_tools(cfg, &builtin_tools);

    let mcp_servers = match cfg.permissions.as_ref().map(|p| &p.mcp) {
        Some(whitelist) if !whitelist.is_empty() => {
            let path =
                McpRegistry::settings_path(&cfg.project_root, cfg.mcp_config_path.as_deref());
            McpRegistry::load_lenient(&path).filter_whitelisted(whitelist)
        },
        _ => BTreeMap::new(),
    };
    let mcp_env = collect_env(&mcp_servers);
    let allowed_projects = allowed_projects(cfg);

    let env = build_process_env(&cfg.agent_command, &EnvInputs {
        base: &ctx.base_env,
        mcp_env: &mcp_env,
        runtime_dir: ctx.runtime_dir.as_deref(),
        extra_path_dirs: &ctx.extra_path_dirs,
        user_timezone: ctx.user_timezone(),
        allowed_projects: allowed_projects.as_deref(),
    });

    debug!(
        cwd = %cwd.display(),
        tools = allowed_tools.len(),
        mcp_servers = mcp_servers.len(),
        "built agent options"
    );

    Ok(AgentOptions {
        cli_path: cfg.agent_command.clone(),
        cwd,
        system_prompt: Some(compose_system_prompt(cfg.system_prompt.as_deref(), ctx.today)),
        allowed_tools,
        disallowed_tools: cfg.disallowed_tools.clone(),
        add_dirs: cfg.add_dirs.clone(),
        permission_mode: resolve_permission_mode(cfg),
        model: cfg.model.clone(),
        max_turns: cfg.max_turns,
        mcp_servers,
        sdk_servers: ctx.builtin_servers.clone(),
        env,
        setting_sources: vec![SettingSource::Project, SettingSource::Local],
        include_partial_messages: true,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        async_trait::async_trait,
        chatrelay_config::Permissions,
        chatrelay_mcp::{McpToolDef, ToolsCallResult},
    };

    use super::*;

    struct Uploads;

    #[async_trait]
    impl SdkMcpServer for Uploads {
        fn name(&self) -> &str {
            "file-ops"
        }

        fn tools(&self) -> Vec<McpToolDef> {
            vec![McpToolDef {
                name: "upload_file".into(),
                description: None,
                input_schema: json!({"type": "object"}),
            }]
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: Value,
        ) -> chatrelay_mcp::Result<ToolsCallResult> {
            Ok(ToolsCallResult::text("ok"))
        }
    }

    fn ctx() -> BuildContext {
        BuildContext {
            builtin_servers: vec![Arc::new(Uploads)],
            today: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            ..Default::default()
        }
    }

    fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn missing_working_directory_fails() {
        let cfg = EffectiveConfig::with_defaults("/definitely/not/here");
        let err = build_agent_options(&cfg, &ctx()).unwrap_err();
        assert!(matches!(err, Error::WorkingDirectory(_)));
    }

    #[test]
    fn builds_grants_prompt_and_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = EffectiveConfig::with_defaults(dir.path());
        cfg.permissions = Some(Permissions {
            tools: vec!["Read".into()],
            mode: Some("allow".into()),
            ..Default::default()
        });
        cfg.model = Some("sonnet".into());
        cfg.max_turns = Some(7);

        let opts = build_agent_options(&cfg, &ctx()).unwrap();
        assert_eq!(opts.allowed_tools, vec!["Read", "mcp__file-ops__upload_file"]);
        assert_eq!(opts.permission_mode, Some(PermissionMode::BypassPermissions));
        assert!(
            opts.system_prompt
                .as_deref()
                .unwrap()
                .starts_with("Today's date is Thursday, January 1, 2026.")
        );
        assert!(opts.mcp_servers.is_empty());

        let args = opts.to_cli_args();
        assert_eq!(
            flag_value(&args, "--allowedTools"),
            Some("Read,mcp__file-ops__upload_file")
        );
        assert_eq!(flag_value(&args, "--permission-mode"), Some("bypassPermissions"));
        assert_eq!(flag_value(&args, "--model"), Some("sonnet"));
        assert_eq!(flag_value(&args, "--max-turns"), Some("7"));
        assert_eq!(flag_value(&args, "--setting-sources"), Some("project,local"));
        assert!(args.contains(&"--include-partial-messages".to_string()));

        let mcp: Value = serde_json::from_str(flag_value(&args, "--mcp-config").unwrap()).unwrap();
        assert_eq!(mcp["mcpServers"]["file-ops"]["type"], "sdk");
    }

    #[test]
    fn whitelisted_settings_servers_are_attached_with_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
        std::fs::write(
            dir.path().join(".claude/settings.local.json"),
            r#"{"mcpServers": {
                "Search": {"command": "search-mcp", "env": {"SEARCH_KEY": "k"}},
                "other": {"command": "other-mcp", "env": {"OTHER": "x"}}
            }}"#,
        )
        .unwrap();

        let mut cfg = EffectiveConfig::with_defaults(dir.path());
        cfg.permissions = Some(Permissions {
            mcp: [("search".to_string(), vec!["query".to_string()])].into(),
            ..Default::default()
        });

        let opts = build_agent_options(&cfg, &ctx()).unwrap();
        assert_eq!(opts.mcp_servers.keys().collect::<Vec<_>>(), vec!["Search"]);
        assert_eq!(opts.env.get("SEARCH_KEY").map(String::as_str), Some("k"));
        assert!(!opts.env.contains_key("OTHER"));
        assert!(opts.allowed_tools.contains(&"mcp__search__query".to_string()));
    }

    #[test]
    fn malformed_settings_attach_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
        std::fs::write(dir.path().join(".claude/settings.local.json"), "{ nope").unwrap();

        let mut cfg = EffectiveConfig::with_defaults(dir.path());
        cfg.permissions = Some(Permissions {
            mcp: [("search".to_string(), vec!["query".to_string()])].into(),
            ..Default::default()
        });
        let opts = build_agent_options(&cfg, &ctx()).unwrap();
        assert!(opts.mcp_servers.is_empty());
    }

    #[test]
    fn allowed_projects_extension_reaches_the_env() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = EffectiveConfig::with_defaults(dir.path());
        cfg.extensions
            .insert(ALLOWED_PROJECTS_KEY.into(), json!(["notes", "work"]));
        let opts = build_agent_options(&cfg, &ctx()).unwrap();
        assert_eq!(
            opts.env.get("MCP_ALLOWED_PROJECTS").map(String::as_str),
            Some("notes,work")
        );

        cfg.extensions
            .insert(ALLOWED_PROJECTS_KEY.into(), json!("notes"));
        let opts = build_agent_options(&cfg, &ctx()).unwrap();
        assert_eq!(
            opts.env.get("MCP_ALLOWED_PROJECTS").map(String::as_str),
            Some("notes")
        );

        cfg.extensions.clear();
        let opts = build_agent_options(&cfg, &ctx()).unwrap();
        assert!(!opts.env.contains_key("MCP_ALLOWED_PROJECTS"));
    }

    #[test]
    fn snapshot_context_keeps_host_facts() {
        let snapshot = ProcessSnapshot {
            base_env: [("PATH".to_string(), "/usr/bin".to_string())].into(),
            runtime_dir: Some(PathBuf::from("/opt/node/bin")),
            extra_path_dirs: vec![],
        };
        let mut metadata = Map::new();
        metadata.insert(USER_TIMEZONE_KEY.into(), json!("Asia/Tokyo"));

        let ctx = BuildContext::from_snapshot(&snapshot, metadata, vec![]);
        assert_eq!(ctx.base_env, snapshot.base_env);
        assert_eq!(ctx.runtime_dir, snapshot.runtime_dir);
        assert_eq!(ctx.user_timezone(), Some("Asia/Tokyo"));
        assert_eq!(ctx.today, user_today(Some("Asia/Tokyo")));
    }

    #[test]
    fn stream_json_always_runs_verbose() {
        let args = AgentOptions::default().to_cli_args();
        assert_eq!(flag_value(&args, "--output-format"), Some("stream-json"));
        assert!(args.contains(&"--verbose".to_string()));
    }

    #[test]
    fn unknown_timezone_falls_back_to_local() {
        assert_eq!(user_today(Some("Not/AZone")), Local::now().date_naive());
    }
}
