use {
    chatrelay_agent::{PermissionMode, compute_allowed_tools, resolve_permission_mode},
    chatrelay_config::EffectiveConfig,
    serde_json::json,
};

/// Canonical JSON of the config fields that shape a live agent process.
///
/// Two configs with equal fingerprints can share a connection. Fields that
/// only affect the relay (log dir, response length, attachments) are left out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigFingerprint(String);

impl ConfigFingerprint {
    pub fn of(cfg: &EffectiveConfig) -> Self {
        let paths = |p: &[std::path::PathBuf]| -> Vec<String> {
            p.iter().map(|d| d.display().to_string()).collect()
        };
        // Object keys serialize sorted, so the rendering is deterministic.
        let value = json!({
            "model": cfg.model,
            "agent_command": cfg.agent_command,
            "max_turns": cfg.max_turns,
            "system_prompt": cfg.system_prompt,
            "allowed_tools": compute_allowed_tools(cfg, &[]),
            "disallowed_tools": cfg.disallowed_tools,
            "add_dirs": paths(&cfg.add_dirs),
            "permission_mode": resolve_permission_mode(cfg).map(PermissionMode::as_str),
            "cwd": cfg.working_dir().display().to_string(),
            "mcp_config_path": cfg.mcp_config_path.as_ref().map(|p| p.display().to_string()),
        });
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
