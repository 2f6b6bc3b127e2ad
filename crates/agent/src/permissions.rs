//! Whitelist-derived tool grants and permission modes.

use std::{fmt, str::FromStr};

use {
    chatrelay_config::EffectiveConfig,
    chatrelay_mcp::qualified_tool_name,
    serde::{Deserialize, Serialize},
};

/// How the agent asks before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    Plan,
    AcceptEdits,
    BypassPermissions,
}

impl PermissionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Plan => "plan",
            Self::AcceptEdits => "acceptEdits",
            Self::BypassPermissions => "bypassPermissions",
        }
    }

    /// Parse a configured mode, accepting the `ask`/`allow`/`deny` aliases.
    ///
    /// Anything unrecognised is `None`, meaning the agent's own default.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "ask" => Some(Self::Default),
            "allow" => Some(Self::BypassPermissions),
            "deny" => Some(Self::Plan),
            _ => raw.parse().ok(),
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "plan" => Ok(Self::Plan),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            other => Err(format!("unknown permission mode: {other}")),
        }
    }
}

/// Effective mode: whitelist mode, else the deprecated scalar, then aliasing.
pub fn resolve_permission_mode(cfg: &EffectiveConfig) -> Option<PermissionMode> {
    let raw = cfg
        .permissions
        .as_ref()
        .and_then(|p| p.mode.as_deref())
        .filter(|m| !m.trim().is_empty())
        .or(cfg.permission_mode.as_deref())?;
    PermissionMode::parse_lenient(raw)
}

/// Every tool the agent may use, first-seen order, no duplicates.
///
/// Whitelisted tools, then `mcp__<server>__<tool>` for each whitelisted MCP
/// pair, then the deprecated allow-list, then `always_granted`.
pub fn compute_allowed_tools(cfg: &EffectiveConfig, always_granted: &[String]) -> Vec<String> {
    let mut allowed: Vec<String> = Vec::new();
    let mut push = |tool: String| {
        let tool = tool.trim().to_string();
        if !tool.is_empty() && !allowed.contains(&tool) {
            allowed.push(tool);
        }
    };

    if let Some(perms) = &cfg.permissions {
        perms.tools.iter().cloned().for_each(&mut push);
        for (server, tools) in &perms.mcp {
            for tool in tools.iter().filter(|t| !t.trim().is_empty()) {
                push(qualified_tool_name(server, tool.trim()));
            }
        }
    }
    cfg.allowed_tools.iter().cloned().for_each(&mut push);
    always_granted.iter().cloned().for_each(&mut push);

    allowed
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use {chatrelay_config::Permissions, rstest::rstest};

    use super::*;

    fn cfg_with(perms: Option<Permissions>) -> EffectiveConfig {
        let mut cfg = EffectiveConfig::with_defaults("/tmp");
        cfg.permissions = perms;
        cfg
    }

    #[rstest]
    #[case("allow", Some(PermissionMode::BypassPermissions))]
    #[case("ASK", Some(PermissionMode::Default))]
    #[case("deny", Some(PermissionMode::Plan))]
    #[case("acceptEdits", Some(PermissionMode::AcceptEdits))]
    #[case(" plan ", Some(PermissionMode::Plan))]
    #[case("nonsense", None)]
    #[case("", None)]
    fn mode_aliases(#[case] raw: &str, #[case] expected: Option<PermissionMode>) {
        assert_eq!(PermissionMode::parse_lenient(raw), expected);
    }

    #[test]
    fn whitelist_mode_beats_deprecated_scalar() {
        let mut cfg = cfg_with(Some(Permissions {
            mode: Some("deny".into()),
            ..Default::default()
        }));
        cfg.permission_mode = Some("allow".into());
        assert_eq!(resolve_permission_mode(&cfg), Some(PermissionMode::Plan));

        cfg.permissions = None;
        assert_eq!(
            resolve_permission_mode(&cfg),
            Some(PermissionMode::BypassPermissions)
        );
    }

    #[test]
    fn allowed_tools_are_exactly_the_whitelist() {
        let cfg = cfg_with(Some(Permissions {
            tools: vec!["Read".into()],
            mcp: [("search".to_string(), vec!["query".to_string()])].into(),
            mode: None,
        }));
        let upload = "mcp__file-ops__upload_file".to_string();

        let got: HashSet<String> = compute_allowed_tools(&cfg, &[upload.clone()])
            .into_iter()
            .collect();
        let want: HashSet<String> = ["Read".to_string(), "mcp__search__query".to_string(), upload]
            .into_iter()
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn allowed_tools_dedupe_in_first_seen_order() {
        let mut cfg = cfg_with(Some(Permissions {
            tools: vec!["Read".into(), "Grep".into()],
            ..Default::default()
        }));
        cfg.allowed_tools = vec!["Grep".into(), "WebSearch".into(), "Read".into()];

        assert_eq!(
            compute_allowed_tools(&cfg, &["Read".into()]),
            vec!["Read", "Grep", "WebSearch"]
        );
    }

    #[test]
    fn no_permissions_grants_only_builtins() {
        let cfg = cfg_with(None);
        assert_eq!(
            compute_allowed_tools(&cfg, &["mcp__file-ops__upload_file".into()]),
            vec!["mcp__file-ops__upload_file"]
        );
    }
}
