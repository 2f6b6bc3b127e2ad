//! Configuration validation.
//!
//! Hard checks (`check_*`) fail resolution outright. [`validate`] runs the
//! same checks over a whole document and collects them as diagnostics, plus
//! hints for keys that look like misspelled schema fields.

use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    paths,
    provider::LayeredConfigProvider,
    schema::ConfigDocument,
};

/// Inclusive bounds for `max_turns`.
pub const MAX_TURNS_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

// ── Hard checks ─────────────────────────────────────────────────────────────

/// Refuse config sources that are symlinks or writable by everyone.
pub fn check_config_source(path: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| Error::read(path, e))?;
    if meta.file_type().is_symlink() {
        return Err(Error::validation(format!(
            "config file cannot be a symlink: {}",
            path.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o002 != 0 {
            return Err(Error::validation(format!(
                "config file is world-writable: {}",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Resolve and check an initial working directory.
pub fn check_initial_path(field: &str, base: &Path, raw: &Path) -> Result<PathBuf> {
    let resolved = paths::resolve(base, raw);
    if !resolved.exists() {
        return Err(Error::invalid_path(field, raw, "must be an existing directory"));
    }
    if !resolved.is_dir() {
        return Err(Error::invalid_path(field, raw, "must be a directory"));
    }
    if paths::is_system_dir(&resolved) {
        return Err(Error::invalid_path(field, raw, "cannot be in a system directory"));
    }
    Ok(resolved)
}

/// Resolve additional readable directories; each must exist.
pub fn check_add_dirs<'a>(
    field: &str,
    base: &Path,
    dirs: impl IntoIterator<Item = &'a String>,
) -> Result<Vec<PathBuf>> {
    dirs.into_iter()
        .map(|raw| {
            let resolved = paths::resolve(base, Path::new(raw));
            if resolved.is_dir() {
                Ok(resolved)
            } else {
                Err(Error::invalid_path(field, raw, "must be an existing directory"))
            }
        })
        .collect()
}

pub fn check_max_turns(field: &str, value: Option<u32>) -> Result<()> {
    match value {
        Some(n) if !MAX_TURNS_RANGE.contains(&n) => Err(Error::validation(format!(
            "{field} must be between {} and {}, got {n}",
            MAX_TURNS_RANGE.start(),
            MAX_TURNS_RANGE.end()
        ))),
        _ => Ok(()),
    }
}

// ── Diagnostics ─────────────────────────────────────────────────────────────

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "path", "resolve"
    pub category: &'static str,
    /// Dotted path, e.g. "channels.C123.initial_path"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Field names of `global`, including legacy aliases.
const GLOBAL_KEYS: &[&str] = &[
    "project_root",
    "log_dir",
    "history_dir",
    "agent_command",
    "claude_command",
    "max_response_length",
    "system_prompt",
    "model",
    "claude_model",
    "max_turns",
    "claude_max_turns",
    "verbose",
    "claude_verbose",
    "add_dirs",
    "claude_add_dirs",
    "initial_path",
    "claude_initial_path",
    "mcp_config_path",
    "permissions",
    "attachments",
    "log_stream_errors",
    "allowed_tools",
    "claude_allowed_tools",
    "disallowed_tools",
    "claude_disallowed_tools",
    "permission_mode",
];

/// Validate the config file at `path`, or discover one from the current
/// directory when `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| crate::loader::find_config_file(&cwd)),
    };

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: "no config file found".into(),
            }],
            config_path: None,
        };
    };

    let mut diagnostics = Vec::new();
    match crate::loader::load_document(&actual_path) {
        Ok(doc) => {
            check_unknown_fields(&doc, &mut diagnostics);
            check_resolution(doc, &actual_path, &mut diagnostics);
        },
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "syntax",
            path: String::new(),
            message: e.to_string(),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: Some(actual_path),
    }
}

/// Unknown keys land in `extensions`; flag the ones that look like typos.
fn check_unknown_fields(doc: &ConfigDocument, diagnostics: &mut Vec<Diagnostic>) {
    let scopes = std::iter::once(("global".to_string(), &doc.global.extensions)).chain(
        doc.channels
            .iter()
            .map(|(id, ch)| (format!("channels.{id}"), &ch.extensions)),
    );
    for (scope, extensions) in scopes {
        for key in extensions.keys() {
            if let Some(suggestion) = suggest(key, GLOBAL_KEYS, 3) {
                diagnostics.push(Diagnostic {
                    severity: Severity::Warning,
                    category: "unknown-field",
                    path: format!("{scope}.{key}"),
                    message: format!("unknown field, did you mean \"{suggestion}\"?"),
                });
            }
        }
    }
}

/// Resolve the global scope and every channel, reporting each failure.
fn check_resolution(doc: ConfigDocument, path: &Path, diagnostics: &mut Vec<Diagnostic>) {
    let channel_ids: Vec<String> = doc.channels.keys().cloned().collect();
    let provider = match LayeredConfigProvider::from_document(doc, path) {
        Ok(p) => p,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "resolve",
                path: "global".into(),
                message: e.to_string(),
            });
            return;
        },
    };

    if let Err(e) = provider.resolve_global() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "resolve",
            path: "global".into(),
            message: e.to_string(),
        });
    }
    for id in channel_ids {
        if id.starts_with('_') {
            diagnostics.push(Diagnostic {
                severity: Severity::Info,
                category: "resolve",
                path: format!("channels.{id}"),
                message: "ignored (example entry)".into(),
            });
            continue;
        }
        if let Err(e) = provider.resolve_channel(&id) {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: match e {
                    Error::InvalidPath { .. } => "path",
                    _ => "resolve",
                },
                path: format!("channels.{id}"),
                message: e.to_string(),
            });
        }
    }
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance`, excluding exact matches.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, true)]
    #[case(Some(1), true)]
    #[case(Some(100), true)]
    #[case(Some(0), false)]
    #[case(Some(101), false)]
    fn max_turns_bounds(#[case] value: Option<u32>, #[case] ok: bool) {
        assert_eq!(check_max_turns("max_turns", value).is_ok(), ok);
    }

    #[test]
    fn initial_path_must_exist_and_be_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();

        let missing = check_initial_path("initial_path", dir.path(), Path::new("nope"));
        assert!(matches!(missing, Err(Error::InvalidPath { .. })));

        let file = check_initial_path("initial_path", dir.path(), Path::new("file.txt"));
        assert!(file.unwrap_err().to_string().contains("must be a directory"));

        let ok = check_initial_path("initial_path", dir.path(), Path::new(".")).unwrap();
        assert!(ok.is_dir());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn initial_path_rejects_system_dirs() {
        let err = check_initial_path("initial_path", Path::new("/"), Path::new("/etc")).unwrap_err();
        assert!(err.to_string().contains("system directory"));
    }

    #[test]
    fn add_dirs_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        let ok = check_add_dirs("add_dirs", dir.path(), &["docs".to_string()]).unwrap();
        assert_eq!(ok.len(), 1);
        assert!(check_add_dirs("add_dirs", dir.path(), &["missing".to_string()]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn config_source_rejects_symlink_and_world_writable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("chatrelay.yaml");
        std::fs::write(&real, "global: {}\n").unwrap();
        std::fs::set_permissions(&real, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(check_config_source(&real).is_ok());

        let link = dir.path().join("link.yaml");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert!(check_config_source(&link).unwrap_err().to_string().contains("symlink"));

        std::fs::set_permissions(&real, std::fs::Permissions::from_mode(0o666)).unwrap();
        assert!(
            check_config_source(&real)
                .unwrap_err()
                .to_string()
                .contains("world-writable")
        );
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("model", "model"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("modle", "model"), 2);
        assert_eq!(levenshtein("max_turn", "max_turns"), 1);
    }

    #[test]
    fn suggest_finds_close_match() {
        assert_eq!(suggest("max_turn", GLOBAL_KEYS, 3), Some("max_turns"));
        assert_eq!(suggest("sytem_prompt", GLOBAL_KEYS, 3), Some("system_prompt"));
        assert_eq!(suggest("obsidian_allowed_projects", GLOBAL_KEYS, 3), None);
    }

    #[test]
    fn validate_reports_typos_and_bad_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatrelay.yaml");
        std::fs::write(
            &path,
            r#"
global:
  project_root: "."
  max_turn: 5
channels:
  C1:
    initial_path: does-not-exist
  _example:
    model: opus
adapter:
  prefix: slack
  identity: bot
"#,
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        }

        let result = validate(Some(&path));
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "unknown-field" && d.path == "global.max_turn")
        );
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.severity == Severity::Error && d.path == "channels.C1")
        );
        assert_eq!(result.count(Severity::Info), 1);
    }
}
