use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    error::{Error, Result},
    interpolate::interpolate_value,
    schema::ConfigDocument,
    validate::check_config_source,
};

/// Standard config file names, checked in order.
pub const CONFIG_FILENAMES: &[&str] = &[
    "chatrelay.yaml",
    "chatrelay.yml",
    "chatrelay.toml",
    "chatrelay.json",
];

/// Load a config document from the given path (any supported format).
///
/// The source is checked first (no symlinks, not world-writable), then parsed,
/// then every string value is interpolated relative to the file's directory.
pub fn load_document(path: &Path) -> Result<ConfigDocument> {
    check_config_source(path)?;
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    let value = parse_config_value(&raw, path)?;
    let value = interpolate_value(value, &config_dir_of(path))?;
    debug!(path = %path.display(), "loaded config document");
    serde_json::from_value(value).map_err(|e| Error::parse(path, e))
}

/// Search `start` and each of its parents, then the user config directory.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    for dir in start.ancestors() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.is_file() {
                return Some(p);
            }
        }
    }

    let user_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| user_dir.join(name))
        .find(|p| p.is_file())
}

/// Returns the user-global config directory (`~/.config/chatrelay/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "chatrelay").map(|d| d.config_dir().to_path_buf())
}

/// Directory relative paths in a document resolve against.
pub fn config_dir_of(path: &Path) -> PathBuf {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf())
}

fn parse_config_value(raw: &str, path: &Path) -> Result<serde_json::Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("yaml");

    match ext {
        "toml" => {
            let v: toml::Value = toml::from_str(raw).map_err(|e| Error::parse(path, e))?;
            serde_json::to_value(v).map_err(|e| Error::parse(path, e))
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value =
                serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e))?;
            // An empty YAML file parses to null.
            if v.is_null() {
                return Ok(serde_json::Value::Object(Default::default()));
            }
            serde_json::to_value(v).map_err(|e| Error::parse(path, e))
        },
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        _ => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, body).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o600)).unwrap();
        }
        p
    }

    #[test]
    fn loads_yaml_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = write(
            dir.path(),
            "a.yaml",
            "global:\n  model: sonnet\nadapter:\n  prefix: slack\n  identity: bot\n",
        );
        let toml = write(
            dir.path(),
            "b.toml",
            "[global]\nmodel = \"sonnet\"\n[adapter]\nprefix = \"rcs\"\nidentity = \"+1555\"\n",
        );
        let json = write(
            dir.path(),
            "c.json",
            r#"{"global": {"model": "sonnet"}, "adapter": {"prefix": "http", "identity": "ios"}}"#,
        );

        for (path, prefix) in [(yaml, "slack"), (toml, "rcs"), (json, "http")] {
            let doc = load_document(&path).unwrap();
            assert_eq!(doc.global.model.as_deref(), Some("sonnet"));
            assert_eq!(doc.adapter.prefix, prefix);
        }
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "config.ini", "x=1");
        assert!(matches!(
            load_document(&p),
            Err(Error::UnsupportedFormat(ext)) if ext == "ini"
        ));
    }

    #[test]
    fn interpolates_file_references_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "prompt.md", "Be brief.\n");
        let p = write(
            dir.path(),
            "chatrelay.yaml",
            "global:\n  system_prompt: \"${file:prompt.md}\"\n",
        );
        let doc = load_document(&p).unwrap();
        assert_eq!(doc.global.system_prompt.as_deref(), Some("Be brief."));
    }

    #[test]
    fn empty_yaml_is_default_document() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "chatrelay.yaml", "");
        let doc = load_document(&p).unwrap();
        assert!(doc.channels.is_empty());
    }

    #[test]
    fn discovery_walks_up_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let p = write(dir.path(), "chatrelay.yml", "global: {}\n");

        assert_eq!(find_config_file(&nested), Some(p));
    }
}
