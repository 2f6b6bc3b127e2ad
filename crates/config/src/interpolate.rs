//! `${file:path}` and `${ENV_VAR}` placeholders in config string values.

use std::path::Path;

use crate::error::{Error, Result};

/// Largest file a `${file:...}` reference may pull in.
pub const MAX_FILE_REFERENCE_BYTES: u64 = 1024 * 1024;

const FILE_PREFIX: &str = "file:";

/// Interpolate every string inside a parsed config tree.
pub fn interpolate_value(value: serde_json::Value, config_dir: &Path) -> Result<serde_json::Value> {
    use serde_json::Value;

    Ok(match value {
        Value::String(s) => Value::String(interpolate(&s, config_dir)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| interpolate_value(v, config_dir))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| Ok((k, interpolate_value(v, config_dir)?)))
                .collect::<Result<_>>()?,
        ),
        other => other,
    })
}

/// Replace `${file:...}` with file contents and `${VAR}` with environment values.
///
/// File references resolve against `config_dir`. Unresolvable variables are
/// left as-is; unreadable or oversized files are an error.
pub fn interpolate(input: &str, config_dir: &Path) -> Result<String> {
    interpolate_with(input, config_dir, |name| std::env::var(name).ok())
}

/// Implementation behind [`interpolate`]; the lookup is injectable so tests
/// need not mutate the process environment.
fn interpolate_with(
    input: &str,
    config_dir: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if closed && !name.is_empty() {
                if let Some(reference) = name.strip_prefix(FILE_PREFIX) {
                    result.push_str(&read_file_reference(reference.trim(), config_dir)?);
                    continue;
                }
                match lookup(&name) {
                    Some(val) => result.push_str(&val),
                    None => {
                        result.push_str("${");
                        result.push_str(&name);
                        result.push('}');
                    },
                }
            } else {
                // Malformed, emit literal.
                result.push_str("${");
                result.push_str(&name);
            }
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn read_file_reference(reference: &str, config_dir: &Path) -> Result<String> {
    let fail = |reason: String| Error::validation(format!("${{file:{reference}}}: {reason}"));

    let path = config_dir.join(crate::paths::expand_home(Path::new(reference)));
    let meta = std::fs::metadata(&path).map_err(|e| fail(format!("file not found ({e})")))?;
    if !meta.is_file() {
        return Err(fail("path is not a regular file".into()));
    }
    if meta.len() > MAX_FILE_REFERENCE_BYTES {
        return Err(fail(format!(
            "file too large ({} bytes, max {MAX_FILE_REFERENCE_BYTES})",
            meta.len()
        )));
    }
    let content = std::fs::read_to_string(&path).map_err(|e| fail(e.to_string()))?;
    Ok(content.trim_end().to_string())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn substitutes_known_var() {
        let lookup = |name: &str| match name {
            "CHATRELAY_TEST_VAR" => Some("hello".to_string()),
            _ => None,
        };
        assert_eq!(
            interpolate_with("key=${CHATRELAY_TEST_VAR}", Path::new("."), lookup).unwrap(),
            "key=hello"
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            interpolate_with("${CHATRELAY_NONEXISTENT_XYZ}", Path::new("."), no_env).unwrap(),
            "${CHATRELAY_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(
            interpolate_with("plain text", Path::new("."), no_env).unwrap(),
            "plain text"
        );
    }

    #[test]
    fn file_reference_reads_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("prompt.md"), "You are helpful.\n\n").unwrap();

        let out = interpolate_with("[${file:prompt.md}]", dir.path(), no_env).unwrap();
        assert_eq!(out, "[You are helpful.]");
    }

    #[test]
    fn file_reference_missing_is_error_naming_reference() {
        let dir = tempfile::tempdir().unwrap();
        let err = interpolate_with("${file:nope.md}", dir.path(), no_env).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("nope.md"));
    }

    #[test]
    fn file_reference_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let err = interpolate_with("${file:sub}", dir.path(), no_env).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn file_reference_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let big = vec![b'a'; (MAX_FILE_REFERENCE_BYTES + 1) as usize];
        std::fs::write(dir.path().join("big.txt"), big).unwrap();
        let err = interpolate_with("${file:big.txt}", dir.path(), no_env).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn interpolates_nested_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p.txt"), "from file").unwrap();
        let value = serde_json::json!({
            "global": { "system_prompt": "${file:p.txt}", "max_turns": 3 },
            "list": ["${file:p.txt}"],
        });
        let out = interpolate_value(value, dir.path()).unwrap();
        assert_eq!(out["global"]["system_prompt"], "from file");
        assert_eq!(out["global"]["max_turns"], 3);
        assert_eq!(out["list"][0], "from file");
    }
}
