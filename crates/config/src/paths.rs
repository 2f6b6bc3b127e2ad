use std::path::{Component, Path, PathBuf};

/// Directories a working directory may never live under.
pub const SYSTEM_DIR_DENYLIST: &[&str] = &["/etc", "/usr", "/bin", "/sbin", "/boot", "/sys", "/proc"];

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match dirs_next::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

/// Resolve `path` against `base`, expanding `~` and following symlinks when
/// the target exists.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    let expanded = expand_home(path);
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    std::fs::canonicalize(&joined).unwrap_or(joined)
}

/// Whether a resolved path sits in one of [`SYSTEM_DIR_DENYLIST`].
pub fn is_system_dir(path: &Path) -> bool {
    SYSTEM_DIR_DENYLIST
        .iter()
        .any(|denied| path.starts_with(denied))
}
