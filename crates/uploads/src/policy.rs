//! Path, size and type checks shared by upload handlers.

use std::path::{Path, PathBuf};

use {chatrelay_config::EffectiveConfig, tracing::debug};

use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg", "heic"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg", "flac", "aac", "opus"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi", "m4v"];

/// Which files a handler may upload.
#[derive(Debug, Clone, Default)]
pub struct UploadPolicy {
    allowed_dirs: Vec<PathBuf>,
    max_bytes: Option<u64>,
    /// Lowercase extensions without the dot, or `image`/`audio`/`video`.
    allowed_types: Vec<String>,
}

impl UploadPolicy {
    pub fn new(allowed_dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            allowed_dirs: allowed_dirs.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Directories the session can already read, plus its attachment limits.
    pub fn for_session(cfg: &EffectiveConfig) -> Self {
        let mut dirs = vec![cfg.project_root.clone(), cfg.working_dir().to_path_buf()];
        dirs.extend(cfg.add_dirs.iter().cloned());
        let policy = Self::new(dirs);
        let policy = match cfg.attachments.max_size_mb {
            Some(mb) => policy.with_max_bytes(mb.saturating_mul(1024 * 1024)),
            None => policy,
        };
        policy.with_allowed_types(cfg.attachments.allowed_types.iter().cloned())
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Accepts `pdf`, `.pdf`, `image`, `image/*` and `image/png` forms.
    #[must_use]
    pub fn with_allowed_types(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.allowed_types = types
            .into_iter()
            .filter_map(|t| normalize_type(&t))
            .collect();
        self
    }

    /// Validate `path`, returning its canonical form.
    pub fn check(&self, path: &Path) -> Result<PathBuf> {
        let resolved = std::fs::canonicalize(path)
            .map_err(|_| Error::validation(format!("file not found: {}", path.display())))?;
        let meta = std::fs::metadata(&resolved)?;
        if !meta.is_file() {
            return Err(Error::validation(format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        let inside = self
            .allowed_dirs
            .iter()
            .filter_map(|d| std::fs::canonicalize(d).ok())
            .any(|d| resolved.starts_with(&d));
        if !inside {
            return Err(Error::validation(format!(
                "{} is outside the allowed directories",
                path.display()
            )));
        }

        if let Some(max) = self.max_bytes
            && meta.len() > max
        {
            return Err(Error::validation(format!(
                "{} is {} bytes, limit is {max}",
                path.display(),
                meta.len()
            )));
        }

        if !self.allowed_types.is_empty() && !self.type_allowed(&resolved) {
            return Err(Error::validation(format!(
                "file type of {} is not allowed (allowed: {})",
                path.display(),
                self.allowed_types.join(", ")
            )));
        }

        debug!(path = %resolved.display(), "upload path accepted");
        Ok(resolved)
    }

    fn type_allowed(&self, path: &Path) -> bool {
        let Some(ext) = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
        else {
            return false;
        };
        self.allowed_types.iter().any(|t| match t.as_str() {
            "image" => IMAGE_EXTENSIONS.contains(&ext.as_str()),
            "audio" => AUDIO_EXTENSIONS.contains(&ext.as_str()),
            "video" => VIDEO_EXTENSIONS.contains(&ext.as_str()),
            other => other == ext,
        })
    }
}

fn normalize_type(raw: &str) -> Option<String> {
    let t = raw.trim().trim_start_matches('.').to_ascii_lowercase();
    let t = match t.split_once('/') {
        Some((family, "*")) => family.to_string(),
        Some((_, subtype)) => subtype.to_string(),
        None => t,
    };
    (!t.is_empty()).then_some(t)
}
