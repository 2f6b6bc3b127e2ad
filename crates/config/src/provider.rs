use std::path::{Path, PathBuf};

use {chatrelay_common::SessionId, tracing::debug};

use crate::{
    effective::EffectiveConfig,
    error::{Error, Result},
    loader::{config_dir_of, find_config_file, load_document},
    schema::{AdapterConfig, ConfigDocument},
};

/// Source of per-session configuration. One per adapter.
pub trait ConfigProvider: Send + Sync {
    fn get_session_config(&self, session_id: &str) -> Result<EffectiveConfig>;
}

/// File-backed provider: a global section with per-channel overrides.
#[derive(Debug, Clone)]
pub struct LayeredConfigProvider {
    document: ConfigDocument,
    source: PathBuf,
    config_dir: PathBuf,
}

impl LayeredConfigProvider {
    pub fn load(path: &Path) -> Result<Self> {
        let document = load_document(path)?;
        Self::from_document(document, path)
    }

    /// Find a config file starting at `start` and load it.
    pub fn discover(start: &Path) -> Result<Self> {
        let path = find_config_file(start).ok_or_else(|| Error::NotFound(start.to_path_buf()))?;
        debug!(path = %path.display(), "discovered config file");
        Self::load(&path)
    }

    /// Wrap an already-parsed document. `source` anchors relative paths.
    pub fn from_document(document: ConfigDocument, source: &Path) -> Result<Self> {
        if document.adapter.identity.trim().is_empty() {
            return Err(Error::missing("adapter.identity"));
        }
        Ok(Self {
            config_dir: config_dir_of(source),
            source: source.to_path_buf(),
            document,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn adapter(&self) -> &AdapterConfig {
        &self.document.adapter
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    /// Resolve a session: the local part of the id selects a channel override.
    /// Sessions without an override get the global configuration.
    pub fn resolve(&self, session_id: &str) -> Result<EffectiveConfig> {
        let local = SessionId::parse(session_id)
            .map(|id| id.local().to_string())
            .unwrap_or_else(|_| session_id.to_string());
        if self.document.channels.contains_key(&local) && !local.starts_with('_') {
            self.resolve_channel(&local)
        } else {
            debug!(session = %session_id, "no channel override, using global config");
            self.resolve_global()
        }
    }

    pub fn resolve_global(&self) -> Result<EffectiveConfig> {
        EffectiveConfig::resolve(
            &self.document.global,
            None,
            &self.config_dir,
            &self.document.adapter.identity,
        )
    }

    /// Resolve a named channel. Unknown channels resolve to the global config.
    pub fn resolve_channel(&self, channel_id: &str) -> Result<EffectiveConfig> {
        EffectiveConfig::resolve(
            &self.document.global,
            self.document.channels.get(channel_id),
            &self.config_dir,
            &self.document.adapter.identity,
        )
    }
}

impl ConfigProvider for LayeredConfigProvider {
    fn get_session_config(&self, session_id: &str) -> Result<EffectiveConfig> {
        self.resolve(session_id)
    }
}
