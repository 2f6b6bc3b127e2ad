//! Configuration loading, layered merge, interpolation and validation.
//!
//! Config files: `chatrelay.yaml`, `chatrelay.toml`, or `chatrelay.json`,
//! searched in the starting directory, its parents, then `~/.config/chatrelay/`.
//!
//! String values support `${ENV_VAR}` and `${file:relative/path}`.

pub mod effective;
pub mod error;
pub mod interpolate;
pub mod loader;
pub mod paths;
pub mod provider;
pub mod schema;
pub mod validate;

pub use {
    effective::EffectiveConfig,
    error::{Error, Result},
    loader::{config_dir, find_config_file, load_document},
    provider::{ConfigProvider, LayeredConfigProvider},
    schema::{
        AdapterConfig, AttachmentsConfig, ChannelConfig, ConfigDocument, GlobalConfig,
        Permissions, StringList,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
