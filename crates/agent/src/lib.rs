//! Agent subprocess plumbing for chatrelay.
//!
//! - `options`: derive [`AgentOptions`] from an effective config
//! - `client`: the [`AgentClient`] / [`AgentConnector`] seam
//! - `cli_client`: the stdio implementation of that seam
//! - `message`: typed agent output

pub mod cli_client;
pub mod client;
pub mod env;
pub mod error;
pub mod message;
pub mod options;
pub mod permissions;
pub mod prompt;

pub use {
    cli_client::{CliAgentClient, CliConnector},
    client::{AgentClient, AgentConnector},
    error::{Error, Result},
    message::{AgentMessage, ContentBlock, ResultMessage},
    options::{
        AgentOptions, BuildContext, ProcessSnapshot, SettingSource, build_agent_options, user_today,
    },
    permissions::{PermissionMode, compute_allowed_tools, resolve_permission_mode},
    prompt::{DEFAULT_SYSTEM_PROMPT, compose_system_prompt},
};
