//! MCP (Model Context Protocol) support for chatrelay.
//!
//! This crate provides:
//! - Servers declared in a project's agent settings file, filtered by the
//!   per-session whitelist (`registry`)
//! - In-process MCP servers and their JSON-RPC dispatcher (`sdk`)
//! - Protocol types (`types`)

pub mod error;
pub mod registry;
pub mod sdk;
pub mod types;

pub use {
    error::{Error, Result},
    registry::{McpRegistry, McpServerEntry, TransportType, collect_env},
    sdk::{SdkMcpServer, dispatch, qualified_tool_name},
    types::{McpToolDef, ToolContent, ToolsCallResult},
};
