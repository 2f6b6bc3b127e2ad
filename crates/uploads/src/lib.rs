//! Agent-initiated file uploads.
//!
//! Adapters register a [`FileUploadHandler`] per platform prefix on the
//! [`UploadRouter`]; the agent reaches the router through the built-in
//! `file-ops` MCP server ([`FileOpsServer`]).

pub mod error;
pub mod handler;
pub mod policy;
pub mod router;
pub mod tool;

pub use {
    error::{Error, Result},
    handler::{FileUploadHandler, UploadRequest, UploadResult},
    policy::UploadPolicy,
    router::{THREAD_TS_KEY, UploadRouter},
    tool::{FILE_OPS_SERVER, FileOpsServer, UPLOAD_FILE_TOOL, upload_tool_name},
};
