//! Shared error definitions and session-id helpers used across all chatrelay crates.

pub mod error;
pub mod session_id;

pub use {
    error::{Error, Result},
    session_id::{SessionId, platform_prefix},
};
