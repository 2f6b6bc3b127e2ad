//! Live agent sessions.
//!
//! - `registry`: one connection per session id, per-session locks, rebuild on
//!   config fingerprint change
//! - `fingerprint`: the config subset that forces a rebuild
//! - `metadata`: adapter-supplied per-session values
//! - `raw_log`: append-only JSONL turn log

pub mod error;
pub mod fingerprint;
pub mod metadata;
pub mod raw_log;
pub mod registry;

pub use {
    error::{Error, Result},
    fingerprint::ConfigFingerprint,
    metadata::SessionMetadataStore,
    raw_log::{RawEventLog, read_records, request_record, response_record},
    registry::{LiveSession, SessionGuard, SessionRegistry},
};
