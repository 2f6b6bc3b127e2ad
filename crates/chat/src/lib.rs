//! Conversation turns and the adapter entry point.
//!
//! Adapters call [`ChatBackend::send_message_with_session`] with a message and
//! a `<platform>_<local id>` session id. The backend resolves the session's
//! config, reuses or rebuilds its agent connection, runs the turn under the
//! session lock, and appends the exchange to the session's raw log.

pub mod backend;
pub mod error;
pub mod event;
pub mod observer;
pub mod response;
pub mod turn;

pub use {
    backend::{COMPACT_COMMAND, ChatBackend},
    error::{AGENT_ERROR_MARKER, Error, Result},
    event::{EventKind, StreamEvent},
    observer::StreamObserver,
    response::{TRUNCATION_MARKER, clean_response, strip_control, truncate},
    turn::{STREAM_RECEIVE_TIMEOUT, TurnOptions, TurnOutcome, TurnRecord, run_turn},
};
