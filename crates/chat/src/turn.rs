//! One request/response exchange with an agent connection.

use std::time::Duration;

use {
    chatrelay_agent::{AgentClient, AgentMessage},
    futures::StreamExt,
    tracing::{debug, warn},
};

use crate::{event::StreamEvent, observer::StreamObserver, response::clean_response};

/// Longest wait for the next stream item before the turn is abandoned.
pub const STREAM_RECEIVE_TIMEOUT: Duration = Duration::from_secs(180);

/// Per-turn knobs taken from the session config.
#[derive(Debug, Clone, Copy)]
pub struct TurnOptions {
    pub per_item_timeout: Duration,
    pub max_response_length: usize,
    /// Log observer failures at `warn` instead of `debug`.
    pub log_stream_errors: bool,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            per_item_timeout: STREAM_RECEIVE_TIMEOUT,
            max_response_length: chatrelay_config::schema::DEFAULT_MAX_RESPONSE_LENGTH,
            log_stream_errors: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Cleaned, non-empty response text.
    Completed(String),
    /// No stream item arrived within the per-item timeout.
    TimedOut(Duration),
    /// The message could not be submitted.
    SendFailed(String),
    /// The response stream reported an error.
    StreamFailed(String),
    /// The stream finished without usable text.
    Empty(String),
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Failures after which the connection cannot be trusted.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::TimedOut(_) | Self::SendFailed(_) | Self::StreamFailed(_)
        )
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Completed(_) => "completed".into(),
            Self::TimedOut(after) => {
                format!("no response from agent within {}s", after.as_secs())
            },
            Self::SendFailed(e) => format!("failed to send message: {e}"),
            Self::StreamFailed(e) => format!("response stream failed: {e}"),
            Self::Empty(e) => e.clone(),
        }
    }
}

/// Everything observed during a turn, for logging and for the caller.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub events: Vec<StreamEvent>,
    pub outcome: TurnOutcome,
    /// Conversation id reported by the agent, if any.
    pub upstream_session_id: Option<String>,
}

/// Send `message` and consume the response.
///
/// `Idle → Sent → Streaming → {Completed | TimedOut | Failed}`. Never
/// returns early on observer failure.
pub async fn run_turn(
    client: &dyn AgentClient,
    message: &str,
    observer: Option<&dyn StreamObserver>,
    options: &TurnOptions,
) -> TurnRecord {
    let mut record = TurnRecord {
        events: Vec::new(),
        outcome: TurnOutcome::Empty(String::new()),
        upstream_session_id: None,
    };

    if let Err(e) = client.query(message).await {
        record.outcome = TurnOutcome::SendFailed(e.to_string());
        return record;
    }

    let mut parts: Vec<String> = Vec::new();
    let mut saw_assistant = false;
    let mut fallback: Option<String> = None;

    let mut stream = client.receive_response();
    loop {
        let item = match tokio::time::timeout(options.per_item_timeout, stream.next()).await {
            Ok(item) => item,
            Err(_) => {
                record.outcome = TurnOutcome::TimedOut(options.per_item_timeout);
                return record;
            },
        };
        let msg = match item {
            None => break,
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                record.outcome = TurnOutcome::StreamFailed(e.to_string());
                return record;
            },
        };

        let event = StreamEvent::from_message(&msg);
        debug!(kind = ?event.kind, "agent event");

        match &msg {
            AgentMessage::Assistant { .. } => {
                saw_assistant = true;
                if let Some(text) = &event.text {
                    parts.push(text.clone());
                }
            },
            AgentMessage::Result(result) => {
                fallback = result.result.clone().filter(|t| !t.trim().is_empty());
            },
            _ => {},
        }
        if let Some(id) = msg.upstream_session_id() {
            record.upstream_session_id = Some(id.to_string());
        }

        if let Some(observer) = observer
            && let Err(e) = observer.on_event(&event).await
        {
            if options.log_stream_errors {
                warn!(error = %e, "stream observer failed");
            } else {
                debug!(error = %e, "stream observer failed");
            }
        }
        record.events.push(event);

        if msg.is_result() {
            break;
        }
    }

    let raw = if parts.is_empty() {
        match fallback {
            Some(text) => text,
            None if !saw_assistant => {
                record.outcome = TurnOutcome::Empty("No assistant message".into());
                return record;
            },
            None => String::new(),
        }
    } else {
        parts.join("\n")
    };

    let cleaned = clean_response(&raw, options.max_response_length);
    record.outcome = if cleaned.is_empty() {
        TurnOutcome::Empty("empty response".into())
    } else {
        TurnOutcome::Completed(cleaned)
    };
    record
}
