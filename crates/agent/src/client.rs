//! The boundary between the relay and a conversational agent.
//!
//! [`AgentClient`] is one live connection; [`AgentConnector`] makes new ones
//! from [`AgentOptions`]. The stdio implementation lives in `cli_client`;
//! tests substitute scripted fakes.

use std::sync::Arc;

use {async_trait::async_trait, futures::stream::BoxStream};

use crate::{message::AgentMessage, options::AgentOptions};

/// A persistent, bidirectional connection to one agent process.
///
/// Methods take `&self` so an interrupt can be delivered while another task
/// is consuming the response stream.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Start the underlying process and complete any handshake.
    async fn connect(&self) -> anyhow::Result<()>;

    /// Stop the process. Safe to call more than once.
    async fn disconnect(&self) -> anyhow::Result<()>;

    /// Ask the agent to abandon the operation in progress.
    async fn interrupt(&self) -> anyhow::Result<()>;

    /// Submit a user message.
    async fn query(&self, prompt: &str) -> anyhow::Result<()>;

    /// Messages for the current response, ending after the result message.
    fn receive_response(&self) -> BoxStream<'_, anyhow::Result<AgentMessage>>;
}

/// Factory for agent connections.
pub trait AgentConnector: Send + Sync {
    /// Build an unconnected client; the caller drives `connect`.
    fn create(&self, options: AgentOptions) -> Arc<dyn AgentClient>;
}
