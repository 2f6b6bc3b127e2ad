use {async_trait::async_trait, tokio::sync::mpsc};

use crate::event::StreamEvent;

/// Receives each event of a turn as it arrives. Failures are logged and
/// never abort the turn.
#[async_trait]
pub trait StreamObserver: Send + Sync {
    async fn on_event(&self, event: &StreamEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl StreamObserver for mpsc::Sender<StreamEvent> {
    async fn on_event(&self, event: &StreamEvent) -> anyhow::Result<()> {
        self.send(event.clone())
            .await
            .map_err(|_| anyhow::anyhow!("stream observer receiver dropped"))
    }
}
