//! The adapter-facing entry point.

use std::{sync::Arc, time::Duration};

use {
    chatrelay_agent::{AgentConnector, BuildContext, ProcessSnapshot},
    chatrelay_config::{ConfigProvider, EffectiveConfig},
    chatrelay_mcp::SdkMcpServer,
    chatrelay_sessions::{
        RawEventLog, SessionMetadataStore, SessionRegistry, request_record, response_record,
    },
    chatrelay_uploads::{FileOpsServer, FileUploadHandler, UploadRequest, UploadResult, UploadRouter},
    serde_json::json,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    observer::StreamObserver,
    turn::{STREAM_RECEIVE_TIMEOUT, TurnOptions, TurnOutcome, TurnRecord, run_turn},
};

/// Directive that asks the agent to summarize and shrink its context.
pub const COMPACT_COMMAND: &str = "/compact";

/// Shared by every adapter in the process.
pub struct ChatBackend {
    config: Arc<dyn ConfigProvider>,
    registry: SessionRegistry,
    metadata: Arc<SessionMetadataStore>,
    uploads: Arc<UploadRouter>,
    /// Captured once; every session build reuses it.
    process: ProcessSnapshot,
    stream_timeout: Duration,
}

impl ChatBackend {
    pub fn new(config: Arc<dyn ConfigProvider>, connector: Arc<dyn AgentConnector>) -> Self {
        let metadata = Arc::new(SessionMetadataStore::new());
        Self {
            config,
            registry: SessionRegistry::new(connector),
            uploads: Arc::new(UploadRouter::new(Arc::clone(&metadata))),
            metadata,
            process: ProcessSnapshot::capture(),
            stream_timeout: STREAM_RECEIVE_TIMEOUT,
        }
    }

    /// Replace the captured host environment.
    #[must_use]
    pub fn with_process_snapshot(mut self, snapshot: ProcessSnapshot) -> Self {
        self.process = snapshot;
        self
    }

    /// Override the per-item stream timeout.
    #[must_use]
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn metadata(&self) -> &Arc<SessionMetadataStore> {
        &self.metadata
    }

    pub fn uploads(&self) -> &Arc<UploadRouter> {
        &self.uploads
    }

    /// Run one turn for `session_id` and return the cleaned response.
    ///
    /// Turns on the same session run one at a time. On any agent failure the
    /// session is torn down before the error is returned.
    pub async fn send_message_with_session(
        &self,
        message: &str,
        session_id: &str,
        observer: Option<&dyn StreamObserver>,
    ) -> Result<String> {
        let cfg = self.config.get_session_config(session_id)?;
        let _guard = self.registry.acquire(session_id).await;

        let live = self
            .registry
            .get_or_create(session_id, &cfg, &self.build_context(session_id))
            .await?;
        debug!(session = %session_id, reused = live.reused, "running turn");

        let record = run_turn(
            live.client.as_ref(),
            message,
            observer,
            &self.turn_options(&cfg),
        )
        .await;
        self.finish_turn(session_id, &cfg, message, &record).await;

        match record.outcome {
            TurnOutcome::Completed(text) => Ok(text),
            failed => {
                warn!(session = %session_id, reason = %failed.describe(), "turn failed");
                self.registry.teardown(session_id).await;
                Err(Error::agent(failed.describe()))
            },
        }
    }

    /// Ask a live session to stop. Does not wait for the running turn.
    pub async fn interrupt(&self, session_id: &str) -> Result<bool> {
        Ok(self.registry.interrupt(session_id).await?)
    }

    /// Forget a session entirely: connection, lock and metadata.
    pub async fn reset(&self, session_id: &str) -> bool {
        self.metadata.clear(session_id);
        self.registry.reset(session_id).await
    }

    /// Send the compaction directive to a live session.
    ///
    /// `false` when there is no session or the exchange failed at the
    /// transport level. Any reply text, or none, counts as success.
    pub async fn compact(&self, session_id: &str) -> bool {
        let cfg = match self.config.get_session_config(session_id) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(session = %session_id, error = %e, "compact skipped, no config");
                return false;
            },
        };
        let _guard = self.registry.acquire(session_id).await;
        let Some(client) = self.registry.client(session_id).await else {
            debug!(session = %session_id, "compact skipped, no live session");
            return false;
        };

        let record = run_turn(
            client.as_ref(),
            COMPACT_COMMAND,
            None,
            &self.turn_options(&cfg),
        )
        .await;
        self.finish_turn(session_id, &cfg, COMPACT_COMMAND, &record)
            .await;

        if record.outcome.is_transport_failure() {
            warn!(session = %session_id, reason = %record.outcome.describe(), "compact failed");
            self.registry.teardown(session_id).await;
            return false;
        }
        info!(session = %session_id, "session compacted");
        true
    }

    /// Disconnect every session, e.g. at shutdown.
    pub async fn cleanup_all(&self) -> usize {
        self.registry.cleanup_all().await
    }

    pub async fn active_sessions(&self) -> Vec<String> {
        self.registry.active_sessions().await
    }

    pub async fn register_upload_handler(
        &self,
        prefix: impl Into<String>,
        handler: Arc<dyn FileUploadHandler>,
    ) {
        self.uploads.register(prefix, handler).await;
    }

    pub async fn upload_file(&self, request: UploadRequest) -> Result<UploadResult> {
        Ok(self.uploads.dispatch(request).await?)
    }

    fn build_context(&self, session_id: &str) -> BuildContext {
        let file_ops: Arc<dyn SdkMcpServer> =
            Arc::new(FileOpsServer::new(Arc::clone(&self.uploads), session_id));
        BuildContext::from_snapshot(&self.process, self.metadata.get(session_id), vec![file_ops])
    }

    fn turn_options(&self, cfg: &EffectiveConfig) -> TurnOptions {
        TurnOptions {
            per_item_timeout: self.stream_timeout,
            max_response_length: cfg.max_response_length,
            log_stream_errors: cfg.log_stream_errors,
        }
    }

    /// Record the upstream id and append the turn to the raw log.
    async fn finish_turn(
        &self,
        session_id: &str,
        cfg: &EffectiveConfig,
        message: &str,
        record: &TurnRecord,
    ) {
        if let Some(upstream) = &record.upstream_session_id {
            self.registry
                .set_upstream_session_id(session_id, upstream.clone())
                .await;
        }

        let mut records = Vec::with_capacity(record.events.len() + 1);
        records.push(request_record(session_id, message));
        records.extend(
            record
                .events
                .iter()
                .map(|event| response_record(session_id, json!(event))),
        );
        if let Err(e) = RawEventLog::new(&cfg.log_dir)
            .append(session_id, records)
            .await
        {
            warn!(session = %session_id, error = %e, "failed to write turn log");
        }
    }
}
