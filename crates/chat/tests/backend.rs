#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end behaviour of `ChatBackend` against scripted agents.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    chatrelay_agent::{AgentClient, AgentConnector, AgentMessage, AgentOptions, ProcessSnapshot},
    chatrelay_chat::{AGENT_ERROR_MARKER, ChatBackend, Error, EventKind, StreamEvent},
    chatrelay_config::{ConfigProvider, EffectiveConfig},
    chatrelay_sessions::{RawEventLog, read_records},
    chatrelay_uploads::{FileUploadHandler, UploadRequest, UploadResult},
    futures::stream::BoxStream,
    serde_json::{Value, json},
    tokio::sync::Barrier,
};

// ── Scripted agent ──────────────────────────────────────────────────────────

#[derive(Clone)]
enum Step {
    Wait(Duration),
    Send(Value),
    Fail(&'static str),
    /// Rendezvous with another turn.
    Meet(Arc<Barrier>),
}

fn assistant(text: &str) -> Step {
    Step::Send(json!({
        "type": "assistant",
        "message": {"model": "test", "content": [{"type": "text", "text": text}]}
    }))
}

fn result() -> Step {
    Step::Send(json!({
        "type": "result", "subtype": "success", "is_error": false,
        "result": null, "session_id": "upstream-1"
    }))
}

/// Plays whatever script the connector holds when each response starts, so
/// a test can change what the next turn on a live client does.
struct ScriptedClient {
    script: Arc<Mutex<Vec<Step>>>,
    fail_query: Arc<AtomicBool>,
    journal: Arc<Mutex<Vec<String>>>,
    name: String,
}

#[async_trait]
impl AgentClient for ScriptedClient {
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:disconnect", self.name));
        Ok(())
    }

    async fn interrupt(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn query(&self, prompt: &str) -> anyhow::Result<()> {
        if self.fail_query.load(Ordering::SeqCst) {
            anyhow::bail!("stdin closed");
        }
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:start:{prompt}", self.name));
        Ok(())
    }

    fn receive_response(&self) -> BoxStream<'_, anyhow::Result<AgentMessage>> {
        let script = self.script.lock().unwrap().clone();
        Box::pin(async_stream::stream! {
            for step in script {
                match step {
                    Step::Wait(d) => tokio::time::sleep(d).await,
                    Step::Meet(barrier) => {
                        barrier.wait().await;
                    },
                    Step::Fail(message) => {
                        yield Err(anyhow::anyhow!(message));
                    },
                    Step::Send(value) => {
                        let is_result = value["type"] == "result";
                        if is_result {
                            self.journal.lock().unwrap().push(format!("{}:end", self.name));
                        }
                        yield AgentMessage::parse(value).map_err(anyhow::Error::from);
                    },
                }
            }
        })
    }
}

struct ScriptedConnector {
    script: Arc<Mutex<Vec<Step>>>,
    fail_query: Arc<AtomicBool>,
    journal: Arc<Mutex<Vec<String>>>,
    created: Mutex<Vec<AgentOptions>>,
}

impl ScriptedConnector {
    fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(Mutex::new(script)),
            fail_query: Arc::new(AtomicBool::new(false)),
            journal: Arc::new(Mutex::new(Vec::new())),
            created: Mutex::new(Vec::new()),
        })
    }

    fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

impl AgentConnector for ScriptedConnector {
    fn create(&self, options: AgentOptions) -> Arc<dyn AgentClient> {
        let mut created = self.created.lock().unwrap();
        created.push(options);
        Arc::new(ScriptedClient {
            script: Arc::clone(&self.script),
            fail_query: Arc::clone(&self.fail_query),
            journal: Arc::clone(&self.journal),
            name: format!("c{}", created.len()),
        })
    }
}

// ── Config ──────────────────────────────────────────────────────────────────

struct StaticConfig(Mutex<EffectiveConfig>);

impl ConfigProvider for StaticConfig {
    fn get_session_config(&self, _session_id: &str) -> chatrelay_config::Result<EffectiveConfig> {
        Ok(self.0.lock().unwrap().clone())
    }
}

struct Harness {
    backend: ChatBackend,
    connector: Arc<ScriptedConnector>,
    config: Arc<StaticConfig>,
    dir: tempfile::TempDir,
}

fn harness(script: Vec<Step>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let cfg = EffectiveConfig::with_defaults(dir.path());
    let config = Arc::new(StaticConfig(Mutex::new(cfg)));
    let connector = ScriptedConnector::new(script);
    let backend = ChatBackend::new(
        Arc::clone(&config) as Arc<dyn ConfigProvider>,
        Arc::clone(&connector) as Arc<dyn AgentConnector>,
    );
    Harness {
        backend,
        connector,
        config,
        dir,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hello_then_reuse() {
    let h = harness(vec![assistant("Hi there"), result()]);

    let reply = h
        .backend
        .send_message_with_session("Hello", "slack_C123", None)
        .await
        .unwrap();
    assert_eq!(reply, "Hi there");
    assert_eq!(h.backend.active_sessions().await, vec!["slack_C123"]);

    h.backend
        .send_message_with_session("How are you", "slack_C123", None)
        .await
        .unwrap();
    assert_eq!(h.connector.created(), 1);
    assert_eq!(
        h.backend
            .registry()
            .upstream_session_id("slack_C123")
            .await
            .as_deref(),
        Some("upstream-1")
    );

    let log = RawEventLog::new(h.dir.path().join("logs"));
    let path = log.path_for("slack_C123", chrono::Local::now().date_naive());
    let records = read_records(&path).await.unwrap();
    let kinds: Vec<&str> = records.iter().map(|r| r["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec![
        "request", "response", "response", "request", "response", "response"
    ]);
    assert_eq!(records[0]["message"], "Hello");
    assert_eq!(records[1]["event"]["text"], "Hi there");
}

#[tokio::test]
async fn config_change_rebuilds_once() {
    let h = harness(vec![assistant("ok"), result()]);
    h.backend
        .send_message_with_session("one", "api_u1", None)
        .await
        .unwrap();

    h.config.0.lock().unwrap().model = Some("another-model".into());
    h.backend
        .send_message_with_session("two", "api_u1", None)
        .await
        .unwrap();
    h.backend
        .send_message_with_session("three", "api_u1", None)
        .await
        .unwrap();

    assert_eq!(h.connector.created(), 2);
    let disconnects = h
        .connector
        .journal()
        .into_iter()
        .filter(|e| e.ends_with(":disconnect"))
        .collect::<Vec<_>>();
    assert_eq!(disconnects, vec!["c1:disconnect"]);
}

#[tokio::test]
async fn same_session_turns_do_not_interleave() {
    let h = Arc::new(harness(vec![
        Step::Wait(Duration::from_millis(50)),
        assistant("done"),
        result(),
    ]));

    let a = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.backend
                .send_message_with_session("first", "slack_C1", None)
                .await
        })
    };
    let b = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.backend
                .send_message_with_session("second", "slack_C1", None)
                .await
        })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let journal = h.connector.journal();
    assert_eq!(journal.len(), 4);
    assert!(journal[0].contains(":start:"));
    assert!(journal[1].ends_with(":end"));
    assert!(journal[2].contains(":start:"));
    assert!(journal[3].ends_with(":end"));
}

#[tokio::test]
async fn different_sessions_run_concurrently() {
    // Both turns must be in flight at once to pass the barrier.
    let barrier = Arc::new(Barrier::new(2));
    let h = Arc::new(harness(vec![
        Step::Meet(barrier),
        assistant("together"),
        result(),
    ]));

    let run = |session: &'static str| {
        let h = Arc::clone(&h);
        async move {
            h.backend
                .send_message_with_session("hi", session, None)
                .await
        }
    };
    let both = tokio::time::timeout(
        Duration::from_secs(5),
        futures::future::join(run("slack_C1"), run("slack_C2")),
    )
    .await
    .expect("sessions blocked each other");
    assert_eq!(both.0.unwrap(), "together");
    assert_eq!(both.1.unwrap(), "together");
}

#[tokio::test(start_paused = true)]
async fn steady_progress_does_not_time_out() {
    let mut script = Vec::new();
    for i in 0..4 {
        script.push(Step::Wait(Duration::from_secs(170)));
        script.push(assistant(&format!("part {i}")));
    }
    script.push(Step::Wait(Duration::from_secs(170)));
    script.push(result());
    let h = harness(script);

    let reply = h
        .backend
        .send_message_with_session("long job", "slack_C1", None)
        .await
        .unwrap();
    assert_eq!(reply, "part 0\npart 1\npart 2\npart 3");
}

#[tokio::test(start_paused = true)]
async fn silent_agent_times_out_and_is_torn_down() {
    let h = harness(vec![Step::Wait(Duration::from_secs(181)), assistant("late"), result()]);

    let err = h
        .backend
        .send_message_with_session("hello?", "slack_C1", None)
        .await
        .unwrap_err();
    assert!(err.is_agent_error());
    assert!(err.to_string().contains("180s"));
    assert!(err.user_message().contains(AGENT_ERROR_MARKER));
    assert!(h.backend.active_sessions().await.is_empty());
}

#[tokio::test]
async fn stream_failure_tears_down_and_next_call_rebuilds() {
    let h = harness(vec![assistant("partial"), Step::Fail("connection reset")]);

    let err = h
        .backend
        .send_message_with_session("x", "slack_C1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Agent { .. }));
    assert!(h.backend.active_sessions().await.is_empty());
    assert!(h.connector.journal().contains(&"c1:disconnect".to_string()));

    *h.connector.script.lock().unwrap() = vec![assistant("recovered"), result()];
    let reply = h
        .backend
        .send_message_with_session("y", "slack_C1", None)
        .await
        .unwrap();
    assert_eq!(reply, "recovered");
    assert_eq!(h.connector.created(), 2);
}

#[tokio::test]
async fn send_failure_tears_down() {
    let h = harness(vec![assistant("ok"), result()]);
    h.backend
        .send_message_with_session("x", "slack_C1", None)
        .await
        .unwrap();

    h.connector.fail_query.store(true, Ordering::SeqCst);
    let err = h
        .backend
        .send_message_with_session("y", "slack_C1", None)
        .await
        .unwrap_err();
    assert!(err.is_agent_error());
    assert!(err.to_string().contains("stdin closed"));
    assert!(h.backend.active_sessions().await.is_empty());
    assert!(h.connector.journal().contains(&"c1:disconnect".to_string()));

    h.connector.fail_query.store(false, Ordering::SeqCst);
    h.backend
        .send_message_with_session("z", "slack_C1", None)
        .await
        .unwrap();
    assert_eq!(h.connector.created(), 2);
}

#[tokio::test]
async fn unwritable_log_dir_still_returns_the_reply() {
    let h = harness(vec![assistant("still here"), result()]);
    let blocker = h.dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    h.config.0.lock().unwrap().log_dir = blocker.join("logs");

    let reply = h
        .backend
        .send_message_with_session("x", "slack_C1", None)
        .await
        .unwrap();
    assert_eq!(reply, "still here");
    assert_eq!(h.backend.active_sessions().await, vec!["slack_C1"]);
    assert!(blocker.is_file());
}

#[tokio::test]
async fn missing_working_directory_is_reported_as_config() {
    let h = harness(vec![assistant("never"), result()]);
    h.config.0.lock().unwrap().project_root = h.dir.path().join("gone");

    let err = h
        .backend
        .send_message_with_session("x", "slack_C1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
    assert_eq!(h.connector.created(), 0);
}

#[tokio::test]
async fn observer_receives_events() {
    let h = harness(vec![assistant("streamed"), result()]);
    let (tx, mut rx) = tokio::sync::mpsc::channel::<StreamEvent>(16);

    h.backend
        .send_message_with_session("x", "slack_C1", Some(&tx))
        .await
        .unwrap();
    drop(tx);

    let first = rx.recv().await.unwrap();
    assert_eq!(first.kind, EventKind::Assistant);
    assert_eq!(first.text.as_deref(), Some("streamed"));
    assert_eq!(rx.recv().await.unwrap().kind, EventKind::Result);
}

#[tokio::test]
async fn options_grant_the_upload_tool() {
    let h = harness(vec![assistant("ok"), result()]);
    h.backend
        .send_message_with_session("x", "slack_C1", None)
        .await
        .unwrap();

    let created = h.connector.created.lock().unwrap();
    let options = &created[0];
    assert!(
        options
            .allowed_tools
            .contains(&"mcp__file-ops__upload_file".to_string())
    );
    assert!(options.sdk_server("file-ops").is_some());
    assert!(options.setting_sources.iter().all(|s| s.as_str() != "user"));
}

#[tokio::test]
async fn compact_is_optimistic() {
    let h = harness(vec![result()]);
    assert!(!h.backend.compact("slack_C1").await);

    *h.connector.script.lock().unwrap() = vec![assistant("hi"), result()];
    h.backend
        .send_message_with_session("x", "slack_C1", None)
        .await
        .unwrap();

    // A live session exists now, so the directive goes out.
    assert!(h.backend.compact("slack_C1").await);
    assert!(h.connector.journal().contains(&"c1:start:/compact".to_string()));
}

#[tokio::test(start_paused = true)]
async fn compact_timeout_tears_down() {
    let h = harness(vec![assistant("hi"), result()]);
    h.backend
        .send_message_with_session("x", "slack_C1", None)
        .await
        .unwrap();

    *h.connector.script.lock().unwrap() = vec![Step::Wait(Duration::from_secs(181)), result()];
    assert!(!h.backend.compact("slack_C1").await);
    assert!(h.backend.active_sessions().await.is_empty());
    assert!(h.connector.journal().contains(&"c1:disconnect".to_string()));
}

#[tokio::test]
async fn compact_stream_failure_tears_down() {
    let h = harness(vec![assistant("hi"), result()]);
    h.backend
        .send_message_with_session("x", "slack_C1", None)
        .await
        .unwrap();

    *h.connector.script.lock().unwrap() = vec![Step::Fail("broken pipe")];
    assert!(!h.backend.compact("slack_C1").await);
    assert!(h.backend.active_sessions().await.is_empty());
    assert!(h.connector.journal().contains(&"c1:disconnect".to_string()));
}

#[tokio::test]
async fn compact_without_reply_text_still_succeeds() {
    let h = harness(vec![assistant("hi"), result()]);
    h.backend
        .send_message_with_session("x", "slack_C1", None)
        .await
        .unwrap();

    *h.connector.script.lock().unwrap() = vec![result()];
    assert!(h.backend.compact("slack_C1").await);
    assert_eq!(h.backend.active_sessions().await, vec!["slack_C1"]);
}

#[tokio::test]
async fn sessions_share_the_captured_host_env() {
    let mut h = harness(vec![assistant("ok"), result()]);
    h.backend = h.backend.with_process_snapshot(ProcessSnapshot {
        base_env: [("HOST_MARKER".to_string(), "captured".to_string())].into(),
        ..Default::default()
    });

    for session in ["slack_C1", "slack_C2"] {
        h.backend
            .send_message_with_session("x", session, None)
            .await
            .unwrap();
    }

    let created = h.connector.created.lock().unwrap();
    assert_eq!(created.len(), 2);
    for options in created.iter() {
        assert_eq!(
            options.env.get("HOST_MARKER").map(String::as_str),
            Some("captured")
        );
    }
}

#[tokio::test]
async fn reset_and_cleanup() {
    let h = harness(vec![assistant("ok"), result()]);
    h.backend
        .send_message_with_session("x", "slack_C1", None)
        .await
        .unwrap();
    h.backend
        .send_message_with_session("x", "slack_C2", None)
        .await
        .unwrap();
    h.backend
        .metadata()
        .set("slack_C1", "user_timezone", json!("Europe/Paris"));

    assert!(h.backend.reset("slack_C1").await);
    assert!(h.backend.metadata().get("slack_C1").is_empty());
    assert_eq!(h.backend.active_sessions().await, vec!["slack_C2"]);

    assert_eq!(h.backend.cleanup_all().await, 1);
    assert!(h.backend.active_sessions().await.is_empty());
    assert!(!h.backend.interrupt("slack_C2").await.unwrap());
}

struct EchoUploads;

#[async_trait]
impl FileUploadHandler for EchoUploads {
    async fn upload_file(&self, request: UploadRequest) -> chatrelay_uploads::Result<UploadResult> {
        Ok(UploadResult::ok(request.file_path.display().to_string())
            .with_data("thread", request.options.get("thread_ts").cloned().unwrap_or(Value::Null)))
    }
}

#[tokio::test]
async fn uploads_route_by_prefix() {
    let h = harness(vec![]);
    h.backend
        .register_upload_handler("slack", Arc::new(EchoUploads))
        .await;
    h.backend
        .metadata()
        .set("slack_C123", "thread_ts", json!("171.5"));

    let result = h
        .backend
        .upload_file(UploadRequest::new("slack_C123", "/tmp/report.pdf"))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.platform_data["thread"], "171.5");

    let err = h
        .backend
        .upload_file(UploadRequest::new("rcs_555", "/tmp/report.pdf"))
        .await
        .unwrap_err();
    match err {
        Error::UnsupportedAdapter { prefix, known } => {
            assert_eq!(prefix, "rcs");
            assert_eq!(known, vec!["slack"]);
        },
        other => panic!("unexpected error: {other}"),
    }
}
