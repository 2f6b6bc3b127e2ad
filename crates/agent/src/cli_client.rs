//! Stdio agent client: spawn the agent CLI and speak streaming JSON over
//! stdin/stdout.
//!
//! Outbound lines are user messages and control requests. Inbound lines are
//! either control traffic (answered or routed here) or conversation messages,
//! which are queued for [`AgentClient::receive_response`].

use std::{
    collections::HashMap,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::stream::BoxStream,
    serde_json::{Value, json},
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        process::{Child, ChildStdin, ChildStdout, Command},
        sync::{Mutex, mpsc, oneshot},
        task::JoinHandle,
    },
    tracing::{debug, info, trace, warn},
};

use crate::{
    client::{AgentClient, AgentConnector},
    error::Error,
    message::AgentMessage,
    options::AgentOptions,
};

/// How long a control request may wait for its response.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(60);

/// Grace period between closing stdin and killing the process.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type ControlReply = Result<Value, String>;
type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<ControlReply>>>>;
type MessageRx = mpsc::UnboundedReceiver<anyhow::Result<AgentMessage>>;

struct Connection {
    child: Child,
    stdin: Arc<Mutex<ChildStdin>>,
    reader: JoinHandle<()>,
    stderr: Option<JoinHandle<()>>,
}

/// One agent CLI process.
pub struct CliAgentClient {
    options: AgentOptions,
    conn: Mutex<Option<Connection>>,
    messages: Mutex<Option<MessageRx>>,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl CliAgentClient {
    pub fn new(options: AgentOptions) -> Self {
        Self {
            options,
            conn: Mutex::new(None),
            messages: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    async fn stdin(&self) -> crate::Result<Arc<Mutex<ChildStdin>>> {
        self.conn
            .lock()
            .await
            .as_ref()
            .map(|c| Arc::clone(&c.stdin))
            .ok_or(Error::NotConnected)
    }

    /// Send a control request and wait for the matching response.
    async fn control_request(&self, subtype: &str) -> crate::Result<Value> {
        let stdin = self.stdin().await?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request_id = format!("req_{n}_{}", uuid::Uuid::new_v4().simple());

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        let request = json!({
            "type": "control_request",
            "request_id": request_id,
            "request": { "subtype": subtype },
        });
        debug!(subtype, request_id = %request_id, "relay -> agent control request");
        if let Err(e) = write_line(&stdin, &request).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(CONTROL_TIMEOUT, rx).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(message))) => Err(Error::control_request(subtype, message)),
            Ok(Err(_)) => Err(Error::control_request(subtype, "agent process exited")),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(Error::control_request(
                    subtype,
                    format!("no response after {}s", CONTROL_TIMEOUT.as_secs()),
                ))
            },
        }
    }

    fn spawn_process(&self) -> crate::Result<Child> {
        let args = self.options.to_cli_args();
        info!(
            command = %self.options.cli_path,
            cwd = %self.options.cwd.display(),
            "spawning agent process"
        );
        trace!(args = ?args, "agent arguments");

        let mut cmd = Command::new(&self.options.cli_path);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.options.cwd.as_os_str().is_empty() {
            cmd.current_dir(&self.options.cwd);
        }
        if !self.options.env.is_empty() {
            cmd.env_clear().envs(&self.options.env);
        }

        cmd.spawn()
            .map_err(|e| Error::Spawn(format!("{}: {e}", self.options.cli_path)))
    }
}

#[async_trait]
impl AgentClient for CliAgentClient {
    async fn connect(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().await;
        if conn.is_some() {
            return Ok(());
        }

        let mut child = self.spawn_process()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("failed to capture stdout".into()))?;
        let stdin = Arc::new(Mutex::new(stdin));

        let stderr = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        warn!(stderr = %trimmed, "agent stderr");
                    }
                }
            })
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(
            stdout,
            Arc::clone(&stdin),
            Arc::clone(&self.pending),
            tx,
            self.options.clone(),
        ));

        *conn = Some(Connection {
            child,
            stdin,
            reader,
            stderr,
        });
        *self.messages.lock().await = Some(rx);
        drop(conn);

        if let Err(e) = self.control_request("initialize").await {
            let _ = self.disconnect().await;
            return Err(e.into());
        }
        debug!("agent initialized");
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        let Some(conn) = self.conn.lock().await.take() else {
            return Ok(());
        };
        let Connection {
            mut child,
            stdin,
            reader,
            stderr,
        } = conn;

        // Closing stdin asks the agent to finish.
        {
            let mut stdin = stdin.lock().await;
            let _ = stdin.shutdown().await;
        }
        drop(stdin);

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "agent exited"),
            Ok(Err(e)) => warn!(error = %e, "failed waiting for agent exit"),
            Err(_) => {
                warn!("agent did not exit in time, killing");
                let _ = child.kill().await;
            },
        }

        reader.abort();
        if let Some(handle) = stderr {
            handle.abort();
        }
        self.pending.lock().await.clear();
        self.messages.lock().await.take();
        Ok(())
    }

    async fn interrupt(&self) -> anyhow::Result<()> {
        self.control_request("interrupt").await?;
        Ok(())
    }

    async fn query(&self, prompt: &str) -> anyhow::Result<()> {
        let stdin = self.stdin().await?;
        let message = json!({
            "type": "user",
            "message": { "role": "user", "content": prompt },
            "parent_tool_use_id": null,
            "session_id": "default",
        });
        write_line(&stdin, &message).await?;
        Ok(())
    }

    fn receive_response(&self) -> BoxStream<'_, anyhow::Result<AgentMessage>> {
        Box::pin(async_stream::stream! {
            let mut guard = self.messages.lock().await;
            match guard.as_mut() {
                None => {
                    yield Err(Error::NotConnected.into());
                },
                Some(rx) => loop {
                    match rx.recv().await {
                        Some(Ok(msg)) => {
                            let done = msg.is_result();
                            yield Ok(msg);
                            if done {
                                break;
                            }
                        },
                        Some(Err(e)) => {
                            yield Err(e);
                            break;
                        },
                        None => {
                            yield Err(Error::protocol("agent process exited mid-response").into());
                            break;
                        },
                    }
                },
            }
        })
    }
}

/// Makes [`CliAgentClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliConnector;

impl AgentConnector for CliConnector {
    fn create(&self, options: AgentOptions) -> Arc<dyn AgentClient> {
        Arc::new(CliAgentClient::new(options))
    }
}

// ── Wire helpers ────────────────────────────────────────────────────────────

async fn write_line(stdin: &Mutex<ChildStdin>, value: &Value) -> crate::Result<()> {
    let mut payload = serde_json::to_string(value)?;
    payload.push('\n');
    let mut stdin = stdin.lock().await;
    stdin.write_all(payload.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

async fn read_loop(
    stdout: ChildStdout,
    stdin: Arc<Mutex<ChildStdin>>,
    pending: PendingMap,
    tx: mpsc::UnboundedSender<anyhow::Result<AgentMessage>>,
    options: AgentOptions,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("agent stdout closed");
                break;
            },
            Err(e) => {
                warn!(error = %e, "error reading agent stdout");
                let _ = tx.send(Err(Error::Io(e).into()));
                break;
            },
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        trace!(raw = %trimmed, "agent -> relay");

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, line = %trimmed, "agent sent non-JSON line");
                continue;
            },
        };

        match value.get("type").and_then(Value::as_str) {
            Some("control_response") => resolve_control(&pending, &value).await,
            Some("control_request") => {
                let reply = answer_control(&options, &value).await;
                if let Err(e) = write_line(&stdin, &reply).await {
                    warn!(error = %e, "failed to answer agent control request");
                }
            },
            Some("control_cancel_request") => {},
            _ => {
                let msg = AgentMessage::parse(value).map_err(anyhow::Error::from);
                if tx.send(msg).is_err() {
                    break;
                }
            },
        }
    }
    pending.lock().await.clear();
}

async fn resolve_control(pending: &PendingMap, value: &Value) {
    let response = value.get("response").cloned().unwrap_or(Value::Null);
    let Some(request_id) = response.get("request_id").and_then(Value::as_str) else {
        warn!("control response without request_id");
        return;
    };
    let Some(tx) = pending.lock().await.remove(request_id) else {
        warn!(request_id, "control response for unknown request");
        return;
    };
    let reply = if response.get("subtype").and_then(Value::as_str) == Some("error") {
        Err(response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string())
    } else {
        Ok(response.get("response").cloned().unwrap_or_else(|| json!({})))
    };
    let _ = tx.send(reply);
}

/// Build the `control_response` for a request initiated by the agent.
async fn answer_control(options: &AgentOptions, value: &Value) -> Value {
    let request_id = value
        .get("request_id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let request = value.get("request").cloned().unwrap_or(Value::Null);
    let subtype = request
        .get("subtype")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let outcome = match subtype {
        "mcp_message" => {
            let server_name = request
                .get("server_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let message = request.get("message").cloned().unwrap_or(Value::Null);
            match options.sdk_server(server_name) {
                Some(server) => {
                    let response = chatrelay_mcp::dispatch(server.as_ref(), message)
                        .await
                        .unwrap_or_else(|| json!({"jsonrpc": "2.0", "result": {}, "id": null}));
                    Ok(json!({ "mcp_response": response }))
                },
                None => Err(format!("unknown sdk MCP server '{server_name}'")),
            }
        },
        other => Err(format!("unsupported control request '{other}'")),
    };

    match outcome {
        Ok(response) => json!({
            "type": "control_response",
            "response": {
                "subtype": "success",
                "request_id": request_id,
                "response": response,
            },
        }),
        Err(error) => {
            debug!(subtype, error = %error, "declining agent control request");
            json!({
                "type": "control_response",
                "response": {
                    "subtype": "error",
                    "request_id": request_id,
                    "error": error,
                },
            })
        },
    }
}
