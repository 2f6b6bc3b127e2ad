//! Live agent connections and the per-session locks that serialize them.

use std::{collections::HashMap, sync::Arc};

use {
    chatrelay_agent::{AgentClient, AgentConnector, BuildContext, build_agent_options},
    chatrelay_config::EffectiveConfig,
    tokio::sync::{Mutex, OwnedMutexGuard},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    fingerprint::ConfigFingerprint,
};

/// Exclusive access to one session, held for a whole turn.
pub type SessionGuard = OwnedMutexGuard<()>;

struct SessionState {
    client: Arc<dyn AgentClient>,
    fingerprint: ConfigFingerprint,
    upstream_session_id: Option<String>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionState>,
    locks: HashMap<String, Arc<Mutex<()>>>,
}

/// Handle to a session's connection returned by [`SessionRegistry::get_or_create`].
#[derive(Clone)]
pub struct LiveSession {
    pub client: Arc<dyn AgentClient>,
    /// Whether an existing connection was reused.
    pub reused: bool,
}

/// Owns every live connection.
///
/// Structural changes happen under one registry mutex that is never held
/// across a connect or disconnect. Callers serialize turns on a session with
/// [`SessionRegistry::acquire`].
pub struct SessionRegistry {
    connector: Arc<dyn AgentConnector>,
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn AgentConnector>) -> Self {
        Self {
            connector,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Wait for exclusive use of `session_id`. The lock is created on first use.
    pub async fn acquire(&self, session_id: &str) -> SessionGuard {
        let lock = {
            let mut inner = self.inner.lock().await;
            Arc::clone(inner.locks.entry(session_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// The session's connection, reused when the config fingerprint is
    /// unchanged and rebuilt otherwise. Call while holding [`Self::acquire`].
    ///
    /// A failed connect leaves no entry behind, so the next call retries.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        cfg: &EffectiveConfig,
        ctx: &BuildContext,
    ) -> Result<LiveSession> {
        let fingerprint = ConfigFingerprint::of(cfg);

        {
            let inner = self.inner.lock().await;
            if let Some(state) = inner.sessions.get(session_id)
                && state.fingerprint == fingerprint
            {
                debug!(session = %session_id, "reusing agent session");
                return Ok(LiveSession {
                    client: Arc::clone(&state.client),
                    reused: true,
                });
            }
        }

        let options = build_agent_options(cfg, ctx)?;

        let stale = self.inner.lock().await.sessions.remove(session_id);
        if let Some(stale) = stale {
            info!(session = %session_id, "config changed, rebuilding agent session");
            disconnect_quietly(session_id, stale.client).await;
        }

        let client = self.connector.create(options);
        if let Err(e) = client.connect().await {
            warn!(session = %session_id, error = %e, "agent connect failed");
            disconnect_quietly(session_id, client).await;
            return Err(Error::connect(session_id, e));
        }

        self.inner
            .lock()
            .await
            .sessions
            .insert(session_id.to_string(), SessionState {
                client: Arc::clone(&client),
                fingerprint,
                upstream_session_id: None,
            });
        info!(session = %session_id, "agent session started");

        Ok(LiveSession {
            client,
            reused: false,
        })
    }

    /// Drop the connection but keep the session lock. Returns whether a
    /// connection existed.
    pub async fn teardown(&self, session_id: &str) -> bool {
        let removed = self.inner.lock().await.sessions.remove(session_id);
        match removed {
            Some(state) => {
                disconnect_quietly(session_id, state.client).await;
                info!(session = %session_id, "agent session torn down");
                true
            },
            None => false,
        }
    }

    /// Drop the connection and the session lock; the next use starts fresh.
    pub async fn reset(&self, session_id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock().await;
            inner.locks.remove(session_id);
            inner.sessions.remove(session_id)
        };
        let existed = removed.is_some();
        if let Some(state) = removed {
            disconnect_quietly(session_id, state.client).await;
        }
        info!(session = %session_id, existed, "agent session reset");
        existed
    }

    /// Signal a live connection to stop its current operation. Does not wait
    /// for the session lock. Returns `false` when there is no connection.
    pub async fn interrupt(&self, session_id: &str) -> Result<bool> {
        let client = {
            let inner = self.inner.lock().await;
            inner.sessions.get(session_id).map(|s| Arc::clone(&s.client))
        };
        let Some(client) = client else {
            debug!(session = %session_id, "interrupt ignored, no live session");
            return Ok(false);
        };
        client
            .interrupt()
            .await
            .map_err(|e| Error::interrupt(session_id, e))?;
        info!(session = %session_id, "agent session interrupted");
        Ok(true)
    }

    /// Tear down every session, e.g. at shutdown.
    pub async fn cleanup_all(&self) -> usize {
        let drained: Vec<(String, SessionState)> = {
            let mut inner = self.inner.lock().await;
            inner.locks.clear();
            inner.sessions.drain().collect()
        };
        let count = drained.len();
        futures::future::join_all(
            drained
                .into_iter()
                .map(|(id, state)| async move { disconnect_quietly(&id, state.client).await }),
        )
        .await;
        info!(count, "all agent sessions cleaned up");
        count
    }

    pub async fn set_upstream_session_id(&self, session_id: &str, upstream: impl Into<String>) {
        if let Some(state) = self.inner.lock().await.sessions.get_mut(session_id) {
            state.upstream_session_id = Some(upstream.into());
        }
    }

    pub async fn upstream_session_id(&self, session_id: &str) -> Option<String> {
        self.inner
            .lock()
            .await
            .sessions
            .get(session_id)
            .and_then(|s| s.upstream_session_id.clone())
    }

    /// Client of a live session, if any.
    pub async fn client(&self, session_id: &str) -> Option<Arc<dyn AgentClient>> {
        self.inner
            .lock()
            .await
            .sessions
            .get(session_id)
            .map(|s| Arc::clone(&s.client))
    }

    /// Ids with a live connection, sorted.
    pub async fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().await.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }
}

async fn disconnect_quietly(session_id: &str, client: Arc<dyn AgentClient>) {
    if let Err(e) = client.disconnect().await {
        debug!(session = %session_id, error = %e, "ignoring disconnect failure");
    }
}
