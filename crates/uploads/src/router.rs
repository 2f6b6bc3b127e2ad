use std::{collections::HashMap, sync::Arc};

use {
    chatrelay_common::platform_prefix,
    chatrelay_sessions::SessionMetadataStore,
    tokio::sync::RwLock,
    tracing::{debug, info},
};

use crate::{
    error::{Error, Result},
    handler::{FileUploadHandler, UploadRequest, UploadResult},
};

/// Metadata key holding the last thread the session replied in.
pub const THREAD_TS_KEY: &str = "thread_ts";

/// Metadata keys copied into upload options when the caller left them out.
const METADATA_DEFAULTS: &[&str] = &[THREAD_TS_KEY];

/// Routes uploads to the handler registered for a session's platform prefix.
pub struct UploadRouter {
    handlers: RwLock<HashMap<String, Arc<dyn FileUploadHandler>>>,
    metadata: Arc<SessionMetadataStore>,
}

impl UploadRouter {
    pub fn new(metadata: Arc<SessionMetadataStore>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            metadata,
        }
    }

    /// Register `handler` for `prefix`, replacing any previous one.
    pub async fn register(&self, prefix: impl Into<String>, handler: Arc<dyn FileUploadHandler>) {
        let prefix = prefix.into();
        info!(prefix = %prefix, "upload handler registered");
        self.handlers.write().await.insert(prefix, handler);
    }

    pub async fn unregister(&self, prefix: &str) -> bool {
        self.handlers.write().await.remove(prefix).is_some()
    }

    /// Registered prefixes, sorted.
    pub async fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        prefixes.sort();
        prefixes
    }

    /// Fill metadata defaults, then pass the request to the platform handler.
    /// The handler's result is returned unchanged.
    pub async fn dispatch(&self, mut request: UploadRequest) -> Result<UploadResult> {
        let prefix = platform_prefix(&request.session_id).to_string();
        let handler = {
            let handlers = self.handlers.read().await;
            match handlers.get(&prefix) {
                Some(h) => Arc::clone(h),
                None => {
                    let mut known: Vec<String> = handlers.keys().cloned().collect();
                    known.sort();
                    return Err(Error::unsupported_adapter(prefix, known));
                },
            }
        };

        for key in METADATA_DEFAULTS {
            if request.options.contains_key(*key) {
                continue;
            }
            if let Some(value) = self
                .metadata
                .get_value(&request.session_id, key)
                .filter(|v| !v.is_null())
            {
                request.options.insert((*key).to_string(), value);
            }
        }

        debug!(
            session = %request.session_id,
            prefix = %prefix,
            file = %request.file_path.display(),
            "dispatching upload"
        );
        handler.upload_file(request).await
    }
}
