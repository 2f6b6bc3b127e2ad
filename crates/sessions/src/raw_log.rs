//! Append-only per-session turn log.
//!
//! One JSONL file per session per day at
//! `<log_dir>/<session>/raw_<YYYY-MM-DD>.jsonl`, written under an exclusive
//! file lock so concurrent writers never interleave lines.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use {
    chrono::{Local, NaiveDate, Utc},
    fd_lock::RwLock,
    serde_json::{Value, json},
    tracing::warn,
};

use crate::error::{Error, Result};

/// Writer for the raw turn log under one log directory.
#[derive(Debug, Clone)]
pub struct RawEventLog {
    base_dir: PathBuf,
}

impl RawEventLog {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Session ids may contain characters unsafe in file names.
    pub fn session_dir_name(session_id: &str) -> String {
        let name: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if name.is_empty() || name.starts_with('.') {
            format!("_{name}")
        } else {
            name
        }
    }

    pub fn path_for(&self, session_id: &str, date: NaiveDate) -> PathBuf {
        self.base_dir
            .join(Self::session_dir_name(session_id))
            .join(format!("raw_{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Append `records` to today's file as one locked write.
    pub async fn append(&self, session_id: &str, records: Vec<Value>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let path = self.path_for(session_id, Local::now().date_naive());
        let mut payload = String::new();
        for record in &records {
            payload.push_str(&serde_json::to_string(record)?);
            payload.push('\n');
        }

        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut lock = RwLock::new(file);
            let mut guard = lock
                .write()
                .map_err(|e| Error::lock_failed(e.to_string()))?;
            guard.write_all(payload.as_bytes())?;
            guard.flush()?;
            Ok(())
        })
        .await??;

        Ok(())
    }
}

/// The outgoing side of a turn.
pub fn request_record(session_id: &str, message: &str) -> Value {
    json!({
        "type": "request",
        "timestamp": Utc::now().to_rfc3339(),
        "session_id": session_id,
        "message": message,
    })
}

/// One received event.
pub fn response_record(session_id: &str, event: Value) -> Value {
    json!({
        "type": "response",
        "timestamp": Utc::now().to_rfc3339(),
        "session_id": session_id,
        "event": event,
    })
}

/// Read every well-formed record from a log file. Malformed lines (such as a
/// partially written last line) are skipped.
pub async fn read_records(path: impl Into<PathBuf>) -> Result<Vec<Value>> {
    let path = path.into();
    tokio::task::spawn_blocking(move || -> Result<Vec<Value>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str(trimmed) {
                Ok(value) => records.push(value),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed log line"),
            }
        }
        Ok(records)
    })
    .await?
}
