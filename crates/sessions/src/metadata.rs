use std::{collections::HashMap, sync::RwLock};

use serde_json::{Map, Value};

/// Free-form per-session values supplied by adapters (timezone, thread
/// reference, ...). Read when building options and routing uploads; never
/// part of the config fingerprint.
#[derive(Debug, Default)]
pub struct SessionMetadataStore {
    entries: RwLock<HashMap<String, Map<String, Value>>>,
}

impl SessionMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a session's metadata; empty when none was set.
    pub fn get(&self, session_id: &str) -> Map<String, Value> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(session_id).cloned().unwrap_or_default()
    }

    pub fn get_value(&self, session_id: &str, key: &str) -> Option<Value> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(session_id).and_then(|m| m.get(key)).cloned()
    }

    pub fn set(&self, session_id: &str, key: impl Into<String>, value: Value) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(session_id.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    /// Overlay `values` onto the session's metadata.
    pub fn merge(&self, session_id: &str, values: Map<String, Value>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(session_id.to_string())
            .or_default()
            .extend(values);
    }

    pub fn remove(&self, session_id: &str, key: &str) -> Option<Value> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.get_mut(session_id).and_then(|m| m.remove(key))
    }

    pub fn clear(&self, session_id: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(session_id);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_merge_and_clear() {
        let store = SessionMetadataStore::new();
        assert!(store.get("slack_C1").is_empty());

        store.set("slack_C1", "user_timezone", json!("Europe/Paris"));
        let mut more = Map::new();
        more.insert("thread_ts".into(), json!("171.2"));
        store.merge("slack_C1", more);

        let meta = store.get("slack_C1");
        assert_eq!(meta["user_timezone"], "Europe/Paris");
        assert_eq!(meta["thread_ts"], "171.2");
        assert!(store.get("slack_C2").is_empty());

        assert_eq!(store.remove("slack_C1", "thread_ts"), Some(json!("171.2")));
        assert_eq!(store.get_value("slack_C1", "thread_ts"), None);

        store.clear("slack_C1");
        assert!(store.get("slack_C1").is_empty());
    }
}
