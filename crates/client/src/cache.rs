//! Client-side query cache.
//!
//! The one place fetched server state is kept on the client. Entries are
//! keyed by resource path (`requisitions/<id>`, `requisitions?page=1`, ...),
//! expire after `max_age`, and are dropped explicitly after mutations.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone)]
struct Entry {
    data: JsonValue,
    cached_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct QueryCache {
    entries: RwLock<HashMap<String, Entry>>,
    max_age: Duration,
}

impl QueryCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_at(key, Utc::now())
    }

    /// Like [`QueryCache::get`], against an explicit clock.
    pub fn get_at<T: DeserializeOwned>(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        if now.signed_duration_since(entry.cached_at) > self.max_age {
            return None;
        }
        match serde_json::from_value(entry.data.clone()) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%key, error = %err, "cached entry has an unexpected shape");
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, key: impl Into<String>, value: &T) {
        self.put_at(key, value, Utc::now());
    }

    pub fn put_at<T: Serialize>(&self, key: impl Into<String>, value: &T, now: DateTime<Utc>) {
        let key = key.into();
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(%key, error = %err, "failed to cache value");
                return;
            }
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key,
                Entry {
                    data,
                    cached_at: now,
                },
            );
        }
    }

    pub fn invalidate(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    /// Drop every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let dropped = before - entries.len();
        tracing::debug!(%prefix, dropped, "cache invalidated");
        dropped
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
