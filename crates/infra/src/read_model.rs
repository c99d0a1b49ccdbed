//! Key/value storage for read models and reference data.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Duplicate(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Key/value store abstraction. Listing returns values in key order.
pub trait KeyValueStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn upsert(&self, key: K, value: V);
    /// Insert unless the key exists or an existing value `clashes` with the
    /// new one (used for unique display numbers).
    fn insert_unique(
        &self,
        key: K,
        value: V,
        clashes: &dyn Fn(&V, &V) -> bool,
    ) -> Result<(), StoreError>;
    fn remove(&self, key: &K) -> Option<V>;
    fn list(&self) -> Vec<V>;
    fn clear(&self);
}

impl<K, V, S> KeyValueStore<K, V> for Arc<S>
where
    S: KeyValueStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) {
        (**self).upsert(key, value)
    }

    fn insert_unique(
        &self,
        key: K,
        value: V,
        clashes: &dyn Fn(&V, &V) -> bool,
    ) -> Result<(), StoreError> {
        (**self).insert_unique(key, value, clashes)
    }

    fn remove(&self, key: &K) -> Option<V> {
        (**self).remove(key)
    }

    fn list(&self) -> Vec<V> {
        (**self).list()
    }

    fn clear(&self) {
        (**self).clear()
    }
}

/// In-memory store; the API keeps one per collection.
#[derive(Debug)]
pub struct InMemoryStore<K, V> {
    inner: RwLock<BTreeMap<K, V>>,
}

impl<K, V> InMemoryStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KeyValueStore<K, V> for InMemoryStore<K, V>
where
    K: Clone + Ord + core::fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(key).cloned()
    }

    fn upsert(&self, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(key, value);
        }
    }

    fn insert_unique(
        &self,
        key: K,
        value: V,
        clashes: &dyn Fn(&V, &V) -> bool,
    ) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        if map.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("record {key}")));
        }
        if map.values().any(|existing| clashes(existing, &value)) {
            return Err(StoreError::Duplicate(format!("a record like {key}")));
        }
        map.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &K) -> Option<V> {
        let mut map = self.inner.write().ok()?;
        map.remove(key)
    }

    fn list(&self) -> Vec<V> {
        match self.inner.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => vec![],
        }
    }

    fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}
