//! # MemoryStore — in-process task store.
//!
//! A complete [`TaskStore`] implementation over a `BTreeMap`, used by the
//! test suite and suitable for embedding when durability across process
//! restarts is not required. Prefix listing falls out of the ordered map's
//! range scan.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::contract::{StoreError, TaskStore};

/// In-process [`TaskStore`] backed by an ordered map.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Value>,
    wake: Option<DateTime<Utc>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries (wake slot excluded).
    pub fn len(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").entries.len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store lock poisoned")
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock().entries.get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Value>, StoreError> {
        let inner = self.lock();
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(v) = inner.entries.get(key) {
                out.insert(key.clone(), v.clone());
            }
        }
        Ok(out)
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.lock().entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn put_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for (key, value) in entries {
            inner.entries.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock().entries.remove(key).is_some())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        let mut removed = 0;
        for key in keys {
            if inner.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list(&self, prefix: &str) -> Result<BTreeMap<String, Value>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn set_wake_timer(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.lock().wake = Some(at);
        Ok(())
    }

    async fn get_wake_timer(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.lock().wake)
    }

    async fn clear_wake_timer(&self) -> Result<(), StoreError> {
        self.lock().wake = None;
        Ok(())
    }
}
