use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crate::coord::{BoxFuture, CoordStore};
use crate::error::StoreError;

/// Process-local coordination store for tests and single-process runs.
pub struct InMemoryCoordStore {
    keys: RwLock<HashMap<String, String>>,
    queues: RwLock<HashMap<String, VecDeque<String>>>,
}

impl InMemoryCoordStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCoordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCoordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCoordStore").finish_non_exhaustive()
    }
}

fn poisoned(e: impl std::fmt::Display) -> StoreError {
    StoreError::Other(e.to_string())
}

impl CoordStore for InMemoryCoordStore {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, StoreError>> {
        let key = key.to_owned();
        Box::pin(async move {
            let keys = self.keys.read().map_err(poisoned)?;
            Ok(keys.get(&key).cloned())
        })
    }

    fn set(&self, key: &str, value: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_owned();
        let value = value.to_owned();
        Box::pin(async move {
            let mut keys = self.keys.write().map_err(poisoned)?;
            keys.insert(key, value);
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_owned();
        Box::pin(async move {
            let mut keys = self.keys.write().map_err(poisoned)?;
            keys.remove(&key);
            Ok(())
        })
    }

    fn exists(&self, key: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let key = key.to_owned();
        Box::pin(async move {
            let keys = self.keys.read().map_err(poisoned)?;
            Ok(keys.contains_key(&key))
        })
    }

    fn push(&self, queue: &str, value: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let queue = queue.to_owned();
        let value = value.to_owned();
        Box::pin(async move {
            let mut queues = self.queues.write().map_err(poisoned)?;
            queues.entry(queue).or_default().push_back(value);
            Ok(())
        })
    }

    fn pop(&self, queue: &str) -> BoxFuture<'_, Result<Option<String>, StoreError>> {
        let queue = queue.to_owned();
        Box::pin(async move {
            let mut queues = self.queues.write().map_err(poisoned)?;
            Ok(queues.get_mut(&queue).and_then(VecDeque::pop_front))
        })
    }

    fn delete_prefix(&self, prefix: &str) -> BoxFuture<'_, Result<usize, StoreError>> {
        let prefix = prefix.to_owned();
        Box::pin(async move {
            let mut removed = 0;
            {
                let mut keys = self.keys.write().map_err(poisoned)?;
                let before = keys.len();
                keys.retain(|k, _| !k.starts_with(&prefix));
                removed += before - keys.len();
            }
            {
                let mut queues = self.queues.write().map_err(poisoned)?;
                let before = queues.len();
                queues.retain(|k, _| !k.starts_with(&prefix));
                removed += before - queues.len();
            }
            Ok(removed)
        })
    }
}
