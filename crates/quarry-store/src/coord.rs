//! Coordination store: the single source of truth for job status, results,
//! and per-analyzer query queues, shared between the front door and worker
//! processes.
//!
//! Semantics are deliberately small: string keys with last-writer-wins
//! writes, FIFO list queues, and prefix deletion for bulk teardown. No
//! operation spans more than one key, so readers must tolerate transient
//! inconsistency between related keys (e.g. a status write landing before
//! its result write).

use std::future::Future;
use std::pin::Pin;

use crate::error::StoreError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait CoordStore: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, StoreError>>;

    fn set(&self, key: &str, value: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    fn exists(&self, key: &str) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Append to the tail of a FIFO queue.
    fn push(&self, queue: &str, value: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Pop from the head of a FIFO queue; `None` when empty. Non-blocking.
    fn pop(&self, queue: &str) -> BoxFuture<'_, Result<Option<String>, StoreError>>;

    /// Delete every key (and queue) whose name starts with `prefix`,
    /// returning the number of entries removed.
    fn delete_prefix(&self, prefix: &str) -> BoxFuture<'_, Result<usize, StoreError>>;
}
