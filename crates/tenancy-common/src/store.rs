//! Versioned key-value store with compare-and-swap updates
//!
//! Every entry carries a version that increases on each write. Single-key
//! read-modify-write sequences go through [`apply_atomic`], which retries a
//! compare-and-swap until it wins or the attempt budget is spent, so two
//! writers touching the same key never lose each other's update.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Value paired with its write version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<V> {
    /// Stored value
    pub value: V,
    /// Write version, 1 for a fresh key
    pub version: u64,
}

/// Key-value store port
#[async_trait]
pub trait KeyValueStore<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Read a value and its version
    async fn get(&self, key: &K) -> StoreResult<Option<Versioned<V>>>;

    /// Unconditional write, returns the new version
    async fn put(&self, key: K, value: V) -> StoreResult<u64>;

    /// Write only if the key is absent
    async fn put_if_absent(&self, key: K, value: V) -> StoreResult<bool>;

    /// Remove a key, returning the previous value
    async fn delete(&self, key: &K) -> StoreResult<Option<V>>;

    /// Write only if the stored version still equals `expected_version`
    async fn compare_and_swap(&self, key: &K, expected_version: u64, value: V) -> StoreResult<bool>;

    /// Snapshot of all entries
    async fn entries(&self) -> StoreResult<Vec<(K, V)>>;
}

/// Apply `f` to the value at `key` atomically.
///
/// Returns `Ok(None)` when the key is absent; `f` is never called then.
pub async fn apply_atomic<K, V, S, F>(
    store: &S,
    key: &K,
    max_attempts: u32,
    mut f: F,
) -> StoreResult<Option<V>>
where
    K: Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: KeyValueStore<K, V> + ?Sized,
    F: FnMut(&V) -> V + Send,
{
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        let current = match store.get(key).await? {
            Some(current) => current,
            None => return Ok(None),
        };
        let next = f(&current.value);
        if store.compare_and_swap(key, current.version, next.clone()).await? {
            return Ok(Some(next));
        }
        tracing::debug!(?key, attempt, "compare-and-swap lost, retrying");
    }

    Err(StoreError::Contention {
        key: format!("{:?}", key),
        attempts,
    })
}

/// In-memory store (for testing and development)
pub struct InMemoryKeyValueStore<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Versioned<V>>,
}

impl<K, V> InMemoryKeyValueStore<K, V>
where
    K: Eq + Hash,
{
    /// Empty store
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no key is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for InMemoryKeyValueStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> KeyValueStore<K, V> for InMemoryKeyValueStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> StoreResult<Option<Versioned<V>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: K, value: V) -> StoreResult<u64> {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.value = value;
                slot.version += 1;
                Ok(slot.version)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Versioned { value, version: 1 });
                Ok(1)
            }
        }
    }

    async fn put_if_absent(&self, key: K, value: V) -> StoreResult<bool> {
        match self.entries.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(Versioned { value, version: 1 });
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &K) -> StoreResult<Option<V>> {
        Ok(self.entries.remove(key).map(|(_, stored)| stored.value))
    }

    async fn compare_and_swap(&self, key: &K, expected_version: u64, value: V) -> StoreResult<bool> {
        match self.entries.get_mut(key) {
            Some(mut slot) if slot.version == expected_version => {
                slot.value = value;
                slot.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn entries(&self) -> StoreResult<Vec<(K, V)>> {
        Ok(self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect())
    }
}
