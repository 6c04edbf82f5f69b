//! Validation Cache
//!
//! Bounded store of validation bundles keyed by a digest of the normalized SQL
//! and the business context digest. Eviction is insertion-ordered: the entry
//! with the lowest sequence number goes first.
//!
//! The cache also hands out per-key locks so that only one computation per key
//! is in flight at a time.

use crate::error::{ResolutionError, Result};
use crate::text::collapse_whitespace;
use crate::validation::aspect::ValidationBundle;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Hex SHA-256 digest identifying a (SQL, business context) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim and collapse whitespace runs. No other rewriting is done.
pub fn normalize_sql(sql: &str) -> String {
    collapse_whitespace(sql)
}

/// `sha256(normalize_sql(sql) || 0x1F || business_context_digest)`
pub fn cache_key(sql: &str, business_context_digest: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(normalize_sql(sql).as_bytes());
    hasher.update(b"\x1f");
    hasher.update(business_context_digest.as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    bundle: ValidationBundle,
    sequence: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// sequence -> key, oldest first
    order: BTreeMap<u64, CacheKey>,
    next_sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
    pub capacity: usize,
}

pub struct ValidationCache {
    capacity: usize,
    state: RwLock<CacheState>,
    locks: Arc<DashMap<CacheKey, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ValidationCache {
    /// A capacity of 0 disables storage
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: RwLock::new(CacheState::default()),
            locks: Arc::new(DashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn unavailable<E: fmt::Display>(e: E) -> ResolutionError {
        ResolutionError::CacheUnavailable(format!("cache lock poisoned: {}", e))
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<ValidationBundle>> {
        let state = self.state.read().map_err(Self::unavailable)?;
        match state.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.bundle.clone()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    pub fn contains(&self, key: &CacheKey) -> Result<bool> {
        let state = self.state.read().map_err(Self::unavailable)?;
        Ok(state.entries.contains_key(key))
    }

    /// Store a bundle, evicting the oldest entries when over capacity.
    ///
    /// Replacing an existing key keeps its original sequence number.
    /// Returns the evicted keys.
    pub fn insert(&self, key: CacheKey, bundle: ValidationBundle) -> Result<Vec<CacheKey>> {
        if self.capacity == 0 {
            return Ok(Vec::new());
        }
        let mut state = self.state.write().map_err(Self::unavailable)?;

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.bundle = bundle;
            return Ok(Vec::new());
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.order.insert(sequence, key.clone());
        state.entries.insert(key, CacheEntry { bundle, sequence });

        let mut evicted = Vec::new();
        while state.entries.len() > self.capacity {
            let Some((_, oldest)) = state.order.pop_first() else {
                break;
            };
            if let Some(entry) = state.entries.remove(&oldest) {
                debug!("Evicted cache entry {} (seq {})", oldest, entry.sequence);
            }
            evicted.push(oldest);
        }
        self.evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        Ok(evicted)
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry; counters are kept
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.write().map_err(Self::unavailable)?;
        *state = CacheState::default();
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.len(),
            capacity: self.capacity,
        }
    }

    /// Acquire the per-key lock. Released when the lease is dropped.
    pub async fn lock(&self, key: &CacheKey) -> KeyLease {
        let mutex = {
            let entry = self.locks.entry(key.clone()).or_default();
            Arc::clone(entry.value())
        };
        let guard = mutex.lock_owned().await;
        KeyLease {
            key: key.clone(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Keys with a lock currently held or awaited
    pub fn locked_keys(&self) -> usize {
        self.locks.len()
    }

    pub fn is_locked(&self, key: &CacheKey) -> bool {
        self.locks
            .get(key)
            .map(|m| m.value().try_lock().is_err())
            .unwrap_or(false)
    }

    /// Panic while holding the state write lock, leaving it poisoned
    #[cfg(test)]
    pub(crate) fn poison_state(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.state.write();
            panic!("cache writer crashed");
        }));
    }
}

/// Holds a per-key lock; the lock entry is removed once no one else waits on it
pub struct KeyLease {
    key: CacheKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl KeyLease {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
