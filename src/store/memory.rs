//! In-process store

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::entry::CacheEntry;
use super::{MultiGet, Store};
use crate::error::StoreError;

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
  pub keys: usize,
  pub memory_used: usize,
  pub hits: u64,
  pub misses: u64,
  pub expired: u64,
}

impl StoreStats {
  pub fn hit_rate(&self) -> f64 {
    let total = self.hits + self.misses;
    if total == 0 {
      0.0
    } else {
      self.hits as f64 / total as f64
    }
  }
}

/// In-memory store with lazy TTL expiry
///
/// Useful for tests and single-process deployments. Expired entries are
/// dropped when touched or by [`InMemoryStore::evict_expired`].
#[derive(Default)]
pub struct InMemoryStore {
  data: RwLock<HashMap<String, CacheEntry>>,
  hits: AtomicU64,
  misses: AtomicU64,
  expired: AtomicU64,
}

impl InMemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Drop every expired entry, returning how many were removed
  pub fn evict_expired(&self) -> usize {
    let mut data = self.data.write();
    let before = data.len();
    data.retain(|_, entry| !entry.is_expired());
    let count = before - data.len();
    self.expired.fetch_add(count as u64, Ordering::Relaxed);
    if count > 0 {
      tracing::debug!("Evicted {} expired cache entries", count);
    }
    count
  }

  /// Number of live keys
  pub fn len(&self) -> usize {
    let data = self.data.read();
    data.values().filter(|e| !e.is_expired()).count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Remaining lifetime of a key, `None` when absent or without expiry
  pub fn ttl(&self, key: &str) -> Option<Duration> {
    let data = self.data.read();
    data
      .get(key)
      .filter(|e| !e.is_expired())
      .and_then(CacheEntry::ttl_remaining)
  }

  pub fn stats(&self) -> StoreStats {
    let data = self.data.read();
    let live = data.values().filter(|e| !e.is_expired());
    let (keys, memory_used) = live.fold((0, 0), |(k, m), e| (k + 1, m + e.size()));
    StoreStats {
      keys,
      memory_used,
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      expired: self.expired.load(Ordering::Relaxed),
    }
  }

  /// Whether `key` holds a live entry, dropping it if it has expired
  fn live(&self, data: &mut HashMap<String, CacheEntry>, key: &str) -> bool {
    match data.get(key) {
      Some(entry) if entry.is_expired() => {
        data.remove(key);
        self.expired.fetch_add(1, Ordering::Relaxed);
        false
      }
      Some(_) => true,
      None => false,
    }
  }

  fn lookup(&self, key: &str) -> Option<Vec<u8>> {
    let mut data = self.data.write();
    if self.live(&mut data, key) {
      self.hits.fetch_add(1, Ordering::Relaxed);
      data.get(key).map(|e| e.value.clone())
    } else {
      self.misses.fetch_add(1, Ordering::Relaxed);
      None
    }
  }
}

#[async_trait]
impl Store for InMemoryStore {
  async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
    self.lookup(key).ok_or(StoreError::CacheMiss)
  }

  async fn get_multi(&self, keys: &[&str]) -> Result<MultiGet, StoreError> {
    Ok(
      keys
        .iter()
        .filter_map(|key| self.lookup(key).map(|v| (key.to_string(), v)))
        .collect(),
    )
  }

  async fn set(&self, key: &str, value: &[u8], expires: Duration) -> Result<(), StoreError> {
    let mut data = self.data.write();
    data.insert(key.to_string(), CacheEntry::new(value.to_vec(), expires));
    Ok(())
  }

  async fn add(&self, key: &str, value: &[u8], expires: Duration) -> Result<(), StoreError> {
    let mut data = self.data.write();
    if self.live(&mut data, key) {
      return Err(StoreError::InvalidValue);
    }
    data.insert(key.to_string(), CacheEntry::new(value.to_vec(), expires));
    Ok(())
  }

  async fn replace(
    &self,
    key: &str,
    value: &[u8],
    expires: Duration,
  ) -> Result<(), StoreError> {
    let mut data = self.data.write();
    if !self.live(&mut data, key) {
      return Err(StoreError::NotStored);
    }
    data.insert(key.to_string(), CacheEntry::new(value.to_vec(), expires));
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    self.data.write().remove(key);
    Ok(())
  }

  async fn delete_multi(&self, keys: &[&str]) -> Result<(), StoreError> {
    let mut data = self.data.write();
    for key in keys {
      data.remove(*key);
    }
    Ok(())
  }
}
