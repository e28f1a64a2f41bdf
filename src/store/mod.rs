//! Key-value stores the decorators cache into
//!
//! Values are raw bytes; typing is the serializer's job. A zero expiry means
//! the entry never expires.

mod entry;
mod memory;
mod redis_store;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub use redis_store::{cache_hash_key, RedisStore};
pub use entry::CacheEntry;
pub use memory::{InMemoryStore, StoreStats};

use crate::error::StoreError;

/// Cache store trait
///
/// Implementations must be safe for concurrent use; the decorator engine
/// shares one store across any number of in-flight calls.
#[async_trait]
pub trait Store: Send + Sync {
  /// Fetch the raw value, `StoreError::CacheMiss` when absent
  async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

  /// Fetch several keys at once; absent keys are left out of the result
  async fn get_multi(&self, keys: &[&str]) -> Result<MultiGet, StoreError>;

  /// Unconditional upsert
  async fn set(&self, key: &str, value: &[u8], expires: Duration) -> Result<(), StoreError>;

  /// Insert only; `StoreError::InvalidValue` if the key exists
  async fn add(&self, key: &str, value: &[u8], expires: Duration) -> Result<(), StoreError>;

  /// Update only; `StoreError::NotStored` if the key is absent
  async fn replace(&self, key: &str, value: &[u8], expires: Duration)
    -> Result<(), StoreError>;

  /// Remove a key; absent keys are not an error
  async fn delete(&self, key: &str) -> Result<(), StoreError>;

  async fn delete_multi(&self, keys: &[&str]) -> Result<(), StoreError>;
}

/// Result of a batch lookup, covering only the keys that resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiGet {
  items: HashMap<String, Vec<u8>>,
}

impl MultiGet {
  pub fn new(items: HashMap<String, Vec<u8>>) -> Self {
    Self { items }
  }

  pub fn get(&self, key: &str) -> Result<&[u8], StoreError> {
    self
      .items
      .get(key)
      .map(Vec::as_slice)
      .ok_or(StoreError::CacheMiss)
  }

  pub fn contains(&self, key: &str) -> bool {
    self.items.contains_key(key)
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.items.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

impl FromIterator<(String, Vec<u8>)> for MultiGet {
  fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
    Self {
      items: iter.into_iter().collect(),
    }
  }
}
