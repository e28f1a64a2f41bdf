//! Probabilistic membership filters (bloom filters)
//!
//! The decorators consult a filter before touching the store so that lookups
//! for keys that were never written cannot reach the compute function.

mod commands;
mod memory;
mod redis_bloom;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use commands::{BloomCommand, InsertOptions};
pub use memory::InMemoryBloomFilter;
pub use redis_bloom::{DumpChunk, RedisBloomFilter};

use crate::error::FilterError;

/// Membership test and insert, single and batch
///
/// Batch results are positionally aligned with the input items.
#[async_trait]
pub trait MembershipFilter: Send + Sync {
  /// Insert `item`, returning whether it was newly added
  async fn add(&self, key: &str, item: &str) -> Result<bool, FilterError>;

  async fn exists(&self, key: &str, item: &str) -> Result<bool, FilterError>;

  async fn add_multi(&self, key: &str, items: &[&str]) -> Result<Vec<bool>, FilterError>;

  async fn exists_multi(&self, key: &str, items: &[&str]) -> Result<Vec<bool>, FilterError>;

  /// Filter statistics (capacity, size, number of sub-filters, ...)
  async fn info(&self, key: &str) -> Result<HashMap<String, i64>, FilterError>;
}

/// Whether and how a decorated call consults a membership filter
///
/// A value type; clones share the same filter instance.
#[derive(Clone, Default)]
pub struct FilterPolicy {
  enabled: bool,
  filter: Option<Arc<dyn MembershipFilter>>,
  filter_key: String,
}

impl FilterPolicy {
  /// Enabled policy backed by `filter`, testing membership under `filter_key`
  pub fn new(filter: Arc<dyn MembershipFilter>, filter_key: impl Into<String>) -> Self {
    Self {
      enabled: true,
      filter: Some(filter),
      filter_key: filter_key.into(),
    }
  }

  pub fn disabled() -> Self {
    Self::default()
  }

  pub fn with_enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  pub fn with_filter(mut self, filter: Option<Arc<dyn MembershipFilter>>) -> Self {
    self.filter = filter;
    self
  }

  pub fn with_key(mut self, filter_key: impl Into<String>) -> Self {
    self.filter_key = filter_key.into();
    self
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  pub fn filter(&self) -> Option<&Arc<dyn MembershipFilter>> {
    self.filter.as_ref()
  }

  pub fn key(&self) -> &str {
    &self.filter_key
  }
}

impl std::fmt::Debug for FilterPolicy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FilterPolicy")
      .field("enabled", &self.enabled)
      .field("filter", &self.filter.as_ref().map(|_| "<filter>"))
      .field("filter_key", &self.filter_key)
      .finish()
  }
}
