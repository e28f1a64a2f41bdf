//! Per-call cache configuration

use std::sync::Arc;
use std::time::Duration;

use crate::filter::FilterPolicy;
use crate::serializer::{default_serializer, Serializer};
use crate::store::Store;

/// Predicate deciding whether caching applies to a call at all
pub type Admission = Arc<dyn Fn() -> bool + Send + Sync>;

/// One configuration concern
///
/// Options are applied in order; a later option for the same concern
/// replaces an earlier one.
#[derive(Clone)]
pub enum CacheOption {
  Key(String),
  Filter(FilterPolicy),
  Store(Arc<dyn Store>),
  Expires(Duration),
  Serializer(Arc<dyn Serializer>),
  Admission(Admission),
  Sync(bool),
}

impl std::fmt::Debug for CacheOption {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CacheOption::Key(key) => f.debug_tuple("Key").field(key).finish(),
      CacheOption::Filter(policy) => f.debug_tuple("Filter").field(policy).finish(),
      CacheOption::Store(_) => f.write_str("Store(..)"),
      CacheOption::Expires(expires) => f.debug_tuple("Expires").field(expires).finish(),
      CacheOption::Serializer(s) => f.debug_tuple("Serializer").field(&s.name()).finish(),
      CacheOption::Admission(_) => f.write_str("Admission(..)"),
      CacheOption::Sync(sync) => f.debug_tuple("Sync").field(sync).finish(),
    }
  }
}

/// Mutable builder; [`CacheConfigBuilder::build`] freezes it
pub struct CacheConfigBuilder {
  key: String,
  filter: FilterPolicy,
  store: Option<Arc<dyn Store>>,
  expires: Duration,
  serializer: Arc<dyn Serializer>,
  admission: Option<Admission>,
  sync: bool,
}

impl Default for CacheConfigBuilder {
  fn default() -> Self {
    Self {
      key: String::new(),
      filter: FilterPolicy::default(),
      store: None,
      expires: Duration::ZERO,
      serializer: default_serializer(),
      admission: None,
      sync: false,
    }
  }
}

impl CacheConfigBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn apply(&mut self, option: CacheOption) {
    match option {
      CacheOption::Key(key) => self.key = key,
      CacheOption::Filter(policy) => self.filter = policy,
      CacheOption::Store(store) => self.store = Some(store),
      CacheOption::Expires(expires) => self.expires = expires,
      CacheOption::Serializer(serializer) => self.serializer = serializer,
      CacheOption::Admission(admission) => self.admission = Some(admission),
      CacheOption::Sync(sync) => self.sync = sync,
    }
  }

  pub fn with_option(mut self, option: CacheOption) -> Self {
    self.apply(option);
    self
  }

  pub fn with_options(mut self, options: impl IntoIterator<Item = CacheOption>) -> Self {
    for option in options {
      self.apply(option);
    }
    self
  }

  pub fn key(self, key: impl Into<String>) -> Self {
    self.with_option(CacheOption::Key(key.into()))
  }

  pub fn filter(self, policy: FilterPolicy) -> Self {
    self.with_option(CacheOption::Filter(policy))
  }

  pub fn store(self, store: Arc<dyn Store>) -> Self {
    self.with_option(CacheOption::Store(store))
  }

  pub fn expires(self, expires: Duration) -> Self {
    self.with_option(CacheOption::Expires(expires))
  }

  pub fn serializer(self, serializer: Arc<dyn Serializer>) -> Self {
    self.with_option(CacheOption::Serializer(serializer))
  }

  pub fn admission(self, condition: impl Fn() -> bool + Send + Sync + 'static) -> Self {
    self.with_option(CacheOption::Admission(Arc::new(condition)))
  }

  pub fn sync(self, sync: bool) -> Self {
    self.with_option(CacheOption::Sync(sync))
  }

  pub fn build(self) -> CacheConfiguration {
    CacheConfiguration {
      key: self.key,
      filter: self.filter,
      store: self.store,
      expires: self.expires,
      serializer: self.serializer,
      admission: self.admission,
      sync: self.sync,
    }
  }
}

/// Frozen configuration for one decorated call
///
/// An empty key disables caching for the call. A non-empty key needs a store;
/// the engine reports a configuration error instead of touching a missing one.
#[derive(Clone)]
pub struct CacheConfiguration {
  key: String,
  filter: FilterPolicy,
  store: Option<Arc<dyn Store>>,
  expires: Duration,
  serializer: Arc<dyn Serializer>,
  admission: Option<Admission>,
  sync: bool,
}

impl CacheConfiguration {
  pub fn builder() -> CacheConfigBuilder {
    CacheConfigBuilder::new()
  }

  pub fn from_options(options: impl IntoIterator<Item = CacheOption>) -> Self {
    CacheConfigBuilder::new().with_options(options).build()
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn filter(&self) -> &FilterPolicy {
    &self.filter
  }

  pub fn store(&self) -> Option<&Arc<dyn Store>> {
    self.store.as_ref()
  }

  pub fn expires(&self) -> Duration {
    self.expires
  }

  pub fn serializer(&self) -> &dyn Serializer {
    self.serializer.as_ref()
  }

  pub fn sync(&self) -> bool {
    self.sync
  }

  /// `false` only when an admission condition is set and rejects the call
  pub fn admits(&self) -> bool {
    self.admission.as_ref().map_or(true, |condition| condition())
  }
}

impl std::fmt::Debug for CacheConfiguration {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheConfiguration")
      .field("key", &self.key)
      .field("filter", &self.filter)
      .field("store", &self.store.as_ref().map(|_| "<store>"))
      .field("expires", &self.expires)
      .field("serializer", &self.serializer.name())
      .field("admission", &self.admission.is_some())
      .field("sync", &self.sync)
      .finish()
  }
}
