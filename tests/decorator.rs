use acorn::decorator::{cache_enable, cache_evict, cache_put, CacheConfiguration, CacheOption};
use acorn::error::{CacheError, CacheErrorKind, FilterError, StoreError};
use acorn::filter::{FilterPolicy, InMemoryBloomFilter, MembershipFilter};
use acorn::serializer::{CacheValue, JsonSerializer, Structured};
use acorn::store::{InMemoryStore, MultiGet, Store};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Application error wrapping cache failures
#[derive(Debug, PartialEq)]
enum AppError {
  Compute(String),
  Cache(CacheErrorKind),
}

impl From<CacheError> for AppError {
  fn from(e: CacheError) -> Self {
    AppError::Cache(e.kind())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
  id: u64,
  name: String,
  tags: Vec<String>,
}

impl CacheValue for User {}

/// Store that records every call and fails on demand
#[derive(Default)]
struct RecordingStore {
  inner: InMemoryStore,
  calls: Mutex<Vec<String>>,
  fail_get: bool,
  fail_delete: bool,
}

impl RecordingStore {
  fn calls(&self) -> Vec<String> {
    self.calls.lock().clone()
  }

  fn record(&self, call: impl Into<String>) {
    self.calls.lock().push(call.into());
  }
}

#[async_trait]
impl Store for RecordingStore {
  async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
    self.record(format!("get {}", key));
    if self.fail_get {
      return Err(StoreError::Backend("connection reset".into()));
    }
    self.inner.get(key).await
  }

  async fn get_multi(&self, keys: &[&str]) -> Result<MultiGet, StoreError> {
    self.record("get_multi");
    self.inner.get_multi(keys).await
  }

  async fn set(&self, key: &str, value: &[u8], expires: Duration) -> Result<(), StoreError> {
    self.record(format!("set {}", key));
    self.inner.set(key, value, expires).await
  }

  async fn add(&self, key: &str, value: &[u8], expires: Duration) -> Result<(), StoreError> {
    self.record(format!("add {}", key));
    self.inner.add(key, value, expires).await
  }

  async fn replace(&self, key: &str, value: &[u8], expires: Duration) -> Result<(), StoreError> {
    self.record(format!("replace {}", key));
    self.inner.replace(key, value, expires).await
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    self.record(format!("delete {}", key));
    self.inner.delete(key).await
  }

  async fn delete_multi(&self, keys: &[&str]) -> Result<(), StoreError> {
    self.record(format!("delete_multi {}", keys.join(",")));
    if self.fail_delete {
      return Err(StoreError::Backend("read only replica".into()));
    }
    self.inner.delete_multi(keys).await
  }
}

/// Filter with a fixed membership set that records calls
#[derive(Default)]
struct ScriptedFilter {
  members: Mutex<HashMap<String, Vec<String>>>,
  calls: Mutex<Vec<String>>,
  fail_add: bool,
}

impl ScriptedFilter {
  fn with_member(key: &str, item: &str) -> Self {
    let filter = Self::default();
    filter
      .members
      .lock()
      .insert(key.to_string(), vec![item.to_string()]);
    filter
  }

  fn calls(&self) -> Vec<String> {
    self.calls.lock().clone()
  }
}

#[async_trait]
impl MembershipFilter for ScriptedFilter {
  async fn add(&self, key: &str, item: &str) -> Result<bool, FilterError> {
    self.calls.lock().push(format!("add {} {}", key, item));
    if self.fail_add {
      return Err(FilterError::Backend("filter offline".into()));
    }
    let mut members = self.members.lock();
    let items = members.entry(key.to_string()).or_default();
    if items.iter().any(|i| i == item) {
      return Ok(false);
    }
    items.push(item.to_string());
    Ok(true)
  }

  async fn exists(&self, key: &str, item: &str) -> Result<bool, FilterError> {
    self.calls.lock().push(format!("exists {} {}", key, item));
    Ok(
      self
        .members
        .lock()
        .get(key)
        .is_some_and(|items| items.iter().any(|i| i == item)),
    )
  }

  async fn add_multi(&self, key: &str, items: &[&str]) -> Result<Vec<bool>, FilterError> {
    let mut results = Vec::new();
    for item in items {
      results.push(self.add(key, item).await?);
    }
    Ok(results)
  }

  async fn exists_multi(&self, key: &str, items: &[&str]) -> Result<Vec<bool>, FilterError> {
    let mut results = Vec::new();
    for item in items {
      results.push(self.exists(key, item).await?);
    }
    Ok(results)
  }

  async fn info(&self, _key: &str) -> Result<HashMap<String, i64>, FilterError> {
    Ok(HashMap::new())
  }
}

async fn must_not_run<T>() -> Result<T, AppError> {
  panic!("compute must not be invoked");
}

async fn never_computed() -> Result<i64, CacheError> {
  panic!("compute must not be invoked");
}

fn config_for(store: Arc<dyn Store>) -> CacheConfiguration {
  CacheConfiguration::builder().key("k").store(store).build()
}

#[tokio::test]
async fn test_hit_path_skips_compute() {
  let store = Arc::new(InMemoryStore::new());
  store.set("k", b"42", Duration::ZERO).await.unwrap();

  let value: i64 = cache_enable(must_not_run, &config_for(store)).await.unwrap();
  assert_eq!(value, 42);
}

#[tokio::test]
async fn test_miss_path_populates_store() {
  let store = Arc::new(InMemoryStore::new());
  let calls = AtomicUsize::new(0);
  let counter = &calls;

  let value: i64 = cache_enable(
    || async move {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok::<_, AppError>(7)
    },
    &config_for(store.clone()),
  )
  .await
  .unwrap();

  assert_eq!(value, 7);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(store.get("k").await.unwrap(), b"7".to_vec());

  // second call is served from the store
  let again: i64 = cache_enable(must_not_run, &config_for(store)).await.unwrap();
  assert_eq!(again, 7);
}

#[tokio::test]
async fn test_structured_values_round_trip_through_cache() {
  let store = Arc::new(InMemoryStore::new());
  let user = User {
    id: 1,
    name: "ada".into(),
    tags: vec!["admin".into()],
  };

  let expected = user.clone();
  let first: User = cache_enable(
    move || async move { Ok::<_, AppError>(user) },
    &config_for(store.clone()),
  )
  .await
  .unwrap();
  assert_eq!(first, expected);

  let cached: User = cache_enable(must_not_run, &config_for(store)).await.unwrap();
  assert_eq!(cached, expected);
}

#[tokio::test]
async fn test_json_serializer_option() {
  let store = Arc::new(InMemoryStore::new());
  let config = CacheConfiguration::from_options(vec![
    CacheOption::Key("list".into()),
    CacheOption::Store(store.clone()),
    CacheOption::Serializer(Arc::new(JsonSerializer)),
  ]);

  let ids: Structured<Vec<u32>> = cache_enable(
    || async { Ok::<_, AppError>(Structured(vec![3, 1, 2])) },
    &config,
  )
  .await
  .unwrap();
  assert_eq!(ids.into_inner(), vec![3, 1, 2]);
  assert_eq!(store.get("list").await.unwrap(), b"[3,1,2]".to_vec());
}

#[tokio::test]
async fn test_compute_error_is_returned_verbatim_and_nothing_stored() {
  let store = Arc::new(InMemoryStore::new());
  let result: Result<i64, AppError> = cache_enable(
    || async { Err(AppError::Compute("db down".into())) },
    &config_for(store.clone()),
  )
  .await;

  assert_eq!(result, Err(AppError::Compute("db down".into())));
  assert!(store.is_empty());
}

#[tokio::test]
async fn test_store_transport_error_is_wrapped() {
  let store = Arc::new(RecordingStore {
    fail_get: true,
    ..Default::default()
  });
  let result: Result<i64, AppError> = cache_enable(must_not_run, &config_for(store)).await;
  assert_eq!(result, Err(AppError::Cache(CacheErrorKind::Store)));
}

#[tokio::test]
async fn test_penetration_guard_rejects_unknown_key() {
  let store = Arc::new(RecordingStore::default());
  store.inner.set("k", b"1", Duration::ZERO).await.unwrap();
  let filter = Arc::new(ScriptedFilter::default());

  let config = CacheConfiguration::builder()
    .key("k")
    .store(store.clone())
    .filter(FilterPolicy::new(filter.clone(), "f"))
    .build();

  let err = cache_enable(never_computed, &config).await.unwrap_err();

  assert!(err.is_not_found());
  assert_eq!(err.to_string(), "item is not found: k");
  assert_eq!(filter.calls(), vec!["exists f k"]);
  assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_known_key_passes_guard() {
  let store = Arc::new(InMemoryStore::new());
  let filter = Arc::new(ScriptedFilter::with_member("f", "k"));
  let config = CacheConfiguration::builder()
    .key("k")
    .store(store)
    .filter(FilterPolicy::new(filter, "f"))
    .build();

  let value: u8 = cache_enable(|| async { Ok::<_, AppError>(3) }, &config)
    .await
    .unwrap();
  assert_eq!(value, 3);
}

#[tokio::test]
async fn test_filter_enabled_without_instance_bypasses_cache() {
  let store = Arc::new(RecordingStore::default());
  let config = CacheConfiguration::builder()
    .key("k")
    .store(store.clone())
    .filter(FilterPolicy::disabled().with_enabled(true).with_key("f"))
    .build();

  let value: i32 = cache_enable(|| async { Ok::<_, AppError>(-5) }, &config)
    .await
    .unwrap();
  assert_eq!(value, -5);
  assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_admission_gate_skips_all_caching() {
  let store = Arc::new(RecordingStore::default());
  let filter = Arc::new(ScriptedFilter::default());
  let config = CacheConfiguration::builder()
    .key("k")
    .store(store.clone())
    .filter(FilterPolicy::new(filter.clone(), "f"))
    .admission(|| false)
    .build();

  let read: u64 = cache_enable(|| async { Ok::<_, AppError>(11) }, &config)
    .await
    .unwrap();
  let written: u64 = cache_put(|| async { Ok::<_, AppError>(12) }, &config)
    .await
    .unwrap();

  assert_eq!((read, written), (11, 12));
  assert!(store.calls().is_empty());
  assert!(filter.calls().is_empty());
}

#[tokio::test]
async fn test_empty_key_bypasses_cache() {
  let config = CacheConfiguration::builder().build();
  let value: i64 = cache_enable(|| async { Ok::<_, AppError>(1) }, &config)
    .await
    .unwrap();
  assert_eq!(value, 1);
}

#[tokio::test]
async fn test_sync_rereads_store_once_before_computing() {
  let store = Arc::new(RecordingStore::default());
  let config = CacheConfiguration::builder()
    .key("k")
    .store(store.clone())
    .sync(true)
    .build();

  let value: i64 = cache_enable(|| async { Ok::<_, AppError>(8) }, &config)
    .await
    .unwrap();
  assert_eq!(value, 8);
  assert_eq!(store.calls(), vec!["get k", "get k", "set k"]);
}

#[tokio::test]
async fn test_put_computes_before_touching_store() {
  let store = Arc::new(RecordingStore::default());
  let config = CacheConfiguration::builder()
    .key("k")
    .store(store.clone())
    .build();

  let observed = store.clone();
  let result: Result<i64, AppError> = cache_put(
    move || async move {
      assert!(observed.calls().is_empty());
      Err(AppError::Compute("rejected".into()))
    },
    &config,
  )
  .await;

  assert_eq!(result, Err(AppError::Compute("rejected".into())));
  assert!(store.calls().is_empty());
  assert!(store.inner.is_empty());
}

#[tokio::test]
async fn test_put_stores_and_registers_key_in_filter() {
  let store = Arc::new(InMemoryStore::new());
  let filter = Arc::new(InMemoryBloomFilter::new());
  let config = CacheConfiguration::builder()
    .key("user:9")
    .store(store.clone())
    .filter(FilterPolicy::new(filter.clone(), "users"))
    .build();

  let value: i64 = cache_put(|| async { Ok::<_, AppError>(99) }, &config)
    .await
    .unwrap();
  assert_eq!(value, 99);
  assert_eq!(store.get("user:9").await.unwrap(), b"99".to_vec());
  assert!(filter.exists("users", "user:9").await.unwrap());

  // later reads now pass the guard
  let read: i64 = cache_enable(must_not_run, &config).await.unwrap();
  assert_eq!(read, 99);
}

#[tokio::test]
async fn test_put_skips_add_for_known_key() {
  let store = Arc::new(InMemoryStore::new());
  let filter = Arc::new(ScriptedFilter::with_member("f", "k"));
  let config = CacheConfiguration::builder()
    .key("k")
    .store(store)
    .filter(FilterPolicy::new(filter.clone(), "f"))
    .build();

  let _: i64 = cache_put(|| async { Ok::<_, AppError>(1) }, &config)
    .await
    .unwrap();
  assert_eq!(filter.calls(), vec!["exists f k"]);
}

#[tokio::test]
async fn test_put_filter_failure_surfaces_after_store_write() {
  let store = Arc::new(InMemoryStore::new());
  let filter = Arc::new(ScriptedFilter {
    fail_add: true,
    ..Default::default()
  });
  let config = CacheConfiguration::builder()
    .key("k")
    .store(store.clone())
    .filter(FilterPolicy::new(filter, "f"))
    .build();

  let result: Result<i64, AppError> = cache_put(|| async { Ok(5) }, &config).await;
  assert_eq!(result, Err(AppError::Cache(CacheErrorKind::Filter)));
  // the store write is not rolled back
  assert_eq!(store.get("k").await.unwrap(), b"5".to_vec());
}

#[tokio::test]
async fn test_evict_deletes_after_success() {
  let store = Arc::new(RecordingStore::default());
  store.inner.set("a", b"1", Duration::ZERO).await.unwrap();
  store.inner.set("b", b"2", Duration::ZERO).await.unwrap();
  let config = CacheConfiguration::builder().store(store.clone()).build();

  let value = cache_evict(|| async { Ok::<_, AppError>("updated") }, &["a", "b"], &config)
    .await
    .unwrap();

  assert_eq!(value, "updated");
  assert_eq!(store.calls(), vec!["delete_multi a,b"]);
  assert!(store.inner.is_empty());
}

#[tokio::test]
async fn test_evict_skips_delete_when_compute_fails() {
  let store = Arc::new(RecordingStore {
    fail_delete: true,
    ..Default::default()
  });
  let config = CacheConfiguration::builder().store(store.clone()).build();

  let result: Result<(), AppError> = cache_evict(
    || async { Err(AppError::Compute("conflict".into())) },
    &["a"],
    &config,
  )
  .await;

  assert_eq!(result, Err(AppError::Compute("conflict".into())));
  assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_evict_delete_failure_is_reported() {
  let store = Arc::new(RecordingStore {
    fail_delete: true,
    ..Default::default()
  });
  let config = CacheConfiguration::builder().store(store).build();

  let result: Result<(), AppError> =
    cache_evict(|| async { Ok(()) }, &["a"], &config).await;
  assert_eq!(result, Err(AppError::Cache(CacheErrorKind::Store)));
}

#[tokio::test]
async fn test_works_with_anyhow() {
  let store = Arc::new(InMemoryStore::new());
  let value: String = cache_enable(
    || async { Ok::<_, anyhow::Error>("hello".to_string()) },
    &config_for(store),
  )
  .await
  .unwrap();
  assert_eq!(value, "hello");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
  sensor: String,
  value: f64,
}

impl CacheValue for Reading {}

#[tokio::test]
async fn test_non_finite_float_is_never_stored() {
  let store = Arc::new(InMemoryStore::new());

  let result: Result<f64, AppError> =
    cache_enable(|| async { Ok(f64::NAN) }, &config_for(store.clone())).await;
  assert_eq!(result, Err(AppError::Cache(CacheErrorKind::Encode)));
  assert_eq!(store.get("k").await, Err(StoreError::CacheMiss));

  // the key is still usable afterwards
  let value: f64 = cache_enable(|| async { Ok::<_, AppError>(1.5) }, &config_for(store.clone()))
    .await
    .unwrap();
  assert_eq!(value, 1.5);
  let cached: f64 = cache_enable(must_not_run, &config_for(store)).await.unwrap();
  assert_eq!(cached, 1.5);
}

#[tokio::test]
async fn test_unreadable_struct_is_not_stored() {
  let store = Arc::new(InMemoryStore::new());
  let reading = Reading {
    sensor: "t1".into(),
    value: f64::INFINITY,
  };

  let read: Result<Reading, AppError> = cache_enable(
    || async { Ok(reading.clone()) },
    &config_for(store.clone()),
  )
  .await;
  assert_eq!(read, Err(AppError::Cache(CacheErrorKind::Decode)));

  let written: Result<Reading, AppError> =
    cache_put(|| async { Ok(reading.clone()) }, &config_for(store.clone())).await;
  assert_eq!(written, Err(AppError::Cache(CacheErrorKind::Decode)));

  assert!(store.is_empty());
}
