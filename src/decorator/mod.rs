//! Cache-aside decorators
//!
//! Each operation wraps a compute future with caching behaviour driven by a
//! [`CacheConfiguration`]:
//!
//! - [`cache_enable`] reads through the store, computing and populating on a miss
//! - [`cache_put`] computes, then writes the result through to the store
//! - [`cache_evict`] computes, then invalidates a list of keys
//!
//! Compute errors are returned verbatim. Cache-domain failures are wrapped in
//! [`CacheError`] and converted into the caller's error type.
//!
//! The engine holds no state and takes no locks. With `sync` enabled a miss
//! is re-read once before computing, which narrows the window in which
//! concurrent callers recompute the same key but does not close it; single
//! flight needs a keyed lock or lease around the call.

mod options;

use std::future::Future;
use std::sync::Arc;

pub use options::{Admission, CacheConfigBuilder, CacheConfiguration, CacheOption};

use crate::error::{CacheError, StoreError};
use crate::serializer::{CacheValue, Serializer};
use crate::store::Store;

fn wrap<E: From<CacheError>>(err: impl Into<CacheError>) -> E {
  E::from(err.into())
}

fn require_store(config: &CacheConfiguration) -> Result<&Arc<dyn Store>, CacheError> {
  config.store().ok_or_else(|| {
    CacheError::Configuration(format!("no store configured for key '{}'", config.key()))
  })
}

/// Encode `value` and decode it back, so bytes that cannot be read again
/// never reach the store
fn encode_verified<T: CacheValue>(
  serializer: &dyn Serializer,
  value: &T,
) -> Result<(Vec<u8>, T), CacheError> {
  let raw = serializer.encode(value)?;
  let decoded = serializer.decode(&raw)?;
  Ok((raw, decoded))
}

/// Store lookup where a miss reads as the empty value
async fn lookup(store: &dyn Store, key: &str) -> Result<Vec<u8>, CacheError> {
  match store.get(key).await {
    Ok(raw) => Ok(raw),
    Err(StoreError::CacheMiss) => Ok(Vec::new()),
    Err(e) => Err(e.into()),
  }
}

/// Read-through caching
///
/// Returns the cached value for the configured key, or computes it, stores it
/// and returns it. When the filter policy is enabled, a key the filter has
/// never seen fails with [`CacheError::NotFound`] without running `compute`.
pub async fn cache_enable<T, E, F, Fut>(compute: F, config: &CacheConfiguration) -> Result<T, E>
where
  T: CacheValue,
  E: From<CacheError>,
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  if !config.admits() {
    tracing::debug!("Cache bypassed by admission condition");
    return compute().await;
  }
  let key = config.key();
  if key.is_empty() {
    return compute().await;
  }

  let policy = config.filter();
  if policy.is_enabled() {
    match policy.filter() {
      None => {
        tracing::debug!("Filter enabled without an instance, bypassing cache for {}", key);
        return compute().await;
      }
      Some(filter) => {
        let present = filter.exists(policy.key(), key).await.map_err(wrap::<E>)?;
        if !present {
          tracing::warn!("Rejected {}: not present in filter {}", key, policy.key());
          return Err(wrap(CacheError::NotFound {
            key: key.to_string(),
          }));
        }
      }
    }
  }

  let store = require_store(config).map_err(wrap::<E>)?;
  let mut raw = lookup(store.as_ref(), key).await.map_err(wrap::<E>)?;

  if raw.is_empty() && config.sync() {
    raw = lookup(store.as_ref(), key).await.map_err(wrap::<E>)?;
    if !raw.is_empty() {
      tracing::debug!("Cache filled concurrently for {}", key);
    }
  }

  if !raw.is_empty() {
    tracing::debug!("Cache hit for {}", key);
    return config.serializer().decode(&raw).map_err(wrap);
  }

  tracing::debug!("Cache miss for {}", key);
  let value = compute().await?;
  let (raw, decoded) = encode_verified(config.serializer(), &value).map_err(wrap::<E>)?;
  store
    .set(key, &raw, config.expires())
    .await
    .map_err(wrap::<E>)?;
  tracing::debug!("Populated {} ({} bytes)", key, raw.len());
  Ok(decoded)
}

/// Write-through caching
///
/// `compute` runs exactly once, before any store or filter access. On success
/// its result is stored under the configured key and, when a filter is
/// configured, the key is added to it so later reads pass the filter.
///
/// A filter failure is returned even though the store write already landed.
pub async fn cache_put<T, E, F, Fut>(compute: F, config: &CacheConfiguration) -> Result<T, E>
where
  T: CacheValue,
  E: From<CacheError>,
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let value = compute().await?;

  let key = config.key();
  if !config.admits() || key.is_empty() {
    return Ok(value);
  }

  let store = require_store(config).map_err(wrap::<E>)?;
  let (raw, _) = encode_verified(config.serializer(), &value).map_err(wrap::<E>)?;
  store
    .set(key, &raw, config.expires())
    .await
    .map_err(wrap::<E>)?;
  tracing::debug!("Stored {} ({} bytes)", key, raw.len());

  let policy = config.filter();
  if let (true, Some(filter)) = (policy.is_enabled(), policy.filter()) {
    let present = filter.exists(policy.key(), key).await.map_err(wrap::<E>)?;
    if !present {
      filter.add(policy.key(), key).await.map_err(wrap::<E>)?;
      tracing::debug!("Added {} to filter {}", key, policy.key());
    }
  }

  Ok(value)
}

/// Invalidation
///
/// Deletes `keys` only after `compute` succeeds. A delete failure is returned
/// even though `compute` already committed.
pub async fn cache_evict<T, E, F, Fut>(
  compute: F,
  keys: &[&str],
  config: &CacheConfiguration,
) -> Result<T, E>
where
  E: From<CacheError>,
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let value = compute().await?;
  if keys.is_empty() {
    return Ok(value);
  }

  let store = config.store().ok_or_else(|| {
    wrap::<E>(CacheError::Configuration(format!(
      "no store configured to evict {} keys",
      keys.len()
    )))
  })?;
  store.delete_multi(keys).await.map_err(wrap::<E>)?;
  tracing::debug!("Evicted {} keys", keys.len());
  Ok(value)
}
