//! Redis-backed store

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Cmd, RedisError};
use std::time::Duration;

use super::{MultiGet, Store};
use crate::config::RedisSection;
use crate::error::StoreError;

/// Store that talks to a Redis server through a shared connection manager
#[derive(Clone)]
pub struct RedisStore {
  connection: ConnectionManager,
}

impl RedisStore {
  pub fn new(connection: ConnectionManager) -> Self {
    Self { connection }
  }

  /// Connect using the `redis` section of the settings file
  pub async fn connect(config: &RedisSection) -> Result<Self, RedisError> {
    Ok(Self::new(crate::config::redis_connection(config).await?))
  }

  /// Test the connection to Redis
  pub async fn ping(&self) -> Result<(), StoreError> {
    let mut conn = self.connection.clone();
    redis::cmd("PING").query_async::<()>(&mut conn).await?;
    Ok(())
  }

  /// Write one field of a hash, refreshing the hash's expiry when given
  ///
  /// Used by response caching, which groups entries under `cache:<name>`.
  pub async fn hset(
    &self,
    key: &str,
    field: &str,
    value: &[u8],
    expires: Duration,
  ) -> Result<(), StoreError> {
    let mut conn = self.connection.clone();
    let mut pipe = redis::pipe();
    pipe.atomic().cmd("HSET").arg(key).arg(field).arg(value).ignore();
    if !expires.is_zero() {
      pipe.cmd("PEXPIRE").arg(key).arg(expiry_millis(expires)).ignore();
    }
    pipe.query_async::<()>(&mut conn).await?;
    Ok(())
  }

  /// Read one field of a hash
  pub async fn hget(&self, key: &str, field: &str) -> Result<Vec<u8>, StoreError> {
    let mut conn = self.connection.clone();
    let value: Option<Vec<u8>> = redis::cmd("HGET")
      .arg(key)
      .arg(field)
      .query_async(&mut conn)
      .await?;
    value.ok_or(StoreError::CacheMiss)
  }

  /// Run a conditional `SET`; `false` when the condition rejected the write
  async fn set_conditional(&self, cmd: Cmd) -> Result<bool, StoreError> {
    let mut conn = self.connection.clone();
    let reply: redis::Value = cmd.query_async(&mut conn).await?;
    Ok(!matches!(reply, redis::Value::Nil))
  }
}

/// Hash key used for a named response cache
pub fn cache_hash_key(name: &str) -> String {
  format!("cache:{}", name)
}

fn expiry_millis(expires: Duration) -> u64 {
  // sub-millisecond expiries would otherwise round to "no expiry"
  (expires.as_millis() as u64).max(1)
}

/// Build `SET key value [PX ms] [NX|XX]`
pub(crate) fn set_command(
  key: &str,
  value: &[u8],
  expires: Duration,
  condition: Option<&str>,
) -> Cmd {
  let mut cmd = redis::cmd("SET");
  cmd.arg(key).arg(value);
  if !expires.is_zero() {
    cmd.arg("PX").arg(expiry_millis(expires));
  }
  if let Some(condition) = condition {
    cmd.arg(condition);
  }
  cmd
}

#[async_trait]
impl Store for RedisStore {
  async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
    let mut conn = self.connection.clone();
    let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
    value.ok_or(StoreError::CacheMiss)
  }

  async fn get_multi(&self, keys: &[&str]) -> Result<MultiGet, StoreError> {
    if keys.is_empty() {
      return Ok(MultiGet::default());
    }
    let mut conn = self.connection.clone();
    let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
    Ok(
      keys
        .iter()
        .zip(values)
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect(),
    )
  }

  async fn set(&self, key: &str, value: &[u8], expires: Duration) -> Result<(), StoreError> {
    let mut conn = self.connection.clone();
    set_command(key, value, expires, None)
      .query_async::<()>(&mut conn)
      .await?;
    Ok(())
  }

  async fn add(&self, key: &str, value: &[u8], expires: Duration) -> Result<(), StoreError> {
    if self
      .set_conditional(set_command(key, value, expires, Some("NX")))
      .await?
    {
      Ok(())
    } else {
      Err(StoreError::InvalidValue)
    }
  }

  async fn replace(
    &self,
    key: &str,
    value: &[u8],
    expires: Duration,
  ) -> Result<(), StoreError> {
    if self
      .set_conditional(set_command(key, value, expires, Some("XX")))
      .await?
    {
      Ok(())
    } else {
      Err(StoreError::NotStored)
    }
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    let mut conn = self.connection.clone();
    redis::cmd("DEL").arg(key).query_async::<i64>(&mut conn).await?;
    Ok(())
  }

  async fn delete_multi(&self, keys: &[&str]) -> Result<(), StoreError> {
    if keys.is_empty() {
      return Ok(());
    }
    let mut conn = self.connection.clone();
    redis::cmd("DEL").arg(keys).query_async::<i64>(&mut conn).await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(cmd: &Cmd) -> Vec<String> {
    cmd
      .args_iter()
      .filter_map(|arg| match arg {
        redis::Arg::Simple(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        redis::Arg::Cursor => None,
      })
      .collect()
  }

  #[test]
  fn test_set_without_expiry() {
    let cmd = set_command("k", b"v", Duration::ZERO, None);
    assert_eq!(args(&cmd), vec!["SET", "k", "v"]);
  }

  #[test]
  fn test_set_with_expiry_and_condition() {
    let cmd = set_command("k", b"v", Duration::from_secs(2), Some("NX"));
    assert_eq!(args(&cmd), vec!["SET", "k", "v", "PX", "2000", "NX"]);
  }

  #[test]
  fn test_sub_millisecond_expiry_rounds_up() {
    let cmd = set_command("k", b"v", Duration::from_micros(10), None);
    assert_eq!(args(&cmd), vec!["SET", "k", "v", "PX", "1"]);
  }

  #[test]
  fn test_cache_hash_key() {
    assert_eq!(cache_hash_key("users"), "cache:users");
  }
}
