//! RedisBloom-backed filter

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Value};
use std::collections::HashMap;
use std::future::Future;

use super::commands::{self, BloomCommand, InsertOptions};
use super::MembershipFilter;
use crate::config::RedisSection;
use crate::error::FilterError;

/// One step of a `BF.SCANDUMP` export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpChunk {
  pub iterator: i64,
  pub data: Vec<u8>,
}

/// Scalable bloom filters hosted by a RedisBloom server
#[derive(Clone)]
pub struct RedisBloomFilter {
  connection: ConnectionManager,
}

impl RedisBloomFilter {
  pub fn new(connection: ConnectionManager) -> Self {
    Self { connection }
  }

  pub async fn connect(config: &RedisSection) -> Result<Self, RedisError> {
    Ok(Self::new(crate::config::redis_connection(config).await?))
  }

  async fn query(&self, command: BloomCommand<'_>) -> Result<Value, FilterError> {
    let mut conn = self.connection.clone();
    let reply: Value = command.to_cmd().query_async(&mut conn).await?;
    Ok(reply)
  }

  /// Create an empty filter sized for `capacity` items at `error_rate`
  pub async fn reserve(&self, key: &str, error_rate: f64, capacity: u64) -> Result<(), FilterError> {
    self
      .query(BloomCommand::Reserve {
        key,
        error_rate,
        capacity,
      })
      .await?;
    tracing::debug!(
      "Reserved bloom filter {} (capacity {}, error rate {})",
      key,
      capacity,
      error_rate
    );
    Ok(())
  }

  /// Add items, creating the filter with `options` when it does not exist
  pub async fn insert(
    &self,
    key: &str,
    options: &InsertOptions,
    items: &[&str],
  ) -> Result<Vec<bool>, FilterError> {
    let reply = self
      .query(BloomCommand::Insert {
        key,
        options,
        items,
      })
      .await?;
    commands::parse_insert(reply)
  }

  /// One step of an incremental export; start with iterator 0
  pub async fn scan_dump(
    &self,
    key: &str,
    iterator: i64,
  ) -> Result<(i64, Option<Vec<u8>>), FilterError> {
    let reply = self.query(BloomCommand::ScanDump { key, iterator }).await?;
    commands::parse_scan_dump(reply)
  }

  pub async fn load_chunk(&self, key: &str, iterator: i64, chunk: &[u8]) -> Result<(), FilterError> {
    self
      .query(BloomCommand::LoadChunk {
        key,
        iterator,
        chunk,
      })
      .await?;
    Ok(())
  }

  /// Export the whole filter as an ordered list of chunks
  pub async fn dump(&self, key: &str) -> Result<Vec<DumpChunk>, FilterError> {
    let chunks = collect_chunks(move |iterator| self.scan_dump(key, iterator)).await?;
    tracing::debug!("Dumped bloom filter {} in {} chunks", key, chunks.len());
    Ok(chunks)
  }

  /// Load chunks produced by [`RedisBloomFilter::dump`], in order
  pub async fn restore(&self, key: &str, chunks: &[DumpChunk]) -> Result<(), FilterError> {
    for chunk in chunks {
      self.load_chunk(key, chunk.iterator, &chunk.data).await?;
    }
    tracing::debug!("Restored bloom filter {} from {} chunks", key, chunks.len());
    Ok(())
  }

  /// Replicate `key` into `target_key` on another server without re-inserting items
  pub async fn copy_to(
    &self,
    key: &str,
    target: &RedisBloomFilter,
    target_key: &str,
  ) -> Result<usize, FilterError> {
    let chunks = self.dump(key).await?;
    target.restore(target_key, &chunks).await?;
    Ok(chunks.len())
  }
}

/// Drive a scan-dump loop until the server reports no further data
///
/// Ends on a zero iterator or an absent / empty chunk.
pub(crate) async fn collect_chunks<F, Fut>(mut scan: F) -> Result<Vec<DumpChunk>, FilterError>
where
  F: FnMut(i64) -> Fut,
  Fut: Future<Output = Result<(i64, Option<Vec<u8>>), FilterError>>,
{
  let mut chunks = Vec::new();
  let mut iterator = 0;
  loop {
    let (next, data) = scan(iterator).await?;
    match data {
      Some(data) if next != 0 && !data.is_empty() => {
        chunks.push(DumpChunk {
          iterator: next,
          data,
        });
        iterator = next;
      }
      _ => break,
    }
  }
  Ok(chunks)
}

#[async_trait]
impl MembershipFilter for RedisBloomFilter {
  async fn add(&self, key: &str, item: &str) -> Result<bool, FilterError> {
    commands::parse_bool(self.query(BloomCommand::Add { key, item }).await?)
  }

  async fn exists(&self, key: &str, item: &str) -> Result<bool, FilterError> {
    commands::parse_bool(self.query(BloomCommand::Exists { key, item }).await?)
  }

  async fn add_multi(&self, key: &str, items: &[&str]) -> Result<Vec<bool>, FilterError> {
    if items.is_empty() {
      return Ok(Vec::new());
    }
    commands::parse_bools(self.query(BloomCommand::MAdd { key, items }).await?)
  }

  async fn exists_multi(&self, key: &str, items: &[&str]) -> Result<Vec<bool>, FilterError> {
    if items.is_empty() {
      return Ok(Vec::new());
    }
    commands::parse_bools(self.query(BloomCommand::MExists { key, items }).await?)
  }

  async fn info(&self, key: &str) -> Result<HashMap<String, i64>, FilterError> {
    commands::parse_info(self.query(BloomCommand::Info { key }).await?)
  }
}
