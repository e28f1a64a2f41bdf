//! In-process scalable bloom filter

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::commands::InsertOptions;
use super::MembershipFilter;
use crate::error::FilterError;

const DEFAULT_CAPACITY: u64 = 100;
const DEFAULT_ERROR_RATE: f64 = 0.01;
const DEFAULT_EXPANSION: u32 = 2;
/// Each new sub-filter gets this fraction of the previous one's error rate
const TIGHTENING_RATIO: f64 = 0.5;
/// Largest bit vector a single sub-filter may allocate (1 GiB)
const MAX_LAYER_BITS: u64 = 1 << 33;

/// Bits needed for `capacity` items at `error_rate`
fn layer_bits(capacity: u64, error_rate: f64) -> u64 {
  let ln2 = std::f64::consts::LN_2;
  // float to int casts saturate, so absurd sizes land above MAX_LAYER_BITS
  ((-(capacity as f64) * error_rate.ln() / (ln2 * ln2)).ceil() as u64).max(64)
}

/// One fixed-size bloom filter
struct Layer {
  bits: Vec<u64>,
  num_bits: u64,
  hashes: u32,
  capacity: u64,
  count: u64,
}

impl Layer {
  fn new(capacity: u64, error_rate: f64) -> Self {
    let num_bits = layer_bits(capacity, error_rate);
    let hashes = (-error_rate.log2()).ceil().max(1.0) as u32;
    Self {
      bits: vec![0; num_bits.div_ceil(64) as usize],
      num_bits,
      hashes,
      capacity,
      count: 0,
    }
  }

  fn positions(&self, (h1, h2): (u64, u64)) -> impl Iterator<Item = u64> + '_ {
    (0..self.hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
  }

  fn contains(&self, hash: (u64, u64)) -> bool {
    self
      .positions(hash)
      .all(|bit| self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0)
  }

  fn insert(&mut self, hash: (u64, u64)) {
    let positions: Vec<u64> = self.positions(hash).collect();
    for bit in positions {
      self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
    }
    self.count += 1;
  }

  fn is_full(&self) -> bool {
    self.count >= self.capacity
  }

  fn size_bytes(&self) -> usize {
    self.bits.len() * 8
  }
}

fn hash_item(item: &str) -> (u64, u64) {
  let digest = Sha256::digest(item.as_bytes());
  let mut h1 = [0u8; 8];
  let mut h2 = [0u8; 8];
  h1.copy_from_slice(&digest[..8]);
  h2.copy_from_slice(&digest[8..16]);
  // a zero step would probe the same bit k times
  (u64::from_le_bytes(h1), u64::from_le_bytes(h2) | 1)
}

/// A stack of layers; a new, larger layer is pushed when the last one fills
struct ScalableFilter {
  layers: Vec<Layer>,
  error_rate: f64,
  /// 0 = non-scaling
  expansion: u32,
  items: u64,
}

impl ScalableFilter {
  fn new(capacity: u64, error_rate: f64, expansion: u32) -> Self {
    Self {
      layers: vec![Layer::new(capacity, error_rate * TIGHTENING_RATIO)],
      error_rate,
      expansion,
      items: 0,
    }
  }

  fn contains(&self, hash: (u64, u64)) -> bool {
    self.layers.iter().any(|layer| layer.contains(hash))
  }

  fn add(&mut self, key: &str, item: &str) -> Result<bool, FilterError> {
    let hash = hash_item(item);
    if self.contains(hash) {
      return Ok(false);
    }

    let last_full = self.layers.last().map(Layer::is_full).unwrap_or(true);
    if last_full {
      if self.expansion == 0 {
        return Err(FilterError::Full(key.to_string()));
      }
      let capacity = self
        .layers
        .last()
        .map(|l| l.capacity.saturating_mul(self.expansion as u64))
        .unwrap_or(DEFAULT_CAPACITY);
      let error_rate = self.error_rate * TIGHTENING_RATIO.powi(self.layers.len() as i32 + 1);
      if layer_bits(capacity, error_rate) > MAX_LAYER_BITS {
        return Err(FilterError::Full(key.to_string()));
      }
      self.layers.push(Layer::new(capacity, error_rate));
      tracing::debug!(
        "Bloom filter {} grew to {} sub-filters (capacity {})",
        key,
        self.layers.len(),
        self.capacity()
      );
    }

    if let Some(layer) = self.layers.last_mut() {
      layer.insert(hash);
    }
    self.items += 1;
    Ok(true)
  }

  fn capacity(&self) -> u64 {
    self.layers.iter().map(|l| l.capacity).sum()
  }

  fn info(&self) -> HashMap<String, i64> {
    let mut info = HashMap::new();
    info.insert("Capacity".to_string(), self.capacity() as i64);
    info.insert(
      "Size".to_string(),
      self.layers.iter().map(Layer::size_bytes).sum::<usize>() as i64,
    );
    info.insert("Number of filters".to_string(), self.layers.len() as i64);
    info.insert("Number of items inserted".to_string(), self.items as i64);
    if self.expansion > 0 {
      info.insert("Expansion rate".to_string(), self.expansion as i64);
    }
    info
  }
}

fn validate(error_rate: f64, capacity: u64) -> Result<(), FilterError> {
  if !(error_rate > 0.0 && error_rate < 1.0) {
    return Err(FilterError::InvalidArgument(format!(
      "error rate must be between 0 and 1, got {}",
      error_rate
    )));
  }
  if capacity == 0 {
    return Err(FilterError::InvalidArgument("capacity must be positive".into()));
  }
  if layer_bits(capacity, error_rate * TIGHTENING_RATIO) > MAX_LAYER_BITS {
    return Err(FilterError::InvalidArgument(format!(
      "capacity {} at error rate {} exceeds the {} bit sub-filter limit",
      capacity, error_rate, MAX_LAYER_BITS
    )));
  }
  Ok(())
}

/// Add `items` in order, keeping the results gathered before a failure
///
/// Items added before the failing one stay in the filter, so their results
/// are returned rather than discarded. Fails only when the first item does.
fn add_leading(
  filter: &mut ScalableFilter,
  key: &str,
  items: &[&str],
) -> Result<Vec<bool>, FilterError> {
  let mut results = Vec::with_capacity(items.len());
  for item in items {
    match filter.add(key, item) {
      Ok(added) => results.push(added),
      Err(e) if !results.is_empty() => {
        tracing::warn!(
          "Insert into {} stopped after {} of {} items: {}",
          key,
          results.len(),
          items.len(),
          e
        );
        break;
      }
      Err(e) => return Err(e),
    }
  }
  Ok(results)
}

/// Bloom filters kept in process memory, keyed like their Redis counterparts
///
/// Behaves like a RedisBloom server: `add` creates missing filters with
/// default sizing, `exists` on an unknown filter is `false`.
#[derive(Default)]
pub struct InMemoryBloomFilter {
  filters: RwLock<HashMap<String, ScalableFilter>>,
}

impl InMemoryBloomFilter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn reserve(&self, key: &str, error_rate: f64, capacity: u64) -> Result<(), FilterError> {
    validate(error_rate, capacity)?;
    let mut filters = self.filters.write();
    if filters.contains_key(key) {
      return Err(FilterError::AlreadyExists(key.to_string()));
    }
    filters.insert(
      key.to_string(),
      ScalableFilter::new(capacity, error_rate, DEFAULT_EXPANSION),
    );
    Ok(())
  }

  /// Add items, creating the filter from `options` when missing
  ///
  /// Results stop at the first item that could not be added.
  pub fn insert(
    &self,
    key: &str,
    options: &InsertOptions,
    items: &[&str],
  ) -> Result<Vec<bool>, FilterError> {
    let mut filters = self.filters.write();
    if !filters.contains_key(key) {
      if options.no_create {
        return Err(FilterError::NotFound(key.to_string()));
      }
      let capacity = if options.capacity > 0 {
        options.capacity
      } else {
        DEFAULT_CAPACITY
      };
      let error_rate = if options.error_rate > 0.0 {
        options.error_rate
      } else {
        DEFAULT_ERROR_RATE
      };
      validate(error_rate, capacity)?;
      let expansion = match (options.non_scaling, options.expansion) {
        (true, _) => 0,
        (false, 0) => DEFAULT_EXPANSION,
        (false, e) => e,
      };
      filters.insert(
        key.to_string(),
        ScalableFilter::new(capacity, error_rate, expansion),
      );
    }

    let filter = filters
      .get_mut(key)
      .ok_or_else(|| FilterError::NotFound(key.to_string()))?;
    add_leading(filter, key, items)
  }

  /// Number of filters held
  pub fn len(&self) -> usize {
    self.filters.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn add_items(&self, key: &str, items: &[&str]) -> Result<Vec<bool>, FilterError> {
    let mut filters = self.filters.write();
    let filter = filters.entry(key.to_string()).or_insert_with(|| {
      ScalableFilter::new(DEFAULT_CAPACITY, DEFAULT_ERROR_RATE, DEFAULT_EXPANSION)
    });
    add_leading(filter, key, items)
  }

  fn contains_items(&self, key: &str, items: &[&str]) -> Vec<bool> {
    let filters = self.filters.read();
    match filters.get(key) {
      Some(filter) => items
        .iter()
        .map(|item| filter.contains(hash_item(item)))
        .collect(),
      None => vec![false; items.len()],
    }
  }
}

#[async_trait]
impl MembershipFilter for InMemoryBloomFilter {
  async fn add(&self, key: &str, item: &str) -> Result<bool, FilterError> {
    Ok(self.add_items(key, &[item])?.first().copied().unwrap_or(false))
  }

  async fn exists(&self, key: &str, item: &str) -> Result<bool, FilterError> {
    Ok(self.contains_items(key, &[item]).first().copied().unwrap_or(false))
  }

  async fn add_multi(&self, key: &str, items: &[&str]) -> Result<Vec<bool>, FilterError> {
    self.add_items(key, items)
  }

  async fn exists_multi(&self, key: &str, items: &[&str]) -> Result<Vec<bool>, FilterError> {
    Ok(self.contains_items(key, items))
  }

  async fn info(&self, key: &str) -> Result<HashMap<String, i64>, FilterError> {
    let filters = self.filters.read();
    filters
      .get(key)
      .map(ScalableFilter::info)
      .ok_or_else(|| FilterError::NotFound(key.to_string()))
  }
}
