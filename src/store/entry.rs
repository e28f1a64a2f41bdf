//! Cache entry types

use std::time::{Duration, Instant};

/// A stored value with expiry metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub value: Vec<u8>,
  pub created_at: Instant,
  pub expires_at: Option<Instant>,
}

impl CacheEntry {
  /// `Duration::ZERO` means no expiry
  pub fn new(value: Vec<u8>, expires: Duration) -> Self {
    let now = Instant::now();
    let expires_at = (!expires.is_zero()).then(|| now + expires);
    Self {
      value,
      created_at: now,
      expires_at,
    }
  }

  pub fn is_expired(&self) -> bool {
    self
      .expires_at
      .map(|exp| Instant::now() >= exp)
      .unwrap_or(false)
  }

  pub fn ttl_remaining(&self) -> Option<Duration> {
    self
      .expires_at
      .and_then(|exp| exp.checked_duration_since(Instant::now()))
  }

  /// Approximate footprint in bytes
  pub fn size(&self) -> usize {
    self.value.len()
  }
}
