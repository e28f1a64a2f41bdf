//! Value serialization for cache entries
//!
//! Three-tier dispatch, checked in order:
//! - raw bytes pass through untouched
//! - integers are stored as decimal text (signed or unsigned)
//! - everything else goes through a pluggable structured format
//!
//! Decoding dispatches on the destination type's [`ValueKind`], never on the
//! content of the bytes.

mod formats;
mod value;

use std::sync::Arc;

pub use formats::{JsonSerializer, MessagePackSerializer};
pub use value::{CacheValue, Structured};

use crate::error::CodecError;

/// How a destination type is represented in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
  Bytes,
  Signed,
  Unsigned,
  Structured,
}

impl ValueKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ValueKind::Bytes => "bytes",
      ValueKind::Signed => "signed",
      ValueKind::Unsigned => "unsigned",
      ValueKind::Structured => "structured",
    }
  }
}

impl std::fmt::Display for ValueKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Intermediate form a value takes between its Rust type and cache bytes
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
  Bytes(Vec<u8>),
  Signed(i64),
  Unsigned(u64),
  Structured(serde_json::Value),
}

impl Payload {
  pub fn kind(&self) -> ValueKind {
    match self {
      Payload::Bytes(_) => ValueKind::Bytes,
      Payload::Signed(_) => ValueKind::Signed,
      Payload::Unsigned(_) => ValueKind::Unsigned,
      Payload::Structured(_) => ValueKind::Structured,
    }
  }
}

/// Converts payloads to and from cache bytes
///
/// Implementors only supply the structured format; the fast paths for bytes
/// and integers are shared by every serializer.
pub trait Serializer: Send + Sync {
  /// Short name used in logs
  fn name(&self) -> &'static str;

  fn encode_structured(&self, value: &serde_json::Value) -> Result<Vec<u8>, CodecError>;

  fn decode_structured(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError>;

  fn serialize(&self, payload: Payload) -> Result<Vec<u8>, CodecError> {
    match payload {
      Payload::Bytes(bytes) => Ok(bytes),
      Payload::Signed(i) => Ok(i.to_string().into_bytes()),
      Payload::Unsigned(u) => Ok(u.to_string().into_bytes()),
      Payload::Structured(value) => self.encode_structured(&value).inspect_err(|e| {
        tracing::error!(
          serializer = self.name(),
          value = %value,
          "Serialize: structured encoding failed: {}",
          e
        );
      }),
    }
  }

  fn deserialize(&self, bytes: &[u8], kind: ValueKind) -> Result<Payload, CodecError> {
    match kind {
      ValueKind::Bytes => Ok(Payload::Bytes(bytes.to_vec())),
      ValueKind::Signed => parse_decimal::<i64>(bytes)
        .map(Payload::Signed)
        .inspect_err(|e| {
          tracing::error!(
            value = %String::from_utf8_lossy(bytes),
            "Deserialize: failed to parse int: {}",
            e
          );
        }),
      ValueKind::Unsigned => parse_decimal::<u64>(bytes)
        .map(Payload::Unsigned)
        .inspect_err(|e| {
          tracing::error!(
            value = %String::from_utf8_lossy(bytes),
            "Deserialize: failed to parse uint: {}",
            e
          );
        }),
      ValueKind::Structured => self
        .decode_structured(bytes)
        .map(Payload::Structured)
        .inspect_err(|e| {
          tracing::error!(
            serializer = self.name(),
            value = %String::from_utf8_lossy(bytes),
            "Deserialize: structured decoding failed: {}",
            e
          );
        }),
    }
  }
}

impl<'a> dyn Serializer + 'a {
  /// Encode a typed value into cache bytes
  pub fn encode<T: CacheValue>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
    let payload = value.to_payload().inspect_err(|e| {
      tracing::error!(
        value_type = std::any::type_name::<T>(),
        "Serialize: failed to build payload: {}",
        e
      );
    })?;
    self.serialize(payload)
  }

  /// Decode cache bytes into the requested destination type
  pub fn decode<T: CacheValue>(&self, bytes: &[u8]) -> Result<T, CodecError> {
    let payload = self.deserialize(bytes, T::KIND)?;
    T::from_payload(payload).inspect_err(|e| {
      tracing::error!(
        value_type = std::any::type_name::<T>(),
        value = %String::from_utf8_lossy(bytes),
        "Deserialize: payload rejected by destination: {}",
        e
      );
    })
  }
}

/// Serializer used when a configuration does not name one
pub fn default_serializer() -> Arc<dyn Serializer> {
  Arc::new(MessagePackSerializer)
}

fn parse_decimal<N>(bytes: &[u8]) -> Result<N, CodecError>
where
  N: std::str::FromStr,
  N::Err: std::fmt::Display,
{
  let text = std::str::from_utf8(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
  text
    .parse::<N>()
    .map_err(|e| CodecError::Decode(format!("'{}': {}", text, e)))
}
