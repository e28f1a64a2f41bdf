//! Structured formats

use super::Serializer;
use crate::error::CodecError;

/// Compact binary format (MessagePack); the default
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackSerializer;

impl Serializer for MessagePackSerializer {
  fn name(&self) -> &'static str {
    "msgpack"
  }

  fn encode_structured(&self, value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    rmp_serde::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
  }

  fn decode_structured(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
    rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
  }
}

/// Human-readable JSON, handy when entries are inspected with redis-cli
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
  fn name(&self) -> &'static str {
    "json"
  }

  fn encode_structured(&self, value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
  }

  fn decode_structured(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
  }
}
