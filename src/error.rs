//! Error types shared by stores, filters, serializers and the decorator engine

use thiserror::Error;

/// Store operation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
  /// Key is absent from the store
  #[error("cache: key not found")]
  CacheMiss,
  /// `replace` on a key that does not exist
  #[error("cache: not stored")]
  NotStored,
  /// `add` on a key that already exists
  #[error("cache: invalid value")]
  InvalidValue,
  /// Transport or backend failure
  #[error("cache backend error: {0}")]
  Backend(String),
}

impl From<redis::RedisError> for StoreError {
  fn from(e: redis::RedisError) -> Self {
    StoreError::Backend(e.to_string())
  }
}

/// Membership filter error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
  /// Transport or server failure
  #[error("filter backend error: {0}")]
  Backend(String),
  /// The server answered with something we cannot interpret
  #[error("unexpected filter reply: {0}")]
  Protocol(String),
  #[error("filter '{0}' not found")]
  NotFound(String),
  #[error("filter '{0}' already exists")]
  AlreadyExists(String),
  /// A non-scaling filter reached its capacity
  #[error("filter '{0}' is full")]
  Full(String),
  #[error("invalid filter argument: {0}")]
  InvalidArgument(String),
}

impl From<redis::RedisError> for FilterError {
  fn from(e: redis::RedisError) -> Self {
    FilterError::Backend(e.to_string())
  }
}

/// Serializer error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
  #[error("encode failed: {0}")]
  Encode(String),
  #[error("decode failed: {0}")]
  Decode(String),
  /// Payload variant does not match what the destination type expects
  #[error("payload kind mismatch: expected {expected}, found {found}")]
  KindMismatch {
    expected: &'static str,
    found: &'static str,
  },
}

/// Error surfaced at the decorator boundary
///
/// Every collaborator failure is wrapped into one of these variants, keeping
/// the original message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Filter(#[from] FilterError),
  #[error(transparent)]
  Codec(#[from] CodecError),
  /// The penetration guard proved the key was never admitted
  #[error("item is not found: {key}")]
  NotFound { key: String },
  #[error("cache configuration error: {0}")]
  Configuration(String),
}

/// Coarse error classification for callers that branch on semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheErrorKind {
  CacheMiss,
  NotStored,
  InvalidValue,
  Store,
  Encode,
  Decode,
  Filter,
  NotFound,
  Configuration,
}

impl CacheError {
  pub fn kind(&self) -> CacheErrorKind {
    match self {
      CacheError::Store(StoreError::CacheMiss) => CacheErrorKind::CacheMiss,
      CacheError::Store(StoreError::NotStored) => CacheErrorKind::NotStored,
      CacheError::Store(StoreError::InvalidValue) => CacheErrorKind::InvalidValue,
      CacheError::Store(StoreError::Backend(_)) => CacheErrorKind::Store,
      CacheError::Codec(CodecError::Encode(_)) => CacheErrorKind::Encode,
      CacheError::Codec(_) => CacheErrorKind::Decode,
      CacheError::Filter(_) => CacheErrorKind::Filter,
      CacheError::NotFound { .. } => CacheErrorKind::NotFound,
      CacheError::Configuration(_) => CacheErrorKind::Configuration,
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, CacheError::NotFound { .. })
  }
}
