//! Per-type cache representation

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Payload, ValueKind};
use crate::error::CodecError;

/// A type that can be stored in and read back from the cache
///
/// The default methods route through the structured path, so a serde type
/// only needs an empty impl:
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct User { id: u64, name: String }
///
/// impl CacheValue for User {}
/// ```
pub trait CacheValue: Serialize + DeserializeOwned {
  const KIND: ValueKind = ValueKind::Structured;

  fn to_payload(&self) -> Result<Payload, CodecError> {
    serde_json::to_value(self)
      .map(Payload::Structured)
      .map_err(|e| CodecError::Encode(e.to_string()))
  }

  fn from_payload(payload: Payload) -> Result<Self, CodecError> {
    match payload {
      Payload::Structured(value) => {
        serde_json::from_value(value).map_err(|e| CodecError::Decode(e.to_string()))
      }
      other => Err(mismatch(ValueKind::Structured, &other)),
    }
  }
}

fn mismatch(expected: ValueKind, found: &Payload) -> CodecError {
  CodecError::KindMismatch {
    expected: expected.as_str(),
    found: found.kind().as_str(),
  }
}

impl CacheValue for Vec<u8> {
  const KIND: ValueKind = ValueKind::Bytes;

  fn to_payload(&self) -> Result<Payload, CodecError> {
    Ok(Payload::Bytes(self.clone()))
  }

  fn from_payload(payload: Payload) -> Result<Self, CodecError> {
    match payload {
      Payload::Bytes(bytes) => Ok(bytes),
      other => Err(mismatch(ValueKind::Bytes, &other)),
    }
  }
}

macro_rules! signed_value {
  ($($t:ty),*) => {
    $(
      impl CacheValue for $t {
        const KIND: ValueKind = ValueKind::Signed;

        fn to_payload(&self) -> Result<Payload, CodecError> {
          Ok(Payload::Signed(*self as i64))
        }

        fn from_payload(payload: Payload) -> Result<Self, CodecError> {
          match payload {
            Payload::Signed(v) => <$t>::try_from(v).map_err(|_| {
              CodecError::Decode(format!("{} out of range for {}", v, stringify!($t)))
            }),
            other => Err(mismatch(ValueKind::Signed, &other)),
          }
        }
      }
    )*
  };
}

macro_rules! unsigned_value {
  ($($t:ty),*) => {
    $(
      impl CacheValue for $t {
        const KIND: ValueKind = ValueKind::Unsigned;

        fn to_payload(&self) -> Result<Payload, CodecError> {
          Ok(Payload::Unsigned(*self as u64))
        }

        fn from_payload(payload: Payload) -> Result<Self, CodecError> {
          match payload {
            Payload::Unsigned(v) => <$t>::try_from(v).map_err(|_| {
              CodecError::Decode(format!("{} out of range for {}", v, stringify!($t)))
            }),
            other => Err(mismatch(ValueKind::Unsigned, &other)),
          }
        }
      }
    )*
  };
}

signed_value!(i8, i16, i32, i64, isize);
unsigned_value!(u8, u16, u32, u64, usize);

impl CacheValue for String {}
impl CacheValue for bool {}

macro_rules! float_value {
  ($($t:ty),*) => {
    $(
      impl CacheValue for $t {
        // the structured formats have no NaN or infinity
        fn to_payload(&self) -> Result<Payload, CodecError> {
          if !self.is_finite() {
            return Err(CodecError::Encode(format!(
              "{} {} has no structured representation",
              stringify!($t),
              self
            )));
          }
          serde_json::to_value(self)
            .map(Payload::Structured)
            .map_err(|e| CodecError::Encode(e.to_string()))
        }
      }
    )*
  };
}

float_value!(f32, f64);

impl CacheValue for serde_json::Value {}

/// Wrapper that stores any serde type through the structured path
///
/// Useful for collections such as `Vec<User>` or maps, which cannot get a
/// direct impl next to the `Vec<u8>` fast path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Structured<T>(pub T);

impl<T> Structured<T> {
  pub fn into_inner(self) -> T {
    self.0
  }
}

impl<T> std::ops::Deref for Structured<T> {
  type Target = T;

  fn deref(&self) -> &T {
    &self.0
  }
}

impl<T: Serialize + DeserializeOwned> CacheValue for Structured<T> {}
