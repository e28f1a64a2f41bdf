//! RedisBloom command construction and reply parsing
//!
//! Argument order is part of the wire contract with the filter server.

use redis::{Cmd, Value};
use std::collections::HashMap;

use crate::error::FilterError;

/// Optional creation knobs for `BF.INSERT`
///
/// Zero / `false` means "not set"; unset clauses are left out of the command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOptions {
  pub capacity: u64,
  pub error_rate: f64,
  pub expansion: u32,
  pub no_create: bool,
  pub non_scaling: bool,
}

/// A filter command and its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum BloomCommand<'a> {
  Reserve {
    key: &'a str,
    error_rate: f64,
    capacity: u64,
  },
  Add {
    key: &'a str,
    item: &'a str,
  },
  Exists {
    key: &'a str,
    item: &'a str,
  },
  MAdd {
    key: &'a str,
    items: &'a [&'a str],
  },
  MExists {
    key: &'a str,
    items: &'a [&'a str],
  },
  Info {
    key: &'a str,
  },
  Insert {
    key: &'a str,
    options: &'a InsertOptions,
    items: &'a [&'a str],
  },
  ScanDump {
    key: &'a str,
    iterator: i64,
  },
  LoadChunk {
    key: &'a str,
    iterator: i64,
    chunk: &'a [u8],
  },
}

impl BloomCommand<'_> {
  pub fn name(&self) -> &'static str {
    match self {
      BloomCommand::Reserve { .. } => "BF.RESERVE",
      BloomCommand::Add { .. } => "BF.ADD",
      BloomCommand::Exists { .. } => "BF.EXISTS",
      BloomCommand::MAdd { .. } => "BF.MADD",
      BloomCommand::MExists { .. } => "BF.MEXISTS",
      BloomCommand::Info { .. } => "BF.INFO",
      BloomCommand::Insert { .. } => "BF.INSERT",
      BloomCommand::ScanDump { .. } => "BF.SCANDUMP",
      BloomCommand::LoadChunk { .. } => "BF.LOADCHUNK",
    }
  }

  /// Arguments following the command name
  pub fn args(&self) -> Vec<Vec<u8>> {
    fn text(s: impl ToString) -> Vec<u8> {
      s.to_string().into_bytes()
    }

    match self {
      BloomCommand::Reserve {
        key,
        error_rate,
        capacity,
      } => vec![text(key), text(error_rate), text(capacity)],
      BloomCommand::Add { key, item } | BloomCommand::Exists { key, item } => {
        vec![text(key), text(item)]
      }
      BloomCommand::MAdd { key, items } | BloomCommand::MExists { key, items } => {
        std::iter::once(text(key))
          .chain(items.iter().map(text))
          .collect()
      }
      BloomCommand::Info { key } => vec![text(key)],
      BloomCommand::Insert {
        key,
        options,
        items,
      } => {
        let mut args = vec![text(key)];
        if options.capacity > 0 {
          args.push(text("CAPACITY"));
          args.push(text(options.capacity));
        }
        if options.error_rate > 0.0 {
          args.push(text("ERROR"));
          args.push(text(options.error_rate));
        }
        if options.expansion > 0 {
          args.push(text("EXPANSION"));
          args.push(text(options.expansion));
        }
        if options.no_create {
          args.push(text("NOCREATE"));
        }
        if options.non_scaling {
          args.push(text("NONSCALING"));
        }
        args.push(text("ITEMS"));
        args.extend(items.iter().map(text));
        args
      }
      BloomCommand::ScanDump { key, iterator } => vec![text(key), text(iterator)],
      BloomCommand::LoadChunk {
        key,
        iterator,
        chunk,
      } => vec![text(key), text(iterator), chunk.to_vec()],
    }
  }

  pub fn to_cmd(&self) -> Cmd {
    let mut cmd = redis::cmd(self.name());
    for arg in self.args() {
      cmd.arg(arg);
    }
    cmd
  }
}

fn describe(value: &Value) -> String {
  format!("{:?}", value)
}

fn value_text(value: &Value) -> Option<String> {
  match value {
    Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
    Value::SimpleString(s) => Some(s.clone()),
    _ => None,
  }
}

fn reply_bool(value: &Value) -> Option<bool> {
  match value {
    Value::Int(i) => Some(*i != 0),
    Value::Boolean(b) => Some(*b),
    _ => None,
  }
}

/// Parse `BF.INFO`, either a flat name/value array or a RESP3 map
///
/// Stats the server leaves empty (e.g. expansion of a non-scaling filter)
/// are omitted.
pub(crate) fn parse_info(reply: Value) -> Result<HashMap<String, i64>, FilterError> {
  let pairs: Vec<(Value, Value)> = match reply {
    Value::Map(pairs) => pairs,
    Value::Array(items) => {
      if items.len() % 2 != 0 {
        return Err(FilterError::Protocol(format!(
          "BF.INFO returned {} elements",
          items.len()
        )));
      }
      let mut iter = items.into_iter();
      let mut pairs = Vec::new();
      while let (Some(name), Some(value)) = (iter.next(), iter.next()) {
        pairs.push((name, value));
      }
      pairs
    }
    other => {
      return Err(FilterError::Protocol(format!(
        "BF.INFO returned {}",
        describe(&other)
      )))
    }
  };

  let mut stats = HashMap::with_capacity(pairs.len());
  for (name, value) in pairs {
    let name = value_text(&name)
      .ok_or_else(|| FilterError::Protocol(format!("BF.INFO stat name {}", describe(&name))))?;
    match value {
      Value::Int(i) => {
        stats.insert(name, i);
      }
      Value::Nil => {}
      other => {
        return Err(FilterError::Protocol(format!(
          "BF.INFO stat '{}' is {}",
          name,
          describe(&other)
        )))
      }
    }
  }
  Ok(stats)
}

/// Parse a single boolean reply (`BF.ADD`, `BF.EXISTS`)
pub(crate) fn parse_bool(reply: Value) -> Result<bool, FilterError> {
  reply_bool(&reply)
    .ok_or_else(|| FilterError::Protocol(format!("expected bool, got {}", describe(&reply))))
}

/// Parse a per-item boolean array (`BF.MADD`, `BF.MEXISTS`)
pub(crate) fn parse_bools(reply: Value) -> Result<Vec<bool>, FilterError> {
  match reply {
    Value::Array(items) => items
      .iter()
      .map(|v| {
        reply_bool(v).ok_or_else(|| FilterError::Protocol(format!("expected bool, got {}", describe(v))))
      })
      .collect(),
    other => Err(FilterError::Protocol(format!(
      "expected array, got {}",
      describe(&other)
    ))),
  }
}

/// Parse `BF.INSERT`, keeping the leading run of boolean results
///
/// The server reports per-item failures inline; results stop at the first
/// element that is not a boolean.
pub(crate) fn parse_insert(reply: Value) -> Result<Vec<bool>, FilterError> {
  let items = match reply {
    Value::Array(items) => items,
    other => {
      return Err(FilterError::Protocol(format!(
        "BF.INSERT returned {}",
        describe(&other)
      )))
    }
  };

  let mut results = Vec::with_capacity(items.len());
  for item in &items {
    match reply_bool(item) {
      Some(b) => results.push(b),
      None => {
        tracing::warn!(
          "BF.INSERT stopped at element {} of {}: {}",
          results.len(),
          items.len(),
          describe(item)
        );
        break;
      }
    }
  }
  Ok(results)
}

/// Parse `BF.SCANDUMP` into `(next_iterator, chunk)`
pub(crate) fn parse_scan_dump(reply: Value) -> Result<(i64, Option<Vec<u8>>), FilterError> {
  match reply {
    Value::Array(items) if items.len() == 2 => {
      let mut iter = items.into_iter();
      let (iterator, chunk) = match (iter.next(), iter.next()) {
        (Some(iterator), Some(chunk)) => (iterator, chunk),
        _ => return Err(FilterError::Protocol("BF.SCANDUMP reply truncated".into())),
      };
      let iterator = match iterator {
        Value::Int(i) => i,
        other => {
          return Err(FilterError::Protocol(format!(
            "BF.SCANDUMP iterator is {}",
            describe(&other)
          )))
        }
      };
      match chunk {
        Value::Nil => Ok((iterator, None)),
        Value::BulkString(bytes) => Ok((iterator, Some(bytes))),
        other => Err(FilterError::Protocol(format!(
          "BF.SCANDUMP chunk is {}",
          describe(&other)
        ))),
      }
    }
    other => Err(FilterError::Protocol(format!(
      "BF.SCANDUMP returned {}",
      describe(&other)
    ))),
  }
}
