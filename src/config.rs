//! Settings file
//!
//! Loaded from `acorn.yaml` (or an explicit path) after `${VAR}` / `$VAR`
//! environment expansion. Every section is optional.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::decorator::CacheOption;
use crate::filter::InsertOptions;

/// Environment variable consulted when the file does not set an expiry
pub const DEFAULT_EXPIRE_ENV: &str = "DEFAULT_CACHE_EXPIRE";

const FALLBACK_EXPIRE_SECS: u64 = 300;

/// Expand environment variables in a string.
/// Supports both `${VAR_NAME}` and `$VAR_NAME` syntax. `$$` is a literal `$`;
/// a `$` that does not start a variable name is kept as is.
fn expand_env_vars(input: &str) -> String {
  let mut result = String::with_capacity(input.len());
  let mut rest = input;

  while let Some(pos) = rest.find('$') {
    result.push_str(&rest[..pos]);
    let after = &rest[pos + 1..];

    if let Some(escaped) = after.strip_prefix('$') {
      result.push('$');
      rest = escaped;
      continue;
    }

    if let Some(braced) = after.strip_prefix('{') {
      if let Some(end) = braced.find('}') {
        result.push_str(&std::env::var(&braced[..end]).unwrap_or_default());
        rest = &braced[end + 1..];
        continue;
      }
    } else {
      // names are ASCII, so this byte length is a char boundary
      let name_len = after
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(after.len());
      if name_len > 0 {
        result.push_str(&std::env::var(&after[..name_len]).unwrap_or_default());
        rest = &after[name_len..];
        continue;
      }
    }

    result.push('$');
    rest = after;
  }

  result.push_str(rest);
  result
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcornConfig {
  #[serde(default)]
  pub redis: RedisSection,
  #[serde(default)]
  pub cache: CacheSection,
  #[serde(default)]
  pub bloom: BloomSection,
  #[serde(default)]
  pub logging: LoggingSection,
}

/// Redis connection settings, shared by the store and the bloom filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSection {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_redis_port")]
  pub port: u16,
  #[serde(default)]
  pub password: Option<String>,
  #[serde(default)]
  pub database: u8,
  #[serde(default)]
  pub tls_enabled: bool,
}

fn default_host() -> String {
  "localhost".to_string()
}

fn default_redis_port() -> u16 {
  6379
}

impl Default for RedisSection {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_redis_port(),
      password: None,
      database: 0,
      tls_enabled: false,
    }
  }
}

impl RedisSection {
  /// Generate Redis connection URL
  pub fn connection_url(&self) -> String {
    let scheme = if self.tls_enabled { "rediss" } else { "redis" };
    let auth = match &self.password {
      Some(pwd) if !pwd.is_empty() => format!(":{}@", pwd),
      _ => String::new(),
    };
    format!(
      "{}://{}{}:{}/{}",
      scheme, auth, self.host, self.port, self.database
    )
  }
}

/// Open a managed connection (reconnects on its own)
pub async fn redis_connection(
  config: &RedisSection,
) -> Result<redis::aio::ConnectionManager, redis::RedisError> {
  let client = redis::Client::open(config.connection_url())?;
  let connection = redis::aio::ConnectionManager::new(client).await?;
  tracing::debug!("Connected to Redis at {}:{}", config.host, config.port);
  Ok(connection)
}

/// Defaults applied to decorated call sites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
  /// Expiry in seconds (0 = no expiry)
  #[serde(default = "default_expire_secs")]
  pub default_expire_secs: u64,
  /// Re-check the store before recomputing a miss
  #[serde(default)]
  pub sync: bool,
  /// Prepended to every key built through [`CacheSection::key`]
  #[serde(default)]
  pub key_prefix: String,
}

fn default_expire_secs() -> u64 {
  match std::env::var(DEFAULT_EXPIRE_ENV) {
    Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
      tracing::warn!(
        "Ignoring unparsable {}={:?}, using {}s",
        DEFAULT_EXPIRE_ENV,
        raw,
        FALLBACK_EXPIRE_SECS
      );
      FALLBACK_EXPIRE_SECS
    }),
    Err(_) => FALLBACK_EXPIRE_SECS,
  }
}

impl Default for CacheSection {
  fn default() -> Self {
    Self {
      default_expire_secs: default_expire_secs(),
      sync: false,
      key_prefix: String::new(),
    }
  }
}

impl CacheSection {
  pub fn default_expires(&self) -> Duration {
    Duration::from_secs(self.default_expire_secs)
  }

  /// Options a call site prepends to its own; later options override these
  pub fn base_options(&self) -> Vec<CacheOption> {
    vec![
      CacheOption::Expires(self.default_expires()),
      CacheOption::Sync(self.sync),
    ]
  }

  pub fn key(&self, name: &str) -> String {
    format!("{}{}", self.key_prefix, name)
  }
}

/// Bloom filter guarding against cache penetration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloomSection {
  #[serde(default)]
  pub enabled: bool,
  #[serde(default = "default_bloom_key")]
  pub key: String,
  #[serde(default = "default_error_rate")]
  pub error_rate: f64,
  #[serde(default = "default_capacity")]
  pub capacity: u64,
  #[serde(default = "default_expansion")]
  pub expansion: u32,
  #[serde(default)]
  pub non_scaling: bool,
}

fn default_bloom_key() -> String {
  "bloom:cache".to_string()
}

fn default_error_rate() -> f64 {
  0.01
}

fn default_capacity() -> u64 {
  100_000
}

fn default_expansion() -> u32 {
  2
}

impl Default for BloomSection {
  fn default() -> Self {
    Self {
      enabled: false,
      key: default_bloom_key(),
      error_rate: default_error_rate(),
      capacity: default_capacity(),
      expansion: default_expansion(),
      non_scaling: false,
    }
  }
}

impl BloomSection {
  /// Creation knobs for `BF.INSERT`, so the filter is sized on first use
  pub fn insert_options(&self) -> InsertOptions {
    InsertOptions {
      capacity: self.capacity,
      error_rate: self.error_rate,
      expansion: if self.non_scaling { 0 } else { self.expansion },
      no_create: false,
      non_scaling: self.non_scaling,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_level")]
  pub level: String,
}

fn default_level() -> String {
  "info".into()
}

impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_level(),
    }
  }
}

impl AcornConfig {
  pub fn from_yaml_str(content: &str) -> Result<Self, anyhow::Error> {
    let expanded = expand_env_vars(content);
    Ok(serde_yaml::from_str(&expanded)?)
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
    let content = std::fs::read_to_string(&path)?;
    Self::from_yaml_str(&content)
  }

  pub fn find_and_load() -> Result<Option<Self>, anyhow::Error> {
    for p in ["acorn.yaml", "acorn.yml"] {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }
}
