//! Acorn - cache-aside decorators for async Rust
//!
//! Wraps arbitrary compute futures with read-through, write-through and
//! invalidation caching over a pluggable [`Store`], guarded by an optional
//! bloom [`MembershipFilter`] against cache penetration.
//!
//! ```ignore
//! let config = CacheConfiguration::builder()
//!   .key("user:42")
//!   .store(store.clone())
//!   .expires(Duration::from_secs(300))
//!   .build();
//! let user: Structured<User> = cache_enable(|| load_user(42), &config).await?;
//! ```

pub mod config;
pub mod decorator;
pub mod error;
pub mod filter;
pub mod logging;
pub mod serializer;
pub mod store;

pub use config::AcornConfig;
pub use decorator::{
  cache_enable, cache_evict, cache_put, CacheConfigBuilder, CacheConfiguration, CacheOption,
};
pub use error::{CacheError, CacheErrorKind, CodecError, FilterError, StoreError};
pub use filter::{FilterPolicy, InMemoryBloomFilter, MembershipFilter, RedisBloomFilter};
pub use serializer::{CacheValue, JsonSerializer, MessagePackSerializer, Serializer, Structured};
pub use store::{InMemoryStore, MultiGet, RedisStore, Store};
