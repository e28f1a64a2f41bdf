//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSection;

/// Install a global `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// the configured level
///
/// Returns `false` when a subscriber was already installed (for example by
/// the host application); the existing one is left in place.
pub fn init(config: &LoggingSection) -> bool {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.level.clone().into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .try_init()
    .is_ok()
}
