//! Logging setup.
//!
//! Logs go to **stderr**; stdout belongs to the host. Filtering follows
//! `RUST_LOG` first, then the provider block's `log_level`, then `info`.
//!
//! ```bash
//! RUST_LOG=streamsql_provider=debug ./provider   # every statement and poll attempt
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ProviderConfig;

/// Default filter when neither `RUST_LOG` nor the configuration set one.
pub const DEFAULT_LEVEL: &str = "info";

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

fn subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Install the global subscriber with the `info` default.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Install the global subscriber with a custom default filter.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Install the global subscriber using the provider block's `log_level`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_logging_from_config(config: &ProviderConfig) -> bool {
    let level = config.log_level.as_deref().unwrap_or(DEFAULT_LEVEL);
    subscriber(level).try_init().is_ok()
}

/// Try to install the global subscriber, returning `false` if one is
/// already set. Safe to call from tests.
pub fn try_init_logging() -> bool {
    subscriber(DEFAULT_LEVEL).try_init().is_ok()
}
