//! Structured logging via the `tracing` ecosystem.
//!
//! Handlers log with structured fields (`lobby`, `player`, `game`) so a
//! single lobby can be followed with a plain text filter.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor configuration supplies one.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `filter`. Returns false if a subscriber was already
/// installed (tests, embedding applications).
pub fn init_logging(filter: Option<&str>) -> bool {
    let filter_str = filter
        .filter(|f| !f.trim().is_empty())
        .unwrap_or(DEFAULT_FILTER);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()
        .is_ok()
}

/// `EnvFilter` for [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
