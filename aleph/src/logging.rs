//! Tracing subscriber setup.

use std::env;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the level is `debug` when `debug`
/// is set and `info` if not. `LOG_FORMAT=json` switches to JSON lines.
/// Returns `false` when a subscriber was already installed.
pub fn init(debug: bool) -> bool {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let json = env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.is_ok()
}
