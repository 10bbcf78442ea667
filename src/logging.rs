//! Tracing subscriber setup shared by the binaries

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Noisy HTTP crates are clamped to `info` unless `RUST_LOG` says otherwise.
const NOISY_MODULES: &str = "h2=info,hyper=info,hyper_util=info,reqwest=info,rustls=info";

/// Filter directive used when `RUST_LOG` is not set.
pub fn default_directives(default_level: &str) -> String {
    let level = default_level.trim();
    if level.contains(',') || level.contains('=') {
        level.to_string()
    } else {
        format!("{},{}", level, NOISY_MODULES)
    }
}

/// Install the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(default_level)));

    let fmt_layer = fmt::layer().with_target(true).compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
