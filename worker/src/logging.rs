//! Diagnostic tracing for the worker.
//!
//! The worker's event stream is its operational output, so the default level
//! is `info`. `RUST_LOG` overrides as usual. Output goes to stderr; stdout
//! stays free for whatever hosts the process.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` if unset.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
