//! Development-time tracing for debugging runs.
//!
//! Tracing is dev diagnostics only, output to stderr and controlled by
//! `RUST_LOG`. Product output is the JSON returned by the control plane and
//! the `.ralphy/progress.txt` log, neither of which goes through tracing.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn`, or `ralphy=debug` when `verbose` is
/// set. Output: stderr, compact format.
pub fn init(verbose: bool) {
    let default = if verbose { "ralphy=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
