//! Diagnostic tracing for the `mq` binary
//!
//! Command output goes to stdout; tracing goes to stderr so `--json` output
//! stays machine-readable.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "warn";

/// Initialize the tracing subscriber
///
/// Reads `RUST_LOG`, defaulting to `warn`; `verbose` raises this crate to
/// `debug`. Safe to call more than once: later calls are ignored.
///
/// ```bash
/// RUST_LOG=mq_refinery=debug mq refinery gastown --once
/// ```
pub fn init(verbose: bool) {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if verbose {
        if let Ok(directive) = "mq_refinery=debug".parse() {
            filter = filter.add_directive(directive);
        }
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
