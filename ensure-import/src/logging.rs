//! Diagnostic tracing for the recovery flow.
//!
//! Remediation decisions (target selection, venv creation, installer runs,
//! search path changes) are logged at `info`; retry bookkeeping at `debug`.
//! Output goes to stderr so it never mixes with the CLI's stdout report.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber. Call once, from `main`.
///
/// Reads `RUST_LOG`. Defaults to `warn`, or `info` with `verbose`.
///
/// # Example
/// ```bash
/// RUST_LOG=ensure_import=debug ensure-import check requests
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
