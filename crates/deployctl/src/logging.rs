//! Diagnostics logging
//!
//! Tracing output goes to stderr so it never mixes with the deploy log
//! lines mirrored on stdout. Filter with `RUST_LOG`, default `warn`.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
