//! Logging setup for the command line tool.
//!
//! Logs go to stderr; stdout carries nothing but values printed by `get`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber for `sqlkv`.
///
/// `level` is the `--log-level` flag; a `RUST_LOG` directive overrides it.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}
