//! Process-wide `tracing` setup.
//!
//! Output goes to stderr: stdout carries JSON-RPC responses in server mode.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Repeated calls are no-ops.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging("debug");
        init_logging("warn");
        tracing::info!("logging initialized twice without panicking");
    }
}
