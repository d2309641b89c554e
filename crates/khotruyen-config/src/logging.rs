//! Logging initialization for client binaries.
//!
//! Thin wrapper over the observability package so binaries share one setup:
//! JSONL to `~/.khotruyen/logs/client.jsonl` plus optional stderr output.

use crate::Paths;

/// Initialize the logging system for a client binary.
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init_logging(service_name: &str, level: &str, paths: Option<&Paths>, also_stderr: bool) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: paths.map(Paths::log_file),
        also_stderr,
        ..Default::default()
    });
}
