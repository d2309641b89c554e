//! # Observability
//!
//! Centralized tracing setup for the khotruyen client binaries.
//!
//! Binaries call [`init`] or [`init_with_config`] once at startup and use the
//! standard `tracing` macros everywhere else. Library crates never install a
//! subscriber themselves.
//!
//! Two sinks are available:
//!
//! - A JSONL file (one structured entry per line), by default
//!   `~/.khotruyen/logs/client.jsonl`. Fields whose names look like
//!   credentials are redacted before the line is written.
//! - A compact human-readable stderr layer for interactive use.
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "cli".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!
//!     tracing::info!("ready");
//! }
//! ```

mod file_writer;
mod json_layer;

use std::path::PathBuf;

pub use file_writer::{LogFileWriter, DEFAULT_LOG_MAX_BYTES};
pub use json_layer::{is_sensitive_field, JsonLayer, LogEntry, REDACTED};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "cli"). Included in every JSONL line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.khotruyen/logs/client.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Write the JSONL file at all.
    pub file_output: bool,

    /// Size at which the log file is moved to `<name>.1` and restarted.
    pub max_file_bytes: u64,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            file_output: true,
            max_file_bytes: DEFAULT_LOG_MAX_BYTES,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// Falls back to stderr-only output when the log file cannot be opened, and
/// is a no-op if a global subscriber was already installed.
pub fn init_with_config(config: LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let env_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let log_path = config.log_path.clone().or_else(default_log_path);

    let (json_layer, file_error) = match (config.file_output, log_path.as_ref()) {
        (true, Some(path)) => match LogFileWriter::with_max_bytes(path, config.max_file_bytes) {
            Ok(writer) => (
                Some(JsonLayer::new(
                    config.service_name.clone(),
                    writer,
                )),
                None,
            ),
            Err(e) => (None, Some(e)),
        },
        _ => (None, None),
    };

    // Without a file sink stderr is the only place logs can go.
    let stderr_enabled = config.also_stderr || json_layer.is_none();
    let stderr_layer = stderr_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer.map(|l| l.with_filter(env_filter())))
        .with(stderr_layer.map(|l| l.with_filter(env_filter())))
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    match (file_error, log_path) {
        (Some(e), Some(path)) => tracing::warn!(
            log_path = %path.display(),
            error = %e,
            "log file unavailable, logging to stderr only"
        ),
        (None, Some(path)) if config.file_output => tracing::debug!(
            service = %config.service_name,
            log_path = %path.display(),
            "observability initialized"
        ),
        _ => {}
    }
}

/// Default JSONL location under the user's home directory.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".khotruyen").join("logs").join("client.jsonl"))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
