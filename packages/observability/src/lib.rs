//! # Observability
//!
//! Centralized logging for the Hapien workspace.
//!
//! Binaries call [`init`] or [`init_with_config`] once at startup and use the
//! standard `tracing` macros everywhere else. Library crates never install a
//! subscriber themselves.
//!
//! Every event is written as one JSON object per line to
//! `~/.hapien/logs/hapien.jsonl` (or [`LogConfig::log_path`]), so a session
//! can be followed with:
//!
//! ```text
//! tail -f ~/.hapien/logs/hapien.jsonl | jq
//! ```
//!
//! ## Usage
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

mod file;
mod json_layer;

pub use file::{default_log_path, LogFileWriter};
pub use json_layer::{JsonLayer, LogEntry};

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "cli").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG`.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.hapien/logs/hapien.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings for `service_name`.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// If the log file cannot be opened (no home directory, read-only disk) the
/// JSONL layer is skipped and only the stderr layer, when requested, is
/// installed. Calling this twice is harmless; the second call is ignored.
pub fn init_with_config(config: LogConfig) {
    let log_path = config.log_path.clone().or_else(default_log_path);

    let json_layer = log_path
        .as_ref()
        .and_then(|path| LogFileWriter::open(path).ok())
        .map(|writer| {
            JsonLayer::new(config.service_name.clone(), writer)
                .with_filter(env_filter(&config.default_level))
        });

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            service = %config.service_name,
            log_path = ?log_path,
            "observability initialized"
        );
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
