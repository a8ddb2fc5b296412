//! Logging initialization.
//!
//! Thin wrapper over the observability crate so binaries pick the same
//! service name, file location and stderr behavior.

use observability::LogConfig;
use std::path::PathBuf;

/// Initialize logging for a Hapien binary.
///
/// * `service_name` - tag written on every log line
/// * `level` - default filter, overridden by `RUST_LOG`
/// * `log_path` - JSONL file; `None` uses `~/.hapien/logs/hapien.jsonl`
/// * `also_stderr` - mirror logs to stderr in compact form
pub fn init_logging(service_name: &str, level: &str, log_path: Option<PathBuf>, also_stderr: bool) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path,
        also_stderr,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
