//! Configuration, paths, and logging setup shared by the Hapien crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, ServiceCredentials, SessionStorageKind, DEFAULT_APP_URL, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
