//! CLI command implementations.

mod auth;
mod callback;
mod diagnose;

pub use auth::{login, logout, status, verify};
pub use callback::callback;
pub use diagnose::diagnose;

use anyhow::Result;
use hapien_auth::AuthRuntime;
use hapien_config_and_utils::{Config, Paths};

/// Build the auth runtime from `~/.hapien/config.json` and the environment.
fn load_runtime() -> Result<AuthRuntime> {
    let paths = Paths::new()?;
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;
    Ok(AuthRuntime::from_config(&config, &paths)?)
}
