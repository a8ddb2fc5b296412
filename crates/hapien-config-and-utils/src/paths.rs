//! File system paths.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths under `~/.hapien`.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Paths rooted at `~/.hapien`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".hapien"),
        })
    }

    /// Paths rooted at a custom directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Base directory (~/.hapien).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Config file (~/.hapien/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Persisted auth session (~/.hapien/session.json).
    pub fn session_file(&self) -> PathBuf {
        self.base_dir.join("session.json")
    }

    /// Logs directory (~/.hapien/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// JSONL log file (~/.hapien/logs/hapien.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("hapien.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
