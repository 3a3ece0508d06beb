//! Configuration for the route core

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RouteError;

/// Default data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mobility-route")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the route database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Database file name inside the data directory
    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// Reconcile interval for passive consumers, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Event bus capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_db_file() -> String {
    "route.sled".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: default_db_file(),
            poll_interval_ms: default_poll_interval_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RouteError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RouteError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RouteError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| RouteError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
