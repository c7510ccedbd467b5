//! Server Configuration
//!
//! Loaded from a TOML file; every field has a default so a missing file or
//! a partial one is fine.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::manager::DEFAULT_MAX_SESSIONS;
use crate::session::SessionManager;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sessions: SessionConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Longest configurable pause: thirty days
pub const MAX_WAIT_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// Session limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_sessions: usize,
    /// Seconds a paused program may wait before its session is killed;
    /// absent means wait forever
    pub wait_timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            wait_timeout_secs: None,
        }
    }
}

impl SessionConfig {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }

    /// Reject limits the manager cannot honour
    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_sessions > 0, "max_sessions must be at least 1");
        if let Some(secs) = self.wait_timeout_secs {
            ensure!(
                (1..=MAX_WAIT_TIMEOUT_SECS).contains(&secs),
                "wait_timeout_secs must be between 1 and {}, got {}",
                MAX_WAIT_TIMEOUT_SECS,
                secs
            );
        }
        Ok(())
    }

    pub fn build_manager(&self) -> SessionManager {
        SessionManager::with_limits(self.max_sessions, self.wait_timeout())
    }
}

impl Config {
    /// `<config dir>/pqvm/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pqvm").join("config.toml"))
    }

    /// Load an explicit file, which must exist
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load `path` if given, else the default file if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }
}
