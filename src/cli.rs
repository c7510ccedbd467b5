//! Command-line arguments

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

/// Persistent QVM session server
#[derive(Debug, Parser)]
#[command(name = "pqvm", version, about)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of live sessions
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Seconds a paused program may wait for resume before its session is killed
    #[arg(long, value_name = "SECS")]
    pub wait_timeout: Option<u64>,

    /// Log filter, e.g. `debug` or `pqvm_lib=trace` (overrides RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Overlay flags onto file configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(max_sessions) = self.max_sessions {
            config.sessions.max_sessions = max_sessions;
        }
        if let Some(secs) = self.wait_timeout {
            config.sessions.wait_timeout_secs = Some(secs);
        }
    }
}
