//! Persistent QVM session server
//!
//! Long-lived quantum virtual machine sessions addressed by token, with
//! cooperative pause/resume of running programs, served over JSON-RPC.

pub mod cli;
pub mod config;
pub mod engine;
pub mod rpc;
pub mod server;
pub mod session;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use cli::Cli;
use config::Config;
use rpc::RpcRouter;

/// How long blocking handlers get to finish once the server stops
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Parse arguments, load configuration and serve until interrupted
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.sessions.validate()?;

    let manager = Arc::new(config.sessions.build_manager());
    let router = Arc::new(RpcRouter::new(manager));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    let result = runtime.block_on(server::serve(&config.server, router));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

fn init_logging(filter: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = filter {
        builder.parse_filters(filter);
    }
    builder.init();
}
