//! rolesync - role propagation daemon
//!
//! - Propagates role changes between the main node and synced nodes
//! - Runs on-demand audits (analyze or force) and writes report artifacts
//! - Serves a REST API on /api for events, audits and operator commands

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod api;
mod cli;
mod commands;
mod logging;
mod router;
mod server_utils;
mod state;

#[cfg(test)]
mod test_helpers;

use cli::{Cli, Commands};
use rolesync_core::{
    DirectorySink, HttpNodeAdapter, LogSink, MultiSink, ReportSink, SyncEngine,
    EVENT_CHANNEL_CAPACITY,
};
use state::AppState;

const DEFAULT_PORT: u16 = 8046;
const DEFAULT_BIND: &str = "127.0.0.1";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(&cli.log_level, cli.log_dir.as_deref())?;

    match cli.command {
        None => serve(cli.config, cli.token, DEFAULT_BIND, DEFAULT_PORT).await,
        Some(Commands::Serve { port, bind }) => serve(cli.config, cli.token, &bind, port).await,
        Some(Commands::Audit { node, mode, requester, json }) => {
            commands::handle_audit(&cli.config, cli.token, node, mode, requester, json).await
        },
        Some(Commands::CheckConfig) => commands::handle_check_config(&cli.config),
    }
}

async fn serve(config_path: PathBuf, token: Option<String>, bind: &str, port: u16) -> Result<()> {
    let config = commands::load(&config_path)?;
    let token = commands::require_token(token)?;
    info!("[Server] rolesync {} starting", env!("CARGO_PKG_VERSION"));

    let adapter = Arc::new(HttpNodeAdapter::new(&config.api, token)?);
    let sink: Arc<dyn ReportSink> = Arc::new(MultiSink::new(vec![
        Arc::new(DirectorySink::new(config.reports.output_dir.clone())),
        Arc::new(LogSink),
    ]));
    let engine = Arc::new(SyncEngine::new(config, adapter, sink, None)?);
    let (events, propagator) = engine.spawn_propagator(EVENT_CHANNEL_CAPACITY);

    let state = AppState::new(engine, events, config_path);
    let app = router::build_router(state);
    let listener = server_utils::create_listener(bind, port).await?;
    axum::serve(listener, app).with_graceful_shutdown(server_utils::shutdown_signal()).await?;

    // Every sender is gone once the router is dropped; the loop drains and exits
    propagator.await?;
    info!("[Server] Stopped");
    Ok(())
}
