use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rolesync_types::models::SyncMode;

#[derive(Parser)]
#[command(
    name = "rolesync",
    about = "rolesync - keeps equivalent roles aligned across communities",
    version = env!("CARGO_PKG_VERSION"),
    author,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, global = true, env = "ROLESYNC_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    #[arg(long, global = true, env = "ROLESYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(short, long, global = true, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, env = "ROLESYNC_LOG_DIR", help = "Also write daily log files here")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the propagation loop and HTTP API (default if no command specified)")]
    Serve {
        #[arg(short, long, env = "ROLESYNC_PORT", default_value = "8046")]
        port: u16,

        #[arg(long, env = "ROLESYNC_BIND", default_value = "127.0.0.1")]
        bind: String,
    },

    #[command(about = "Run one reconciliation pass and write the report")]
    Audit {
        #[arg(long, help = "Node to reconcile from")]
        node: String,

        #[arg(long, default_value = "analyze", help = "analyze or force")]
        mode: SyncMode,

        #[arg(long, help = "Member id the audit runs on behalf of")]
        requester: String,

        #[arg(short, long, help = "Print the report as JSON")]
        json: bool,
    },

    #[command(about = "Validate the config file and print the Sync ID table")]
    CheckConfig,
}
