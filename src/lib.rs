pub mod bridge;
pub mod cli;
pub mod clipboard;
pub mod commands;
pub mod config;
pub mod error;
mod host;
pub mod registry;
pub mod search;
pub mod shell;
pub mod state;
pub mod status_log;
pub mod widgets;
pub mod workspace;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub use workspace::{Collaborators, WorkspaceConfig, WorkspaceView};

/// Entry point of the `nebula-ide` binary.
pub fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // stdout belongs to the terminal panel; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create tokio runtime: {e}"))?;
    rt.block_on(host::run(cli))
}
