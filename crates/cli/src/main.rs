mod cli;
mod commands;
mod config;
mod registry;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::{handle_config_command, handle_module_command};
use crate::config::Config;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = cli.config.clone();

    if let Commands::Config { command } = cli.command {
        return handle_config_command(command, config_path.as_deref(), cli.dry_run).await;
    }

    let config = Config::load(config_path.as_deref()).await?;
    let ctx = registry::request_context(&cli, &config);
    let manager = registry::open_manager(&config).await?;

    tracing::debug!(
        "Using registry table '{}' ({} mode)",
        manager.config().table,
        manager.config().install_mode
    );

    handle_module_command(cli.command, &manager, &ctx, cli.dry_run).await
}
