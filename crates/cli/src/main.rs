//! archive-poster CLI entry point

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod args;
mod commands;
mod config;

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials live in the environment; a local .env is optional
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = cli.log_level.as_deref().unwrap_or("info");
    init_logging(log_level)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.config).await,
        Commands::Queue(args) => commands::queue::execute(args, cli.config).await,
        Commands::Preview(args) => commands::preview::execute(args, cli.config).await,
        Commands::Config(args) => commands::config::execute(args).await,
        Commands::Doctor(args) => commands::doctor::execute(args, cli.config).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}
