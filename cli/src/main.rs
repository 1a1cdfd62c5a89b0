use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod error;
mod graph;
mod infrastructure;
mod naming;
mod resources;
mod template;
mod ui;

use cli::{Cli, Commands};
use commands::{destroy, plan, publish, status, up};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false) // Disable ANSI escape codes for cleaner output
        .init();

    match cli.command {
        Commands::Plan { config } => {
            plan::execute(&config).await?;
        }
        Commands::Up { config } => {
            up::execute(&config).await?;
        }
        Commands::Destroy { config, force } => {
            destroy::execute(&config, force).await?;
        }
        Commands::Publish { config, binary } => {
            publish::execute(&config, &binary).await?;
        }
        Commands::Status { config } => {
            status::execute(&config).await?;
        }
    }

    Ok(())
}
