//! Jenkins CI node bootstrap
//!
//! Runs on the freshly booted CI instance and walks a strict eleven stage
//! sequence: package installation, Jenkins readiness, plugin and credential
//! setup, pipeline job registration, administrator rotation, GitHub webhook
//! registration and a final restart. Every stage is idempotent, so the
//! whole binary is safe to run again on a half provisioned machine.
//!
//! Secret values are fetched from Secret Manager at runtime and only ever
//! travel over stdin, files with 0600 permissions, or HTTP headers. They
//! never appear in argv, logs or error messages.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use tracing::info;

mod artifacts;
mod config;
mod github;
mod jenkins;
mod metadata;
mod poll;
mod secrets;
mod sequencer;
mod status;
mod system;
mod template;
mod validation;

use config::BootstrapConfig;

#[derive(Parser, Debug)]
#[command(name = "jenkins-provision")]
#[command(
    about = "Jenkins CI node bootstrap",
    long_about = "Idempotent bootstrap for a standalone Jenkins node.\n\n\
    Installs Jenkins, registers credentials, pipeline jobs and GitHub webhooks,\n\
    rotates the administrator account and writes a structured status file.\n\
    Safe to run multiple times; completed work is detected and skipped."
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bootstrap sequence against the local Jenkins (idempotent)
    Run {
        /// Path to YAML config file
        #[arg(long, env = "JENKINS_PROVISION_CONFIG")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            env::var("RUST_LOG").unwrap_or_else(|_| "jenkins_provision=info".to_string()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config } => run_from_config(&config).await,
    };

    if let Err(ref e) = result {
        tracing::error!("Bootstrap failed: {:#}", e);
    }

    result
}

async fn run_from_config(path: &str) -> Result<()> {
    info!("Loading bootstrap configuration from: {}", path);

    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read bootstrap configuration file: {}. Ensure the file exists and is readable.",
            path
        )
    })?;

    let config: BootstrapConfig = serde_yaml::from_str(&content).with_context(|| {
        format!(
            "Failed to parse bootstrap configuration file: {}. Ensure the YAML is valid.",
            path
        )
    })?;

    config.validate()?;
    sequencer::run(&config).await
}
