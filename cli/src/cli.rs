//! CLI definitions for groundwork
//!
//! This module contains all CLI argument parsing structures using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "groundwork",
    version,
    about = "Deployment orchestrator for a load balanced fleet with Jenkins CI",
    long_about = "Provisions a complete serving stack on Google Cloud:\nan autoscaled instance fleet behind a global HTTP load balancer,\nplus a standalone Jenkins node that bootstraps itself on first boot."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the resource graph an up would apply
    Plan {
        /// Deployment config file
        #[arg(long, default_value = "deploy.yaml")]
        config: PathBuf,
    },

    /// Create or converge every resource of the stack
    Up {
        /// Deployment config file
        #[arg(long, default_value = "deploy.yaml")]
        config: PathBuf,
    },

    /// Tear down every resource of the stack
    Destroy {
        /// Deployment config file
        #[arg(long, default_value = "deploy.yaml")]
        config: PathBuf,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Upload the Jenkins provisioner binary to the assets bucket
    Publish {
        /// Deployment config file
        #[arg(long, default_value = "deploy.yaml")]
        config: PathBuf,

        /// Path to a jenkins-provision binary built for Linux x86_64
        #[arg(long)]
        binary: PathBuf,
    },

    /// Show the health of a deployed stack
    Status {
        /// Deployment config file
        #[arg(long, default_value = "deploy.yaml")]
        config: PathBuf,
    },
}
