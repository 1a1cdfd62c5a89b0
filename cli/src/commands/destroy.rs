//! Destroy command tearing the whole stack down
//!
//! Walks the resource graph in reverse wave order, dependents before
//! dependencies. Teardown is best effort; already absent resources count
//! as removed, so a destroy can be re-run after a partial failure.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use colored::Colorize;

use crate::config::DeploymentConfig;
use crate::graph::{self, ResourceProvisioner};
use crate::infrastructure::GcloudClient;
use crate::resources::{plan, GcpProvisioner};
use crate::ui;

pub async fn execute(config_path: &Path, force: bool) -> Result<()> {
    let config = DeploymentConfig::load(config_path)?;
    GcloudClient::preflight()?;

    let graph = plan::deployment_graph(&config)?;

    ui::print_header(&format!(
        "Destroying stack {} in project {}",
        config.stack, config.project
    ));
    ui::print_warning(&format!(
        "This removes all {} resources of the stack, including secrets and the Jenkins node",
        graph.len()
    ));

    if !force {
        print!("Type y to destroy {}: [y/N] ", config.stack);
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        let answer = input.trim().to_lowercase();

        if answer != "y" && answer != "yes" {
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
    }

    let gcloud = GcloudClient::new(&config.project);
    let provisioner: Arc<dyn ResourceProvisioner> =
        Arc::new(GcpProvisioner::new(gcloud, &config));
    let report = graph::destroy(&graph, provisioner).await;

    if !report.is_success() {
        for (role, error) in &report.failed {
            ui::print_error(&format!("{}: {}", role, error));
        }
        bail!(
            "{} resources were not removed; re-run destroy once the errors are resolved",
            report.failed.len()
        );
    }

    ui::print_success(&format!("Stack {} destroyed", config.stack));
    Ok(())
}
