//! Up command converging the platform onto the declared deployment
//!
//! Builds the resource graph from config and applies it wave by wave.
//! Re-running is always safe: existing resources are skipped or updated in
//! place, and a partially failed run picks up where it left off.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::config::{self, DeploymentConfig};
use crate::graph::{self, OutputField, ResourceProvisioner};
use crate::infrastructure::GcloudClient;
use crate::naming::ResourceNamer;
use crate::resources::{plan, storage, GcpProvisioner};
use crate::ui;

pub async fn execute(config_path: &Path) -> Result<()> {
    let config = DeploymentConfig::load(config_path)?;

    ui::print_header(&format!(
        "Deploying stack {} to project {}",
        config.stack, config.project
    ));
    info!("=== Deployment Apply (Idempotent) ===");

    info!("1. Checking tools and secret environment");
    GcloudClient::preflight()?;
    // Fail before touching the platform if a secret value is missing.
    config::require_env(&config.secrets.github_token_env)?;
    config::require_env(&config.secrets.admin_password_env)?;

    let graph = plan::deployment_graph(&config)?;
    info!(
        "2. Planned {} resources across {} waves",
        graph.len(),
        graph.waves().len()
    );

    info!("3. Applying resource graph");
    let started = std::time::Instant::now();
    let gcloud = GcloudClient::new(&config.project);
    let provisioner: Arc<dyn ResourceProvisioner> =
        Arc::new(GcpProvisioner::new(gcloud.clone(), &config));
    let report = graph::apply(&graph, provisioner).await;

    if !report.is_success() {
        for (role, error) in &report.failed {
            ui::print_error(&format!("{}: {}", role, error));
        }
        if !report.skipped.is_empty() {
            ui::print_warning(&format!(
                "Skipped because a dependency failed: {}",
                report.skipped.join(", ")
            ));
        }
        bail!(
            "{} of {} resources failed to apply; fix the errors above and re-run",
            report.failed.len(),
            graph.len()
        );
    }
    let elapsed = std::time::Duration::from_secs(started.elapsed().as_secs());
    ui::print_success(&format!(
        "{} resources applied in {} ({})",
        report.created.len(),
        humantime::format_duration(elapsed),
        chrono::Local::now().format("%H:%M:%S")
    ));

    let namer = ResourceNamer::new(&config.project, &config.stack);
    let bucket = storage::bucket_name(&namer);
    if !storage::object_exists(&gcloud, &bucket, storage::PROVISIONER_OBJECT).await? {
        warn!(
            "No provisioner binary at gs://{}/{}; the Jenkins node waits for it. Run `groundwork publish <binary>`.",
            bucket,
            storage::PROVISIONER_OBJECT
        );
    }

    println!();
    if let Some(ip) = report
        .outputs
        .get(plan::ROLE_FORWARDING_RULE, OutputField::Address)
    {
        ui::print_kv("Load balancer IP", ip);
        ui::print_kv("Application URL", &format!("http://{}", ip));
    }
    if let Some(name) = report.outputs.get(plan::ROLE_WEB_GROUP, OutputField::Name) {
        ui::print_kv("Instance group", name);
    }
    if let Some(name) = report.outputs.get(plan::ROLE_WEB_TEMPLATE, OutputField::Name) {
        ui::print_kv("Instance template", name);
    }
    if let Some(ip) = report.outputs.get(plan::ROLE_CI_NODE, OutputField::Address) {
        ui::print_kv("Jenkins", &format!("http://{}:{}", ip, config.ci.port));
    }

    Ok(())
}
