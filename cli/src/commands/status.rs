//! Status command reporting on a deployed stack
//!
//! Read-only: describes the key resources and probes the application's
//! health endpoint through the load balancer.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::config::DeploymentConfig;
use crate::infrastructure::GcloudClient;
use crate::naming::ResourceNamer;
use crate::resources::ci;
use crate::ui;

pub async fn execute(config_path: &Path) -> Result<()> {
    let config = DeploymentConfig::load(config_path)?;
    GcloudClient::preflight()?;

    let gcloud = GcloudClient::new(&config.project);
    let namer = ResourceNamer::new(&config.project, &config.stack);

    ui::print_header(&format!(
        "Status of stack {} in project {}",
        config.stack, config.project
    ));

    // ========================================================================
    // Load balancer
    // ========================================================================
    let lb_ip = gcloud
        .try_describe(&[
            "compute",
            "addresses",
            "describe",
            &namer.name("lb-ip"),
            "--global",
        ])
        .await?
        .and_then(|v| v["address"].as_str().map(|s| s.to_string()));

    match &lb_ip {
        Some(ip) => ui::print_kv("Load balancer IP", ip),
        None => ui::print_warning("Load balancer address not found. Has the stack been applied?"),
    }

    // ========================================================================
    // Fleet
    // ========================================================================
    let group = gcloud
        .try_describe(&[
            "compute",
            "instance-groups",
            "managed",
            "describe",
            &namer.name("web-group"),
            "--region",
            &config.region,
        ])
        .await?;

    match group {
        Some(group) => {
            let size = group["targetSize"].as_i64().unwrap_or(0);
            let stable = group["status"]["isStable"].as_bool().unwrap_or(false);
            ui::print_kv("Fleet size", &size.to_string());
            ui::print_kv("Fleet stable", if stable { "yes" } else { "no" });
        }
        None => ui::print_warning("Instance group not found"),
    }

    // ========================================================================
    // Jenkins
    // ========================================================================
    let instance = gcloud
        .try_describe(&[
            "compute",
            "instances",
            "describe",
            &namer.name("ci"),
            "--zone",
            &config.ci_zone(),
        ])
        .await?;

    match instance {
        Some(instance) => {
            let state = instance["status"].as_str().unwrap_or("UNKNOWN").to_string();
            ui::print_kv("Jenkins instance", &state);
            if let Some(ip) = ci::instance_external_ip(&instance) {
                ui::print_kv("Jenkins URL", &format!("http://{}:{}", ip, config.ci.port));
            }
        }
        None => ui::print_warning("Jenkins instance not found"),
    }

    // ========================================================================
    // Health probe through the load balancer
    // ========================================================================
    if let Some(ip) = lb_ip {
        let url = format!("http://{}{}", ip, config.app.health_path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                ui::print_kv("Health", &format!("healthy ({})", response.status()));
            }
            Ok(response) => {
                ui::print_kv("Health", &format!("unhealthy ({})", response.status()));
            }
            Err(_) => {
                ui::print_warning(&format!(
                    "Health probe {} did not answer. New deployments can take a few minutes to pass health checks.",
                    url
                ));
            }
        }
    }

    Ok(())
}
