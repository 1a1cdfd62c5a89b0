//! Standalone Jenkins CI instance
//!
//! The instance boots with a small shim script that fetches the provisioner
//! binary from the assets bucket and hands it a YAML settings document. The
//! document carries Secret Manager secret NAMES only; the provisioner reads
//! the values on the instance at runtime.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::config::DeploymentConfig;
use crate::error::{ConfigError, DeployError};
use crate::graph::{OutputField, OutputRef, ResourceNode, ResourceOutputs, ResourceSpec};
use crate::infrastructure::GcloudClient;
use crate::naming::ResourceNamer;
use crate::resources::{
    absent_ok, field_str, network, scripts, secrets, storage, CLOUD_PLATFORM_SCOPE,
};

/// Settings handed to the on-instance provisioner. Deliberately mirrors the
/// provisioner's own config schema.
#[derive(Debug, Serialize)]
pub struct BootstrapSettings {
    pub project: String,
    pub jenkins: JenkinsSettings,
    pub secrets: SecretNames,
    pub credentials_id: String,
    pub plugins: Vec<String>,
    pub repositories: Vec<RepositorySettings>,
}

#[derive(Debug, Serialize)]
pub struct JenkinsSettings {
    pub admin_user: String,
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub struct SecretNames {
    pub github_token: String,
    pub admin_password: String,
}

#[derive(Debug, Serialize)]
pub struct RepositorySettings {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

pub fn bootstrap_settings(config: &DeploymentConfig, namer: &ResourceNamer) -> BootstrapSettings {
    BootstrapSettings {
        project: config.project.clone(),
        jenkins: JenkinsSettings {
            admin_user: config.ci.admin_user.clone(),
            port: config.ci.port,
        },
        secrets: SecretNames {
            github_token: secrets::github_token_secret(namer),
            admin_password: secrets::admin_password_secret(namer),
        },
        credentials_id: config.ci.credentials_id.clone(),
        plugins: config.ci.plugins.clone(),
        repositories: config
            .repositories
            .iter()
            .map(|repo| RepositorySettings {
                owner: repo.owner.clone(),
                name: repo.name.clone(),
                branch: repo.branch.clone(),
            })
            .collect(),
    }
}

pub fn ci_node(
    config: &DeploymentConfig,
    namer: &ResourceNamer,
) -> Result<ResourceNode, DeployError> {
    let settings = bootstrap_settings(config, namer);
    let settings_yaml =
        serde_yaml::to_string(&settings).map_err(|e| ConfigError::ParseError {
            message: format!("bootstrap settings: {e}"),
        })?;
    let script = scripts::ci_startup(
        &storage::bucket_name(namer),
        storage::PROVISIONER_OBJECT,
        &settings_yaml,
    )?;

    Ok(ResourceNode::new(
        "ci-node",
        namer.name("ci"),
        ResourceSpec::Instance {
            machine_type: config.ci.machine_type.clone(),
            image_family: config.fleet.image_family.clone(),
            image_project: config.fleet.image_project.clone(),
            network: Some(OutputRef::self_link("ci-network")),
            tags: vec![network::CI_TAG.to_string()],
            service_account: OutputRef::email("ci-sa"),
            scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
            startup_script: script,
        },
    )
    .needs(&[
        "ci-sa",
        "ci-secret-access",
        "ci-compute-admin",
        "ci-storage-admin",
        "ci-sa-user",
        "ci-network",
        "ci-firewall",
        "github-token-version",
        "admin-password-version",
        "assets-bucket",
    ]))
}

#[allow(clippy::too_many_arguments)]
pub async fn ensure_instance(
    gcloud: &GcloudClient,
    zone: &str,
    name: &str,
    machine_type: &str,
    image_family: &str,
    image_project: &str,
    net: Option<&str>,
    tags: &[String],
    service_account: &str,
    scopes: &[String],
    startup_script: &str,
) -> Result<ResourceOutputs> {
    let existing = gcloud
        .try_describe(&["compute", "instances", "describe", name, "--zone", zone])
        .await?;
    if existing.is_some() {
        info!("✓ Instance {} exists (idempotent, skipping)", name);
    } else {
        use std::io::Write;
        let mut script_file = tempfile::NamedTempFile::new()?;
        script_file.write_all(startup_script.as_bytes())?;
        let metadata = format!("startup-script={}", script_file.path().display());
        let tags_flag = tags.join(",");
        let scopes_flag = scopes.join(",");

        let mut args = vec![
            "compute",
            "instances",
            "create",
            name,
            "--zone",
            zone,
            "--machine-type",
            machine_type,
            "--image-family",
            image_family,
            "--image-project",
            image_project,
            "--tags",
            &tags_flag,
            "--service-account",
            service_account,
            "--scopes",
            &scopes_flag,
            "--metadata-from-file",
            &metadata,
        ];
        if let Some(net) = net {
            args.push("--network");
            args.push(net);
        }
        gcloud.run(&args).await?;
        info!("✓ Instance {} created in {}", name, zone);
    }

    let described = gcloud
        .run_json(&["compute", "instances", "describe", name, "--zone", zone])
        .await?;
    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    if let Some(ip) = instance_external_ip(&described) {
        outputs.set(OutputField::Address, ip);
    }
    if let Some(link) = field_str(&described, "selfLink") {
        outputs.set(OutputField::SelfLink, link);
    }
    Ok(outputs)
}

/// External IP of the first network interface, when one is attached.
pub fn instance_external_ip(described: &serde_json::Value) -> Option<String> {
    described["networkInterfaces"][0]["accessConfigs"][0]["natIP"]
        .as_str()
        .map(|s| s.to_string())
}

pub async fn delete_instance(gcloud: &GcloudClient, zone: &str, name: &str) -> Result<()> {
    absent_ok(
        gcloud
            .run(&["compute", "instances", "delete", name, "--zone", zone])
            .await,
    )?;
    info!("✓ Instance {} removed", name);
    Ok(())
}
