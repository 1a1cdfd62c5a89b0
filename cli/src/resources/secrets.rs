//! Secret Manager resources
//!
//! Two logical secrets per deployment: the GitHub deploy token and the
//! permanent Jenkins admin password. Values are read from environment
//! variables at apply time and piped straight into gcloud; only secret
//! names travel through the graph, scripts and configs.

use anyhow::Result;
use tracing::{debug, info};

use crate::config::{self, DeploymentConfig};
use crate::graph::{OutputField, OutputRef, ResourceNode, ResourceOutputs, ResourceSpec};
use crate::infrastructure::GcloudClient;
use crate::naming::ResourceNamer;
use crate::resources::absent_ok;

pub fn github_token_secret(namer: &ResourceNamer) -> String {
    namer.name("github-token")
}

pub fn admin_password_secret(namer: &ResourceNamer) -> String {
    namer.name("admin-password")
}

/// Secret and current-version nodes for the deployment.
pub fn secret_nodes(config: &DeploymentConfig, namer: &ResourceNamer) -> Vec<ResourceNode> {
    vec![
        ResourceNode::new(
            "github-token-secret",
            github_token_secret(namer),
            ResourceSpec::Secret,
        ),
        ResourceNode::new(
            "admin-password-secret",
            admin_password_secret(namer),
            ResourceSpec::Secret,
        ),
        ResourceNode::new(
            "github-token-version",
            format!("{}@latest", github_token_secret(namer)),
            ResourceSpec::SecretVersion {
                secret: OutputRef::name("github-token-secret"),
                value_env: config.secrets.github_token_env.clone(),
            },
        )
        .needs(&["github-token-secret"]),
        ResourceNode::new(
            "admin-password-version",
            format!("{}@latest", admin_password_secret(namer)),
            ResourceSpec::SecretVersion {
                secret: OutputRef::name("admin-password-secret"),
                value_env: config.secrets.admin_password_env.clone(),
            },
        )
        .needs(&["admin-password-secret"]),
    ]
}

pub async fn ensure_secret(gcloud: &GcloudClient, name: &str) -> Result<ResourceOutputs> {
    let existing = gcloud.try_describe(&["secrets", "describe", name]).await?;
    if existing.is_some() {
        info!("✓ Secret {} exists (idempotent, skipping)", name);
    } else {
        gcloud
            .run(&["secrets", "create", name, "--replication-policy", "automatic"])
            .await?;
        info!("✓ Secret {} created", name);
    }

    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    outputs.set(
        OutputField::SecretId,
        format!("projects/{}/secrets/{}", gcloud.project(), name),
    );
    Ok(outputs)
}

/// Converge the latest version of a secret to the value of `value_env`.
///
/// The current version is compared first so reruns do not pile up
/// identical versions. The value itself is piped over stdin and never
/// appears in argv, logs or errors.
pub async fn ensure_secret_version(
    gcloud: &GcloudClient,
    secret_name: &str,
    value_env: &str,
) -> Result<ResourceOutputs> {
    let value = config::require_env(value_env)?;

    let current = gcloud
        .run(&["secrets", "versions", "access", "latest", "--secret", secret_name])
        .await
        .ok();

    if current.as_deref() == Some(value.as_str()) {
        info!(
            "✓ Secret {} already holds the desired value (idempotent, skipping)",
            secret_name
        );
    } else {
        gcloud
            .run_with_stdin(
                &["secrets", "versions", "add", secret_name, "--data-file=-"],
                value.as_bytes(),
            )
            .await?;
        info!("✓ Secret {} version added from ${}", secret_name, value_env);
    }

    Ok(ResourceOutputs::new())
}

pub async fn delete_secret(gcloud: &GcloudClient, name: &str) -> Result<()> {
    absent_ok(gcloud.run(&["secrets", "delete", name]).await)?;
    info!("✓ Secret {} removed", name);
    Ok(())
}

/// Versions disappear with their secret; nothing to do on their own.
pub async fn delete_secret_version(name: &str) -> Result<()> {
    debug!("Secret version {} removed with its secret", name);
    Ok(())
}
