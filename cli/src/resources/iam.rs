//! Service accounts and IAM bindings
//!
//! One service identity per compute role. Fleet nodes can only read
//! secrets; the CI node additionally manages compute and storage because
//! its deployment jobs roll the instance group and fetch build artifacts.

use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::error::GcloudError;
use crate::graph::{OutputField, OutputRef, ResourceNode, ResourceOutputs, ResourceSpec};
use crate::infrastructure::GcloudClient;
use crate::naming::ResourceNamer;
use crate::resources::absent_ok;

const FLEET_ROLES: [&str; 1] = ["roles/secretmanager.secretAccessor"];

const CI_ROLES: [(&str, &str); 4] = [
    ("ci-secret-access", "roles/secretmanager.secretAccessor"),
    ("ci-compute-admin", "roles/compute.admin"),
    ("ci-storage-admin", "roles/storage.admin"),
    ("ci-sa-user", "roles/iam.serviceAccountUser"),
];

/// Service accounts for both compute roles plus their project bindings.
pub fn identity_nodes(namer: &ResourceNamer) -> Vec<ResourceNode> {
    let fleet_id = namer.service_account_id("web");
    let ci_id = namer.service_account_id("ci");

    let mut nodes = vec![
        ResourceNode::new(
            "fleet-sa",
            fleet_id.clone(),
            ResourceSpec::ServiceAccount {
                account_id: fleet_id.clone(),
                display_name: format!("Fleet nodes ({})", namer.stack()),
            },
        ),
        ResourceNode::new(
            "ci-sa",
            ci_id.clone(),
            ResourceSpec::ServiceAccount {
                account_id: ci_id.clone(),
                display_name: format!("CI node ({})", namer.stack()),
            },
        ),
    ];

    for role in FLEET_ROLES {
        nodes.push(binding_node("fleet-secret-access", "fleet-sa", &fleet_id, role));
    }
    for (binding_role, iam_role) in CI_ROLES {
        nodes.push(binding_node(binding_role, "ci-sa", &ci_id, iam_role));
    }
    nodes
}

fn binding_node(role: &str, sa_role: &str, account_id: &str, iam_role: &str) -> ResourceNode {
    ResourceNode::new(
        role,
        format!("{}:{}", account_id, iam_role),
        ResourceSpec::IamBinding {
            member: OutputRef::email(sa_role),
            account_id: account_id.to_string(),
            role: iam_role.to_string(),
        },
    )
    .needs(&[sa_role])
}

pub fn account_email(account_id: &str, project: &str) -> String {
    format!("{}@{}.iam.gserviceaccount.com", account_id, project)
}

pub async fn ensure_service_account(
    gcloud: &GcloudClient,
    account_id: &str,
    display_name: &str,
) -> Result<ResourceOutputs> {
    let email = account_email(account_id, gcloud.project());

    let existing = gcloud
        .try_describe(&["iam", "service-accounts", "describe", &email])
        .await?;
    if existing.is_some() {
        info!("✓ Service account {} exists (idempotent, skipping)", account_id);
    } else {
        gcloud
            .run(&[
                "iam",
                "service-accounts",
                "create",
                account_id,
                "--display-name",
                display_name,
            ])
            .await?;
        info!("✓ Service account {} created", account_id);
    }

    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Email, email);
    outputs.set(OutputField::Name, account_id);
    Ok(outputs)
}

/// Grant a project role to a service account. Re-granting an existing
/// binding is a no-op on the platform side.
///
/// A service account created moments earlier may not be visible to IAM
/// yet, so "does not exist" is retried a few times before giving up.
pub async fn ensure_binding(
    gcloud: &GcloudClient,
    member_email: &str,
    role: &str,
) -> Result<ResourceOutputs> {
    let member = format!("serviceAccount:{}", member_email);
    let project = gcloud.project().to_string();
    let attempts = 4u32;

    for attempt in 1..=attempts {
        let result = gcloud
            .run(&[
                "projects",
                "add-iam-policy-binding",
                &project,
                "--member",
                &member,
                "--role",
                role,
            ])
            .await;

        match result {
            Ok(_) => {
                info!("✓ {} bound to {}", role, member_email);
                return Ok(ResourceOutputs::new());
            }
            Err(GcloudError::CommandFailed { ref stderr, .. })
                if stderr.contains("does not exist") && attempt < attempts =>
            {
                warn!(
                    "Attempt {}/{}: {} not visible yet, retrying in 5s",
                    attempt, attempts, member_email
                );
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    anyhow::bail!("IAM binding {} for {} did not apply", role, member_email)
}

pub async fn delete_binding(gcloud: &GcloudClient, account_id: &str, role: &str) -> Result<()> {
    let member = format!(
        "serviceAccount:{}",
        account_email(account_id, gcloud.project())
    );
    let project = gcloud.project().to_string();
    absent_ok(
        gcloud
            .run(&[
                "projects",
                "remove-iam-policy-binding",
                &project,
                "--member",
                &member,
                "--role",
                role,
            ])
            .await,
    )?;
    info!("✓ {} unbound from {}", role, account_id);
    Ok(())
}

pub async fn delete_service_account(gcloud: &GcloudClient, account_id: &str) -> Result<()> {
    let email = account_email(account_id, gcloud.project());
    absent_ok(
        gcloud
            .run(&["iam", "service-accounts", "delete", &email])
            .await,
    )?;
    info!("✓ Service account {} removed", account_id);
    Ok(())
}
