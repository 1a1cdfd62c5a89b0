//! Deployment assets bucket
//!
//! Holds artifacts the machines fetch at boot, most importantly the
//! published `jenkins-provision` binary the CI node runs.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::config::DeploymentConfig;
use crate::graph::{OutputField, ResourceNode, ResourceOutputs, ResourceSpec};
use crate::infrastructure::GcloudClient;
use crate::naming::ResourceNamer;
use crate::resources::absent_ok;

/// Object name of the published bootstrap binary.
pub const PROVISIONER_OBJECT: &str = "jenkins-provision";

pub fn bucket_name(namer: &ResourceNamer) -> String {
    namer.name("assets")
}

pub fn bucket_node(config: &DeploymentConfig, namer: &ResourceNamer) -> ResourceNode {
    ResourceNode::new(
        "assets-bucket",
        bucket_name(namer),
        ResourceSpec::Bucket {
            location: config.region.clone(),
        },
    )
}

pub async fn ensure_bucket(
    gcloud: &GcloudClient,
    name: &str,
    location: &str,
) -> Result<ResourceOutputs> {
    let url = format!("gs://{}", name);

    let existing = gcloud
        .try_describe(&["storage", "buckets", "describe", &url])
        .await?;
    if existing.is_some() {
        info!("✓ Bucket {} exists (idempotent, skipping)", name);
    } else {
        gcloud
            .run(&[
                "storage",
                "buckets",
                "create",
                &url,
                "--location",
                location,
                "--uniform-bucket-level-access",
            ])
            .await?;
        info!("✓ Bucket {} created in {}", name, location);
    }

    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    outputs.set(OutputField::SelfLink, url);
    Ok(outputs)
}

/// Removes the bucket together with everything in it.
pub async fn delete_bucket(gcloud: &GcloudClient, name: &str) -> Result<()> {
    let url = format!("gs://{}", name);
    absent_ok(gcloud.run(&["storage", "rm", "--recursive", &url]).await)?;
    info!("✓ Bucket {} removed", name);
    Ok(())
}

pub async fn upload_object(
    gcloud: &GcloudClient,
    bucket: &str,
    object: &str,
    path: &Path,
) -> Result<()> {
    let source = path.display().to_string();
    let dest = format!("gs://{}/{}", bucket, object);
    gcloud.run(&["storage", "cp", &source, &dest]).await?;
    info!("✓ Uploaded {} to {}", source, dest);
    Ok(())
}

pub async fn object_exists(gcloud: &GcloudClient, bucket: &str, object: &str) -> Result<bool> {
    let url = format!("gs://{}/{}", bucket, object);
    Ok(gcloud
        .try_describe(&["storage", "objects", "describe", &url])
        .await?
        .is_some())
}
