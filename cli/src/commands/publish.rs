//! Publish command uploading the provisioner binary
//!
//! The Jenkins node does not bake the provisioner into its image; it polls
//! the assets bucket for it on first boot. Publish puts the binary there,
//! creating the bucket when the stack has not been applied yet.

use std::path::Path;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::DeploymentConfig;
use crate::infrastructure::GcloudClient;
use crate::naming::ResourceNamer;
use crate::resources::storage;
use crate::ui;

pub async fn execute(config_path: &Path, binary: &Path) -> Result<()> {
    let config = DeploymentConfig::load(config_path)?;
    GcloudClient::preflight()?;

    if !binary.is_file() {
        bail!(
            "Provisioner binary not found at {}. Build it with `cargo build --release -p jenkins-provision` \
             for a Linux x86_64 target first.",
            binary.display()
        );
    }

    let bytes = tokio::fs::read(binary).await?;
    let digest = format!("{:x}", Sha256::digest(&bytes));

    let namer = ResourceNamer::new(&config.project, &config.stack);
    let bucket = storage::bucket_name(&namer);
    let gcloud = GcloudClient::new(&config.project);

    ui::print_header(&format!("Publishing provisioner for stack {}", config.stack));
    info!("Binary is {} bytes, sha256 {}", bytes.len(), &digest[..12]);

    storage::ensure_bucket(&gcloud, &bucket, &config.region).await?;
    storage::upload_object(&gcloud, &bucket, storage::PROVISIONER_OBJECT, binary).await?;

    ui::print_success("Provisioner published");
    ui::print_kv("Object", &format!("gs://{}/{}", bucket, storage::PROVISIONER_OBJECT));
    ui::print_kv("Digest", &digest);
    Ok(())
}
