//! Instance template and regional managed instance group
//!
//! Templates are immutable and content-addressed: the template name carries
//! a fingerprint of everything baked into it, so a changed startup script or
//! machine type produces a new template that is created before the group
//! rolls onto it. Old generations are garbage collected once no longer in
//! use.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::io::Write;
use tracing::{info, warn};

use crate::config::DeploymentConfig;
use crate::error::TemplateError;
use crate::graph::{
    OutputField, OutputRef, ResourceNode, ResourceOutputs, ResourceSpec, RollingUpdatePolicy,
};
use crate::infrastructure::GcloudClient;
use crate::naming::{NamedPort, ResourceNamer};
use crate::resources::{
    absent_ok, field_str, network, resource_name, scripts, secrets, CLOUD_PLATFORM_SCOPE,
};

/// Template and group nodes for the application fleet.
pub fn fleet_nodes(
    config: &DeploymentConfig,
    namer: &ResourceNamer,
) -> Result<Vec<ResourceNode>, TemplateError> {
    let repo = config.app_repository();
    let script = scripts::fleet_startup(
        &secrets::github_token_secret(namer),
        &repo.clone_url(),
        &repo.branch,
        config.app.port,
    )?;

    let fingerprint = template_fingerprint(&[
        &config.fleet.machine_type,
        &config.fleet.image_family,
        &config.fleet.image_project,
        network::FLEET_TAG,
        &script,
    ]);
    let template_name = format!("{}-{}", namer.name("web-template"), fingerprint);

    let template = ResourceNode::new(
        "web-template",
        template_name,
        ResourceSpec::InstanceTemplate {
            machine_type: config.fleet.machine_type.clone(),
            image_family: config.fleet.image_family.clone(),
            image_project: config.fleet.image_project.clone(),
            tags: vec![network::FLEET_TAG.to_string()],
            service_account: OutputRef::email("fleet-sa"),
            scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
            startup_script: script,
        },
    )
    .needs(&["fleet-sa", "fleet-secret-access", "github-token-version"]);

    let group = ResourceNode::new(
        "web-group",
        namer.name("web-group"),
        ResourceSpec::InstanceGroup {
            template: OutputRef::self_link("web-template"),
            target_size: config.fleet.target_size,
            base_instance_name: namer.name("web"),
            named_port: NamedPort::http(config.app.port),
            update_policy: RollingUpdatePolicy {
                max_surge: config.fleet.max_surge,
                max_unavailable: config.fleet.max_unavailable,
            },
        },
    )
    .needs(&["web-template"]);

    Ok(vec![template, group])
}

/// Ten hex characters over the template's baked-in content.
pub fn template_fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..10].to_string()
}

#[allow(clippy::too_many_arguments)]
pub async fn ensure_instance_template(
    gcloud: &GcloudClient,
    name: &str,
    machine_type: &str,
    image_family: &str,
    image_project: &str,
    tags: &[String],
    service_account: &str,
    scopes: &[String],
    startup_script: &str,
) -> Result<ResourceOutputs> {
    let existing = gcloud
        .try_describe(&["compute", "instance-templates", "describe", name])
        .await?;
    if existing.is_some() {
        info!("✓ Instance template {} exists (idempotent, skipping)", name);
    } else {
        // The script goes through a file so it never rides argv.
        let mut script_file = tempfile::NamedTempFile::new()?;
        script_file.write_all(startup_script.as_bytes())?;
        let metadata = format!("startup-script={}", script_file.path().display());
        let tags_flag = tags.join(",");
        let scopes_flag = scopes.join(",");

        gcloud
            .run(&[
                "compute",
                "instance-templates",
                "create",
                name,
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
            ])
            .await?;
        info!("✓ Instance template {} created", name);
    }

    let described = gcloud
        .run_json(&["compute", "instance-templates", "describe", name])
        .await?;
    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    if let Some(link) = field_str(&described, "selfLink") {
        outputs.set(OutputField::SelfLink, link);
    }
    Ok(outputs)
}

#[allow(clippy::too_many_arguments)]
pub async fn ensure_instance_group(
    gcloud: &GcloudClient,
    region: &str,
    name: &str,
    template: &str,
    target_size: u32,
    base_instance_name: &str,
    named_port: &NamedPort,
    policy: &RollingUpdatePolicy,
) -> Result<ResourceOutputs> {
    let existing = gcloud
        .try_describe(&[
            "compute",
            "instance-groups",
            "managed",
            "describe",
            name,
            "--region",
            region,
        ])
        .await?;

    match existing {
        None => {
            let size = target_size.to_string();
            gcloud
                .run(&[
                    "compute",
                    "instance-groups",
                    "managed",
                    "create",
                    name,
                    "--region",
                    region,
                    "--template",
                    template,
                    "--size",
                    &size,
                    "--base-instance-name",
                    base_instance_name,
                ])
                .await?;
            info!("✓ Instance group {} created with {} instances", name, size);
        }
        Some(current) => {
            let current_template = field_str(&current, "instanceTemplate").unwrap_or_default();
            if resource_name(&current_template) == resource_name(template) {
                info!(
                    "✓ Instance group {} already on template {} (idempotent, skipping)",
                    name,
                    resource_name(template)
                );
            } else {
                start_rolling_update(gcloud, region, name, template, policy).await?;
                gc_templates(gcloud, template).await?;
            }
        }
    }

    let ports = named_port.flag_value();
    gcloud
        .run(&[
            "compute",
            "instance-groups",
            "set-named-ports",
            name,
            "--region",
            region,
            "--named-ports",
            &ports,
        ])
        .await?;
    info!("✓ Named port {} set on {}", ports, name);

    let described = gcloud
        .run_json(&[
            "compute",
            "instance-groups",
            "managed",
            "describe",
            name,
            "--region",
            region,
        ])
        .await?;
    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    if let Some(group_link) =
        field_str(&described, "instanceGroup").or_else(|| field_str(&described, "selfLink"))
    {
        outputs.set(OutputField::SelfLink, group_link);
    }
    Ok(outputs)
}

/// Proactive substitute-style rollout onto a new template. Surge-first with
/// zero unavailability keeps serving capacity at or above target throughout.
async fn start_rolling_update(
    gcloud: &GcloudClient,
    region: &str,
    name: &str,
    template: &str,
    policy: &RollingUpdatePolicy,
) -> Result<()> {
    let surge = policy.max_surge.to_string();
    let unavailable = policy.max_unavailable.to_string();
    let version = format!("template={}", template);

    info!(
        "Rolling {} onto {} (surge {}, unavailable {})",
        name,
        resource_name(template),
        surge,
        unavailable
    );
    gcloud
        .run(&[
            "compute",
            "instance-groups",
            "managed",
            "rolling-action",
            "start-update",
            name,
            "--region",
            region,
            "--version",
            &version,
            "--type",
            "proactive",
            "--max-surge",
            &surge,
            "--max-unavailable",
            &unavailable,
            "--replacement-method",
            "substitute",
        ])
        .await?;
    Ok(())
}

/// Delete template generations other than the current one. A generation
/// still referenced by instances mid-rollout fails to delete; it is kept and
/// picked up by the next apply.
pub async fn gc_templates(gcloud: &GcloudClient, current_template: &str) -> Result<()> {
    let current = resource_name(current_template);
    let base = match current.rsplit_once('-') {
        Some((base, _)) => base,
        None => return Ok(()),
    };

    let filter = format!("name ~ ^{}", base);
    let listed = gcloud
        .run_json(&["compute", "instance-templates", "list", "--filter", &filter])
        .await?;
    let items = match listed.as_array() {
        Some(items) => items,
        None => return Ok(()),
    };

    for item in items {
        let name = match field_str(item, "name") {
            Some(name) => name,
            None => continue,
        };
        if name == current {
            continue;
        }
        match gcloud
            .run(&["compute", "instance-templates", "delete", &name])
            .await
        {
            Ok(_) => info!("✓ Stale template {} removed", name),
            Err(e) => warn!("Stale template {} still in use, keeping: {}", name, e),
        }
    }
    Ok(())
}

pub async fn delete_instance_group(gcloud: &GcloudClient, region: &str, name: &str) -> Result<()> {
    absent_ok(
        gcloud
            .run(&[
                "compute",
                "instance-groups",
                "managed",
                "delete",
                name,
                "--region",
                region,
            ])
            .await,
    )?;
    info!("✓ Instance group {} removed", name);
    Ok(())
}

/// Remove every generation sharing the template's base name.
pub async fn delete_instance_templates(gcloud: &GcloudClient, name: &str) -> Result<()> {
    let base = name.rsplit_once('-').map(|(b, _)| b).unwrap_or(name);
    let filter = format!("name ~ ^{}", base);
    let listed = gcloud
        .run_json(&["compute", "instance-templates", "list", "--filter", &filter])
        .await?;

    if let Some(items) = listed.as_array() {
        for item in items {
            if let Some(n) = field_str(item, "name") {
                absent_ok(
                    gcloud
                        .run(&["compute", "instance-templates", "delete", &n])
                        .await,
                )?;
                info!("✓ Instance template {} removed", n);
            }
        }
    }
    Ok(())
}
