//! Global external HTTP load balancer chain
//!
//! Six resources front the fleet: a reserved global address, an HTTP health
//! check, a backend service attached to the instance group, a URL map, a
//! target HTTP proxy, and the port 80 forwarding rule that ties the address
//! to the proxy. Traffic reaches instances on the group's named port, which
//! the backend service references by name.

use anyhow::Result;
use tracing::info;

use crate::config::DeploymentConfig;
use crate::graph::{OutputField, OutputRef, ResourceNode, ResourceOutputs, ResourceSpec};
use crate::infrastructure::GcloudClient;
use crate::naming::{NamedPort, ResourceNamer};
use crate::resources::{absent_ok, field_str, resource_name};

pub fn loadbalancer_nodes(config: &DeploymentConfig, namer: &ResourceNamer) -> Vec<ResourceNode> {
    let named_port = NamedPort::http(config.app.port);

    vec![
        ResourceNode::new(
            "lb-address",
            namer.name("lb-ip"),
            ResourceSpec::Address { global: true },
        ),
        ResourceNode::new(
            "lb-health-check",
            namer.name("lb-health-check"),
            ResourceSpec::HealthCheck {
                path: config.app.health_path.clone(),
                port: config.app.port,
            },
        ),
        ResourceNode::new(
            "lb-backend",
            namer.name("lb-backend"),
            ResourceSpec::BackendService {
                port_name: named_port.name.clone(),
                health_check: OutputRef::self_link("lb-health-check"),
                group: OutputRef::name("web-group"),
            },
        )
        .needs(&["lb-health-check", "web-group"]),
        ResourceNode::new(
            "lb-url-map",
            namer.name("lb-url-map"),
            ResourceSpec::UrlMap {
                default_service: OutputRef::self_link("lb-backend"),
            },
        )
        .needs(&["lb-backend"]),
        ResourceNode::new(
            "lb-proxy",
            namer.name("lb-proxy"),
            ResourceSpec::TargetHttpProxy {
                url_map: OutputRef::self_link("lb-url-map"),
            },
        )
        .needs(&["lb-url-map"]),
        ResourceNode::new(
            "lb-forwarding-rule",
            namer.name("lb-forwarding-rule"),
            ResourceSpec::ForwardingRule {
                target: OutputRef::self_link("lb-proxy"),
                address: OutputRef::name("lb-address"),
                port_range: "80".to_string(),
            },
        )
        .needs(&["lb-proxy", "lb-address"]),
    ]
}

pub async fn ensure_address(
    gcloud: &GcloudClient,
    region: &str,
    name: &str,
    global: bool,
) -> Result<ResourceOutputs> {
    let scope_args: Vec<&str> = if global {
        vec!["--global"]
    } else {
        vec!["--region", region]
    };

    let mut describe = vec!["compute", "addresses", "describe", name];
    describe.extend(&scope_args);
    if gcloud.try_describe(&describe).await?.is_some() {
        info!("✓ Address {} exists (idempotent, skipping)", name);
    } else {
        let mut create = vec!["compute", "addresses", "create", name];
        create.extend(&scope_args);
        gcloud.run(&create).await?;
        info!("✓ Address {} reserved", name);
    }

    let described = gcloud.run_json(&describe).await?;
    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    if let Some(ip) = field_str(&described, "address") {
        outputs.set(OutputField::Address, ip);
    }
    if let Some(link) = field_str(&described, "selfLink") {
        outputs.set(OutputField::SelfLink, link);
    }
    Ok(outputs)
}

pub async fn ensure_health_check(
    gcloud: &GcloudClient,
    name: &str,
    path: &str,
    port: u16,
) -> Result<ResourceOutputs> {
    let port_flag = port.to_string();
    let exists = gcloud
        .try_describe(&["compute", "health-checks", "describe", name, "--global"])
        .await?
        .is_some();

    let action = if exists { "update" } else { "create" };
    gcloud
        .run(&[
            "compute",
            "health-checks",
            action,
            "http",
            name,
            "--global",
            "--request-path",
            path,
            "--port",
            &port_flag,
        ])
        .await?;
    info!("✓ Health check {} probes {}:{}", name, path, port_flag);

    let described = gcloud
        .run_json(&["compute", "health-checks", "describe", name, "--global"])
        .await?;
    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    if let Some(link) = field_str(&described, "selfLink") {
        outputs.set(OutputField::SelfLink, link);
    }
    Ok(outputs)
}

pub async fn ensure_backend_service(
    gcloud: &GcloudClient,
    region: &str,
    name: &str,
    port_name: &str,
    health_check: &str,
    group: &str,
) -> Result<ResourceOutputs> {
    let exists = gcloud
        .try_describe(&["compute", "backend-services", "describe", name, "--global"])
        .await?;

    match exists {
        None => {
            gcloud
                .run(&[
                    "compute",
                    "backend-services",
                    "create",
                    name,
                    "--global",
                    "--protocol",
                    "HTTP",
                    "--port-name",
                    port_name,
                    "--health-checks",
                    health_check,
                    "--load-balancing-scheme",
                    "EXTERNAL",
                ])
                .await?;
            info!("✓ Backend service {} created", name);
        }
        Some(_) => {
            gcloud
                .run(&[
                    "compute",
                    "backend-services",
                    "update",
                    name,
                    "--global",
                    "--port-name",
                    port_name,
                    "--health-checks",
                    health_check,
                ])
                .await?;
            info!("✓ Backend service {} updated (idempotent)", name);
        }
    }

    let described = gcloud
        .run_json(&["compute", "backend-services", "describe", name, "--global"])
        .await?;
    if backend_attached(&described, group) {
        info!("✓ Backend {} already attached (idempotent, skipping)", group);
    } else {
        gcloud
            .run(&[
                "compute",
                "backend-services",
                "add-backend",
                name,
                "--global",
                "--instance-group",
                group,
                "--instance-group-region",
                region,
            ])
            .await?;
        info!("✓ Instance group {} attached to {}", group, name);
    }

    let described = gcloud
        .run_json(&["compute", "backend-services", "describe", name, "--global"])
        .await?;
    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    if let Some(link) = field_str(&described, "selfLink") {
        outputs.set(OutputField::SelfLink, link);
    }
    Ok(outputs)
}

fn backend_attached(described: &serde_json::Value, group: &str) -> bool {
    described["backends"]
        .as_array()
        .map(|backends| {
            backends.iter().any(|backend| {
                field_str(backend, "group")
                    .map(|g| resource_name(&g) == resource_name(group))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

pub async fn ensure_url_map(
    gcloud: &GcloudClient,
    name: &str,
    default_service: &str,
) -> Result<ResourceOutputs> {
    let exists = gcloud
        .try_describe(&["compute", "url-maps", "describe", name, "--global"])
        .await?
        .is_some();

    if exists {
        gcloud
            .run(&[
                "compute",
                "url-maps",
                "set-default-service",
                name,
                "--global",
                "--default-service",
                default_service,
            ])
            .await?;
        info!("✓ URL map {} default service updated (idempotent)", name);
    } else {
        gcloud
            .run(&[
                "compute",
                "url-maps",
                "create",
                name,
                "--global",
                "--default-service",
                default_service,
            ])
            .await?;
        info!("✓ URL map {} created", name);
    }

    let described = gcloud
        .run_json(&["compute", "url-maps", "describe", name, "--global"])
        .await?;
    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    if let Some(link) = field_str(&described, "selfLink") {
        outputs.set(OutputField::SelfLink, link);
    }
    Ok(outputs)
}

pub async fn ensure_target_proxy(
    gcloud: &GcloudClient,
    name: &str,
    url_map: &str,
) -> Result<ResourceOutputs> {
    let exists = gcloud
        .try_describe(&["compute", "target-http-proxies", "describe", name, "--global"])
        .await?
        .is_some();

    let action = if exists { "update" } else { "create" };
    gcloud
        .run(&[
            "compute",
            "target-http-proxies",
            action,
            name,
            "--global",
            "--url-map",
            url_map,
        ])
        .await?;
    info!("✓ Target HTTP proxy {} {}d", name, action);

    let described = gcloud
        .run_json(&["compute", "target-http-proxies", "describe", name, "--global"])
        .await?;
    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    if let Some(link) = field_str(&described, "selfLink") {
        outputs.set(OutputField::SelfLink, link);
    }
    Ok(outputs)
}

pub async fn ensure_forwarding_rule(
    gcloud: &GcloudClient,
    name: &str,
    target: &str,
    address: &str,
    port_range: &str,
) -> Result<ResourceOutputs> {
    let exists = gcloud
        .try_describe(&["compute", "forwarding-rules", "describe", name, "--global"])
        .await?
        .is_some();

    if exists {
        gcloud
            .run(&[
                "compute",
                "forwarding-rules",
                "set-target",
                name,
                "--global",
                "--target-http-proxy",
                target,
            ])
            .await?;
        info!("✓ Forwarding rule {} retargeted (idempotent)", name);
    } else {
        gcloud
            .run(&[
                "compute",
                "forwarding-rules",
                "create",
                name,
                "--global",
                "--target-http-proxy",
                target,
                "--address",
                address,
                "--ports",
                port_range,
            ])
            .await?;
        info!("✓ Forwarding rule {} listening on port {}", name, port_range);
    }

    let described = gcloud
        .run_json(&["compute", "forwarding-rules", "describe", name, "--global"])
        .await?;
    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    if let Some(ip) = field_str(&described, "IPAddress") {
        outputs.set(OutputField::Address, ip);
    }
    if let Some(link) = field_str(&described, "selfLink") {
        outputs.set(OutputField::SelfLink, link);
    }
    Ok(outputs)
}

pub async fn delete_forwarding_rule(gcloud: &GcloudClient, name: &str) -> Result<()> {
    absent_ok(
        gcloud
            .run(&["compute", "forwarding-rules", "delete", name, "--global"])
            .await,
    )?;
    info!("✓ Forwarding rule {} removed", name);
    Ok(())
}

pub async fn delete_target_proxy(gcloud: &GcloudClient, name: &str) -> Result<()> {
    absent_ok(
        gcloud
            .run(&["compute", "target-http-proxies", "delete", name, "--global"])
            .await,
    )?;
    info!("✓ Target HTTP proxy {} removed", name);
    Ok(())
}

pub async fn delete_url_map(gcloud: &GcloudClient, name: &str) -> Result<()> {
    absent_ok(
        gcloud
            .run(&["compute", "url-maps", "delete", name, "--global"])
            .await,
    )?;
    info!("✓ URL map {} removed", name);
    Ok(())
}

pub async fn delete_backend_service(gcloud: &GcloudClient, name: &str) -> Result<()> {
    absent_ok(
        gcloud
            .run(&["compute", "backend-services", "delete", name, "--global"])
            .await,
    )?;
    info!("✓ Backend service {} removed", name);
    Ok(())
}

pub async fn delete_health_check(gcloud: &GcloudClient, name: &str) -> Result<()> {
    absent_ok(
        gcloud
            .run(&["compute", "health-checks", "delete", name, "--global"])
            .await,
    )?;
    info!("✓ Health check {} removed", name);
    Ok(())
}

pub async fn delete_address(
    gcloud: &GcloudClient,
    region: &str,
    name: &str,
    global: bool,
) -> Result<()> {
    let mut args = vec!["compute", "addresses", "delete", name];
    if global {
        args.push("--global");
    } else {
        args.push("--region");
        args.push(region);
    }
    absent_ok(gcloud.run(&args).await)?;
    info!("✓ Address {} released", name);
    Ok(())
}
