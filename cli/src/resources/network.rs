//! Networks and firewall rules
//!
//! The fleet lives on the project default network; the CI node gets its own
//! auto-subnet network so Jenkins traffic never shares rules with the
//! application. All rules are tag-scoped.

use anyhow::Result;
use tracing::info;

use crate::config::DeploymentConfig;
use crate::graph::{
    FirewallAllow, OutputField, OutputRef, ResourceNode, ResourceOutputs, ResourceSpec,
};
use crate::infrastructure::GcloudClient;
use crate::naming::ResourceNamer;
use crate::resources::{absent_ok, field_str};

/// Tag carried by every fleet instance.
pub const FLEET_TAG: &str = "web";
/// Tag carried by the CI node.
pub const CI_TAG: &str = "jenkins";

/// Source ranges of Google front ends and health checkers.
const LB_SOURCE_RANGES: [&str; 2] = ["130.211.0.0/22", "35.191.0.0/16"];

pub fn network_nodes(config: &DeploymentConfig, namer: &ResourceNamer) -> Vec<ResourceNode> {
    let app_port = config.app.port.to_string();
    let ci_port = config.ci.port.to_string();

    vec![
        ResourceNode::new(
            "public-http-firewall",
            namer.name("allow-http"),
            ResourceSpec::Firewall {
                network: None,
                allowed: vec![FirewallAllow::tcp(&["80"])],
                source_ranges: vec!["0.0.0.0/0".to_string()],
                target_tags: vec![FLEET_TAG.to_string()],
            },
        ),
        ResourceNode::new(
            "lb-to-fleet-firewall",
            namer.name("allow-lb"),
            ResourceSpec::Firewall {
                network: None,
                allowed: vec![FirewallAllow::tcp(&[&app_port])],
                source_ranges: LB_SOURCE_RANGES.iter().map(|r| r.to_string()).collect(),
                target_tags: vec![FLEET_TAG.to_string()],
            },
        ),
        ResourceNode::new(
            "ci-network",
            namer.name("ci-net"),
            ResourceSpec::Network { auto_subnets: true },
        ),
        ResourceNode::new(
            "ci-firewall",
            namer.name("allow-jenkins"),
            ResourceSpec::Firewall {
                network: Some(OutputRef::self_link("ci-network")),
                allowed: vec![FirewallAllow::tcp(&["22", &ci_port])],
                source_ranges: vec!["0.0.0.0/0".to_string()],
                target_tags: vec![CI_TAG.to_string()],
            },
        )
        .needs(&["ci-network"]),
    ]
}

pub async fn ensure_network(
    gcloud: &GcloudClient,
    name: &str,
    auto_subnets: bool,
) -> Result<ResourceOutputs> {
    let existing = gcloud
        .try_describe(&["compute", "networks", "describe", name])
        .await?;
    if existing.is_some() {
        info!("✓ Network {} exists (idempotent, skipping)", name);
    } else {
        let mode = if auto_subnets { "auto" } else { "custom" };
        gcloud
            .run(&["compute", "networks", "create", name, "--subnet-mode", mode])
            .await?;
        info!("✓ Network {} created ({} subnets)", name, mode);
    }

    let described = gcloud
        .run_json(&["compute", "networks", "describe", name])
        .await?;
    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    if let Some(link) = field_str(&described, "selfLink") {
        outputs.set(OutputField::SelfLink, link);
    }
    Ok(outputs)
}

pub async fn ensure_firewall(
    gcloud: &GcloudClient,
    name: &str,
    network: Option<&str>,
    allowed: &[FirewallAllow],
    source_ranges: &[String],
    target_tags: &[String],
) -> Result<ResourceOutputs> {
    let allow = allow_flag(allowed);
    let sources = source_ranges.join(",");
    let tags = target_tags.join(",");

    let existing = gcloud
        .try_describe(&["compute", "firewall-rules", "describe", name])
        .await?;
    if existing.is_some() {
        let mut args = vec![
            "compute",
            "firewall-rules",
            "update",
            name,
            "--allow",
            &allow,
            "--source-ranges",
            &sources,
        ];
        if !tags.is_empty() {
            args.push("--target-tags");
            args.push(&tags);
        }
        gcloud.run(&args).await?;
        info!("✓ Firewall {} converged (idempotent)", name);
    } else {
        let mut args = vec![
            "compute",
            "firewall-rules",
            "create",
            name,
            "--direction",
            "INGRESS",
            "--allow",
            &allow,
            "--source-ranges",
            &sources,
        ];
        if let Some(network) = network {
            args.push("--network");
            args.push(network);
        }
        if !tags.is_empty() {
            args.push("--target-tags");
            args.push(&tags);
        }
        gcloud.run(&args).await?;
        info!("✓ Firewall {} created (allow {})", name, allow);
    }

    let described = gcloud
        .run_json(&["compute", "firewall-rules", "describe", name])
        .await?;
    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    if let Some(link) = field_str(&described, "selfLink") {
        outputs.set(OutputField::SelfLink, link);
    }
    Ok(outputs)
}

pub async fn delete_firewall(gcloud: &GcloudClient, name: &str) -> Result<()> {
    absent_ok(
        gcloud
            .run(&["compute", "firewall-rules", "delete", name])
            .await,
    )?;
    info!("✓ Firewall {} removed", name);
    Ok(())
}

pub async fn delete_network(gcloud: &GcloudClient, name: &str) -> Result<()> {
    absent_ok(gcloud.run(&["compute", "networks", "delete", name]).await)?;
    info!("✓ Network {} removed", name);
    Ok(())
}

/// `tcp:80,tcp:8080` form for `--allow`.
fn allow_flag(allowed: &[FirewallAllow]) -> String {
    allowed
        .iter()
        .flat_map(|a| {
            if a.ports.is_empty() {
                vec![a.protocol.clone()]
            } else {
                a.ports
                    .iter()
                    .map(|p| format!("{}:{}", a.protocol, p))
                    .collect()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DeploymentConfig {
        serde_yaml::from_str(
            r#"
project: acme
stack: dev
repositories:
  - owner: acme
    name: storefront
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_allow_flag_forms() {
        assert_eq!(allow_flag(&[FirewallAllow::tcp(&["80"])]), "tcp:80");
        assert_eq!(
            allow_flag(&[FirewallAllow::tcp(&["22", "8080"])]),
            "tcp:22,tcp:8080"
        );
        let icmp = FirewallAllow {
            protocol: "icmp".to_string(),
            ports: vec![],
        };
        assert_eq!(allow_flag(&[icmp, FirewallAllow::tcp(&["80"])]), "icmp,tcp:80");
    }

    #[test]
    fn test_fleet_rules_stay_on_default_network() {
        let config = test_config();
        let namer = ResourceNamer::new(&config.project, &config.stack);
        let nodes = network_nodes(&config, &namer);

        for role in ["public-http-firewall", "lb-to-fleet-firewall"] {
            let node = nodes.iter().find(|n| n.role == role).unwrap();
            match &node.spec {
                ResourceSpec::Firewall { network, target_tags, .. } => {
                    assert!(network.is_none());
                    assert_eq!(target_tags, &vec![FLEET_TAG.to_string()]);
                }
                other => panic!("unexpected spec: {other:?}"),
            }
        }
    }

    #[test]
    fn test_lb_rule_opens_app_port_to_google_ranges() {
        let config = test_config();
        let namer = ResourceNamer::new(&config.project, &config.stack);
        let nodes = network_nodes(&config, &namer);

        let node = nodes.iter().find(|n| n.role == "lb-to-fleet-firewall").unwrap();
        match &node.spec {
            ResourceSpec::Firewall { allowed, source_ranges, .. } => {
                assert_eq!(allowed[0].ports, vec!["8080"]);
                assert_eq!(source_ranges.len(), 2);
                assert!(source_ranges.contains(&"130.211.0.0/22".to_string()));
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn test_ci_firewall_rides_ci_network() {
        let config = test_config();
        let namer = ResourceNamer::new(&config.project, &config.stack);
        let nodes = network_nodes(&config, &namer);

        let node = nodes.iter().find(|n| n.role == "ci-firewall").unwrap();
        assert_eq!(node.depends_on, vec!["ci-network"]);
        match &node.spec {
            ResourceSpec::Firewall { network, allowed, target_tags, .. } => {
                assert_eq!(network.as_ref().unwrap().role, "ci-network");
                assert_eq!(allowed[0].ports, vec!["22", "8080"]);
                assert_eq!(target_tags, &vec![CI_TAG.to_string()]);
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }
}
