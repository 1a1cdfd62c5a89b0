//! Full deployment graph assembly
//!
//! One place collects every resource family into the validated graph the
//! commands execute. Role constants exist for the handful of nodes whose
//! outputs the commands read back after an apply.

use crate::config::DeploymentConfig;
use crate::error::DeployError;
use crate::graph::ResourceGraph;
use crate::naming::ResourceNamer;
use crate::resources::{autoscaler, ci, fleet, iam, loadbalancer, network, secrets, storage};

pub const ROLE_WEB_TEMPLATE: &str = "web-template";
pub const ROLE_WEB_GROUP: &str = "web-group";
pub const ROLE_WEB_AUTOSCALER: &str = "web-autoscaler";
pub const ROLE_LB_ADDRESS: &str = "lb-address";
pub const ROLE_FORWARDING_RULE: &str = "lb-forwarding-rule";
pub const ROLE_CI_NODE: &str = "ci-node";
pub const ROLE_ASSETS_BUCKET: &str = "assets-bucket";

/// Every resource in the deployment, validated and ordered.
pub fn deployment_graph(config: &DeploymentConfig) -> Result<ResourceGraph, DeployError> {
    let namer = ResourceNamer::new(&config.project, &config.stack);

    let mut nodes = Vec::new();
    nodes.extend(iam::identity_nodes(&namer));
    nodes.extend(secrets::secret_nodes(config, &namer));
    nodes.push(storage::bucket_node(config, &namer));
    nodes.extend(network::network_nodes(config, &namer));
    nodes.extend(fleet::fleet_nodes(config, &namer)?);
    nodes.push(autoscaler::autoscaler_node(config, &namer));
    nodes.extend(loadbalancer::loadbalancer_nodes(config, &namer));
    nodes.push(ci::ci_node(config, &namer)?);

    Ok(ResourceGraph::new(nodes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ResourceNode, ResourceSpec};

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

    fn wave_of(waves: &[Vec<&ResourceNode>], role: &str) -> usize {
        waves
            .iter()
            .position(|wave| wave.iter().any(|n| n.role == role))
            .unwrap_or_else(|| panic!("role {role} not in any wave"))
    }

    #[test]
    fn test_full_graph_validates_with_expected_inventory() {
        let graph = deployment_graph(&test_config()).unwrap();
        assert_eq!(graph.len(), 26);

        for role in [
            ROLE_WEB_TEMPLATE,
            ROLE_WEB_GROUP,
            ROLE_WEB_AUTOSCALER,
            ROLE_LB_ADDRESS,
            ROLE_FORWARDING_RULE,
            ROLE_CI_NODE,
            ROLE_ASSETS_BUCKET,
        ] {
            assert!(graph.get(role).is_some(), "missing {role}");
        }
    }

    #[test]
    fn test_wave_order_builds_serving_chain_bottom_up() {
        let graph = deployment_graph(&test_config()).unwrap();
        let waves = graph.waves();

        assert!(wave_of(&waves, "fleet-sa") < wave_of(&waves, ROLE_WEB_TEMPLATE));
        assert!(wave_of(&waves, "github-token-version") < wave_of(&waves, ROLE_WEB_TEMPLATE));
        assert!(wave_of(&waves, ROLE_WEB_TEMPLATE) < wave_of(&waves, ROLE_WEB_GROUP));
        assert!(wave_of(&waves, ROLE_WEB_GROUP) < wave_of(&waves, ROLE_WEB_AUTOSCALER));
        assert!(wave_of(&waves, ROLE_WEB_GROUP) < wave_of(&waves, "lb-backend"));
        assert!(wave_of(&waves, "lb-health-check") < wave_of(&waves, "lb-backend"));
        assert!(wave_of(&waves, "lb-backend") < wave_of(&waves, "lb-url-map"));
        assert!(wave_of(&waves, "lb-url-map") < wave_of(&waves, "lb-proxy"));
        assert!(wave_of(&waves, "lb-proxy") < wave_of(&waves, ROLE_FORWARDING_RULE));
        assert!(wave_of(&waves, ROLE_LB_ADDRESS) < wave_of(&waves, ROLE_FORWARDING_RULE));
        assert!(wave_of(&waves, "ci-network") < wave_of(&waves, "ci-firewall"));
        assert!(wave_of(&waves, "ci-firewall") < wave_of(&waves, ROLE_CI_NODE));
        assert!(wave_of(&waves, ROLE_ASSETS_BUCKET) < wave_of(&waves, ROLE_CI_NODE));
    }

    #[test]
    fn test_named_port_shared_between_group_and_backend() {
        let graph = deployment_graph(&test_config()).unwrap();

        let group_port = match &graph.get(ROLE_WEB_GROUP).unwrap().spec {
            ResourceSpec::InstanceGroup { named_port, .. } => named_port.name.clone(),
            other => panic!("unexpected spec: {other:?}"),
        };
        let backend_port = match &graph.get("lb-backend").unwrap().spec {
            ResourceSpec::BackendService { port_name, .. } => port_name.clone(),
            other => panic!("unexpected spec: {other:?}"),
        };
        assert_eq!(group_port, backend_port);
        assert_eq!(group_port, "http-8080");
    }

    #[test]
    fn test_defaults_shape_the_graph() {
        let graph = deployment_graph(&test_config()).unwrap();

        match &graph.get(ROLE_WEB_AUTOSCALER).unwrap().spec {
            ResourceSpec::Autoscaler {
                min_replicas,
                max_replicas,
                cpu_target,
                ..
            } => {
                assert_eq!(*min_replicas, 2);
                assert_eq!(*max_replicas, 3);
                assert!((cpu_target - 0.6).abs() < f64::EPSILON);
            }
            other => panic!("unexpected spec: {other:?}"),
        }
        match &graph.get(ROLE_WEB_GROUP).unwrap().spec {
            ResourceSpec::InstanceGroup { target_size, .. } => assert_eq!(*target_size, 3),
            other => panic!("unexpected spec: {other:?}"),
        }
        match &graph.get(ROLE_FORWARDING_RULE).unwrap().spec {
            ResourceSpec::ForwardingRule { port_range, .. } => assert_eq!(port_range, "80"),
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn test_secret_values_stay_out_of_node_material() {
        std::env::set_var("GITHUB_TOKEN", "sentinel-gh-4f2a");
        std::env::set_var("JENKINS_PASSWORD", "sentinel-pw-9c1d");

        let graph = deployment_graph(&test_config()).unwrap();
        for node in graph.nodes() {
            assert!(!node.name.contains("sentinel"));
            match &node.spec {
                ResourceSpec::InstanceTemplate { startup_script, .. }
                | ResourceSpec::Instance { startup_script, .. } => {
                    assert!(!startup_script.contains("sentinel-gh-4f2a"));
                    assert!(!startup_script.contains("sentinel-pw-9c1d"));
                }
                ResourceSpec::SecretVersion { value_env, .. } => {
                    assert!(value_env == "GITHUB_TOKEN" || value_env == "JENKINS_PASSWORD");
                }
                _ => {}
            }
        }
    }
}
