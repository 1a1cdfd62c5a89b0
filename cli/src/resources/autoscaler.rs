//! CPU-target autoscaling on the fleet's managed instance group
//!
//! `set-autoscaling` converges in place, so re-applying with new bounds
//! updates the existing policy rather than erroring.

use anyhow::Result;
use tracing::{debug, info};

use crate::config::DeploymentConfig;
use crate::graph::{OutputField, OutputRef, ResourceNode, ResourceOutputs, ResourceSpec};
use crate::infrastructure::GcloudClient;
use crate::naming::ResourceNamer;

pub fn autoscaler_node(config: &DeploymentConfig, namer: &ResourceNamer) -> ResourceNode {
    ResourceNode::new(
        "web-autoscaler",
        namer.name("web-autoscaler"),
        ResourceSpec::Autoscaler {
            group: OutputRef::name("web-group"),
            min_replicas: config.fleet.min_replicas,
            max_replicas: config.fleet.max_replicas,
            cpu_target: config.fleet.cpu_target,
        },
    )
    .needs(&["web-group"])
}

pub async fn ensure_autoscaler(
    gcloud: &GcloudClient,
    region: &str,
    name: &str,
    group: &str,
    min_replicas: u32,
    max_replicas: u32,
    cpu_target: f64,
) -> Result<ResourceOutputs> {
    let min = min_replicas.to_string();
    let max = max_replicas.to_string();
    let cpu = cpu_target.to_string();

    gcloud
        .run(&[
            "compute",
            "instance-groups",
            "managed",
            "set-autoscaling",
            group,
            "--region",
            region,
            "--min-num-replicas",
            &min,
            "--max-num-replicas",
            &max,
            "--target-cpu-utilization",
            &cpu,
        ])
        .await?;
    info!(
        "✓ Autoscaling set on {} ({}..{} instances at {} CPU)",
        group, min, max, cpu
    );

    let mut outputs = ResourceOutputs::new();
    outputs.set(OutputField::Name, name);
    Ok(outputs)
}

/// The autoscaling policy disappears with its instance group; a standalone
/// destroy has nothing to tear down.
pub async fn delete_autoscaler(name: &str) -> Result<()> {
    debug!("Autoscaler {} is removed with its instance group", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autoscaler_node_wiring() {
        let config: DeploymentConfig = serde_yaml::from_str(
            r#"
project: acme
stack: dev
repositories:
  - owner: acme
    name: storefront
"#,
        )
        .unwrap();
        let namer = ResourceNamer::new(&config.project, &config.stack);

        let node = autoscaler_node(&config, &namer);
        assert_eq!(node.role, "web-autoscaler");
        assert_eq!(node.depends_on, vec!["web-group"]);
        match &node.spec {
            ResourceSpec::Autoscaler {
                group,
                min_replicas,
                max_replicas,
                cpu_target,
            } => {
                assert_eq!(group.role, "web-group");
                assert_eq!(*min_replicas, 2);
                assert_eq!(*max_replicas, 3);
                assert!((cpu_target - 0.6).abs() < f64::EPSILON);
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }
}
