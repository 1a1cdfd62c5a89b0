//! Resource families
//!
//! Each file in this module owns one family of Google Cloud resources: pure
//! node assemblers describing desired state, and the ensure/delete functions
//! the provisioner dispatches into. Ensure functions converge toward the
//! node, so re-running an apply is always safe.

pub mod autoscaler;
pub mod ci;
pub mod fleet;
pub mod iam;
pub mod loadbalancer;
pub mod network;
pub mod plan;
pub mod scripts;
pub mod secrets;
pub mod storage;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::DeploymentConfig;
use crate::error::GcloudError;
use crate::graph::{
    OutputStore, ResourceNode, ResourceOutputs, ResourceProvisioner, ResourceSpec,
};
use crate::infrastructure::GcloudClient;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Executes graph nodes against Google Cloud through the gcloud CLI.
///
/// Output references are resolved here, at the dispatch boundary, so the
/// family functions only ever see plain strings.
pub struct GcpProvisioner {
    gcloud: GcloudClient,
    region: String,
    zone: String,
}

impl GcpProvisioner {
    pub fn new(gcloud: GcloudClient, config: &DeploymentConfig) -> Self {
        Self {
            gcloud,
            region: config.region.clone(),
            zone: config.ci_zone(),
        }
    }
}

#[async_trait]
impl ResourceProvisioner for GcpProvisioner {
    async fn apply(&self, node: &ResourceNode, outputs: &OutputStore) -> Result<ResourceOutputs> {
        match &node.spec {
            ResourceSpec::Bucket { location } => {
                storage::ensure_bucket(&self.gcloud, &node.name, location).await
            }
            ResourceSpec::Secret => secrets::ensure_secret(&self.gcloud, &node.name).await,
            ResourceSpec::SecretVersion { secret, value_env } => {
                let secret_name = outputs.resolve(secret)?;
                secrets::ensure_secret_version(&self.gcloud, &secret_name, value_env).await
            }
            ResourceSpec::ServiceAccount {
                account_id,
                display_name,
            } => iam::ensure_service_account(&self.gcloud, account_id, display_name).await,
            ResourceSpec::IamBinding { member, role, .. } => {
                let email = outputs.resolve(member)?;
                iam::ensure_binding(&self.gcloud, &email, role).await
            }
            ResourceSpec::Network { auto_subnets } => {
                network::ensure_network(&self.gcloud, &node.name, *auto_subnets).await
            }
            ResourceSpec::Firewall {
                network,
                allowed,
                source_ranges,
                target_tags,
            } => {
                let net = match network {
                    Some(reference) => Some(outputs.resolve(reference)?),
                    None => None,
                };
                network::ensure_firewall(
                    &self.gcloud,
                    &node.name,
                    net.as_deref(),
                    allowed,
                    source_ranges,
                    target_tags,
                )
                .await
            }
            ResourceSpec::Address { global } => {
                loadbalancer::ensure_address(&self.gcloud, &self.region, &node.name, *global).await
            }
            ResourceSpec::HealthCheck { path, port } => {
                loadbalancer::ensure_health_check(&self.gcloud, &node.name, path, *port).await
            }
            ResourceSpec::InstanceTemplate {
                machine_type,
                image_family,
                image_project,
                tags,
                service_account,
                scopes,
                startup_script,
            } => {
                let email = outputs.resolve(service_account)?;
                fleet::ensure_instance_template(
                    &self.gcloud,
                    &node.name,
                    machine_type,
                    image_family,
                    image_project,
                    tags,
                    &email,
                    scopes,
                    startup_script,
                )
                .await
            }
            ResourceSpec::InstanceGroup {
                template,
                target_size,
                base_instance_name,
                named_port,
                update_policy,
            } => {
                let template_link = outputs.resolve(template)?;
                fleet::ensure_instance_group(
                    &self.gcloud,
                    &self.region,
                    &node.name,
                    &template_link,
                    *target_size,
                    base_instance_name,
                    named_port,
                    update_policy,
                )
                .await
            }
            ResourceSpec::Autoscaler {
                group,
                min_replicas,
                max_replicas,
                cpu_target,
            } => {
                let group_name = outputs.resolve(group)?;
                autoscaler::ensure_autoscaler(
                    &self.gcloud,
                    &self.region,
                    &node.name,
                    &group_name,
                    *min_replicas,
                    *max_replicas,
                    *cpu_target,
                )
                .await
            }
            ResourceSpec::BackendService {
                port_name,
                health_check,
                group,
            } => {
                let check_link = outputs.resolve(health_check)?;
                let group_name = outputs.resolve(group)?;
                loadbalancer::ensure_backend_service(
                    &self.gcloud,
                    &self.region,
                    &node.name,
                    port_name,
                    &check_link,
                    &group_name,
                )
                .await
            }
            ResourceSpec::UrlMap { default_service } => {
                let service = outputs.resolve(default_service)?;
                loadbalancer::ensure_url_map(&self.gcloud, &node.name, &service).await
            }
            ResourceSpec::TargetHttpProxy { url_map } => {
                let map = outputs.resolve(url_map)?;
                loadbalancer::ensure_target_proxy(&self.gcloud, &node.name, &map).await
            }
            ResourceSpec::ForwardingRule {
                target,
                address,
                port_range,
            } => {
                let proxy = outputs.resolve(target)?;
                let address_name = outputs.resolve(address)?;
                loadbalancer::ensure_forwarding_rule(
                    &self.gcloud,
                    &node.name,
                    &proxy,
                    &address_name,
                    port_range,
                )
                .await
            }
            ResourceSpec::Instance {
                machine_type,
                image_family,
                image_project,
                network,
                tags,
                service_account,
                scopes,
                startup_script,
            } => {
                let email = outputs.resolve(service_account)?;
                let net = match network {
                    Some(reference) => Some(outputs.resolve(reference)?),
                    None => None,
                };
                ci::ensure_instance(
                    &self.gcloud,
                    &self.zone,
                    &node.name,
                    machine_type,
                    image_family,
                    image_project,
                    net.as_deref(),
                    tags,
                    &email,
                    scopes,
                    startup_script,
                )
                .await
            }
        }
    }

    async fn destroy(&self, node: &ResourceNode) -> Result<()> {
        match &node.spec {
            ResourceSpec::Bucket { .. } => storage::delete_bucket(&self.gcloud, &node.name).await,
            ResourceSpec::Secret => secrets::delete_secret(&self.gcloud, &node.name).await,
            ResourceSpec::SecretVersion { .. } => secrets::delete_secret_version(&node.name).await,
            ResourceSpec::ServiceAccount { account_id, .. } => {
                iam::delete_service_account(&self.gcloud, account_id).await
            }
            ResourceSpec::IamBinding {
                account_id, role, ..
            } => iam::delete_binding(&self.gcloud, account_id, role).await,
            ResourceSpec::Network { .. } => network::delete_network(&self.gcloud, &node.name).await,
            ResourceSpec::Firewall { .. } => {
                network::delete_firewall(&self.gcloud, &node.name).await
            }
            ResourceSpec::Address { global } => {
                loadbalancer::delete_address(&self.gcloud, &self.region, &node.name, *global).await
            }
            ResourceSpec::HealthCheck { .. } => {
                loadbalancer::delete_health_check(&self.gcloud, &node.name).await
            }
            ResourceSpec::InstanceTemplate { .. } => {
                fleet::delete_instance_templates(&self.gcloud, &node.name).await
            }
            ResourceSpec::InstanceGroup { .. } => {
                fleet::delete_instance_group(&self.gcloud, &self.region, &node.name).await
            }
            ResourceSpec::Autoscaler { .. } => autoscaler::delete_autoscaler(&node.name).await,
            ResourceSpec::BackendService { .. } => {
                loadbalancer::delete_backend_service(&self.gcloud, &node.name).await
            }
            ResourceSpec::UrlMap { .. } => {
                loadbalancer::delete_url_map(&self.gcloud, &node.name).await
            }
            ResourceSpec::TargetHttpProxy { .. } => {
                loadbalancer::delete_target_proxy(&self.gcloud, &node.name).await
            }
            ResourceSpec::ForwardingRule { .. } => {
                loadbalancer::delete_forwarding_rule(&self.gcloud, &node.name).await
            }
            ResourceSpec::Instance { .. } => {
                ci::delete_instance(&self.gcloud, &self.zone, &node.name).await
            }
        }
    }
}

/// Treat "already gone" as success so destroy stays re-runnable.
pub(crate) fn absent_ok(result: Result<String, GcloudError>) -> Result<(), GcloudError> {
    match result {
        Ok(_) => Ok(()),
        Err(GcloudError::CommandFailed { ref stderr, .. })
            if stderr.contains("not found")
                || stderr.contains("NOT_FOUND")
                || stderr.contains("does not exist") =>
        {
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub(crate) fn field_str(value: &serde_json::Value, field: &str) -> Option<String> {
    value[field].as_str().map(|s| s.to_string())
}

/// Trailing segment of a resource URL, or the input when it has no path.
/// Self links for the same resource can differ in host prefix, so identity
/// comparisons go through this.
pub(crate) fn resource_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_ok_swallows_missing_resources() {
        let gone = Err(GcloudError::CommandFailed {
            command: "compute networks delete demo".to_string(),
            stderr: "ERROR: The resource 'demo' was not found".to_string(),
        });
        assert!(absent_ok(gone).is_ok());

        let denied = Err(GcloudError::CommandFailed {
            command: "compute networks delete demo".to_string(),
            stderr: "ERROR: Permission denied on resource 'demo'".to_string(),
        });
        assert!(absent_ok(denied).is_err());

        assert!(absent_ok(Ok(String::new())).is_ok());
    }

    #[test]
    fn test_resource_name_strips_url_prefix() {
        assert_eq!(
            resource_name(
                "https://www.googleapis.com/compute/v1/projects/acme/global/networks/ci-net"
            ),
            "ci-net"
        );
        assert_eq!(resource_name("plain-name"), "plain-name");
    }

    #[test]
    fn test_field_str_reads_top_level_strings() {
        let value = serde_json::json!({"selfLink": "https://example/x", "size": 3});
        assert_eq!(field_str(&value, "selfLink"), Some("https://example/x".to_string()));
        assert_eq!(field_str(&value, "size"), None);
        assert_eq!(field_str(&value, "missing"), None);
    }
}
