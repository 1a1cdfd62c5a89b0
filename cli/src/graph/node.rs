//! Resource graph node types
//!
//! A deployment is a set of [`ResourceNode`]s. Each node has a stable `role`
//! (its identity inside the graph), the platform `name` it provisions under,
//! the roles it depends on, and a [`ResourceSpec`] describing what to create.
//! Specs reference values produced by other nodes through [`OutputRef`], which
//! the executor resolves against completed nodes at apply time.

use crate::naming::NamedPort;

/// A field published by a provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputField {
    /// Fully qualified resource URL
    SelfLink,
    /// Service account email
    Email,
    /// Reserved IP address
    Address,
    /// Secret Manager resource id
    SecretId,
    /// Plain resource name
    Name,
}

impl OutputField {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputField::SelfLink => "self_link",
            OutputField::Email => "email",
            OutputField::Address => "address",
            OutputField::SecretId => "secret_id",
            OutputField::Name => "name",
        }
    }
}

/// Reference to an output of another node, resolved at apply time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRef {
    pub role: String,
    pub field: OutputField,
}

impl OutputRef {
    pub fn new(role: impl Into<String>, field: OutputField) -> Self {
        Self {
            role: role.into(),
            field,
        }
    }

    pub fn self_link(role: impl Into<String>) -> Self {
        Self::new(role, OutputField::SelfLink)
    }

    pub fn email(role: impl Into<String>) -> Self {
        Self::new(role, OutputField::Email)
    }

    pub fn address(role: impl Into<String>) -> Self {
        Self::new(role, OutputField::Address)
    }

    pub fn secret_id(role: impl Into<String>) -> Self {
        Self::new(role, OutputField::SecretId)
    }

    pub fn name(role: impl Into<String>) -> Self {
        Self::new(role, OutputField::Name)
    }
}

/// One protocol/port entry of a firewall rule.
#[derive(Debug, Clone)]
pub struct FirewallAllow {
    pub protocol: String,
    pub ports: Vec<String>,
}

impl FirewallAllow {
    pub fn tcp(ports: &[&str]) -> Self {
        Self {
            protocol: "tcp".to_string(),
            ports: ports.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Surge and unavailability bounds for a rolling instance group update.
#[derive(Debug, Clone, Copy)]
pub struct RollingUpdatePolicy {
    /// Extra instances allowed above target while updating
    pub max_surge: u32,
    /// Instances allowed below target while updating
    pub max_unavailable: u32,
}

impl Default for RollingUpdatePolicy {
    fn default() -> Self {
        Self {
            max_surge: 3,
            max_unavailable: 0,
        }
    }
}

impl RollingUpdatePolicy {
    /// Simulate a full rolling replacement of `target` instances and return
    /// the serving count after each step.
    ///
    /// Each iteration starts as many replacements as surge capacity allows,
    /// then retires old instances that are either covered by ready
    /// replacements or within the unavailability allowance. The sequence
    /// starts and ends at `target`; its minimum shows the worst-case serving
    /// capacity the policy permits.
    pub fn serving_counts(&self, target: u32) -> Vec<u32> {
        let mut old = target;
        let mut new_ready: u32 = 0;
        let mut counts = vec![old + new_ready];

        loop {
            let capacity = self.max_surge + (target - old);
            let batch = capacity
                .saturating_sub(new_ready)
                .min(target - new_ready);
            let covered = (old + new_ready + batch).saturating_sub(target);
            let retire = old.min(covered + self.max_unavailable);

            if batch == 0 && retire == 0 {
                break;
            }

            new_ready += batch;
            counts.push(old + new_ready);
            old -= retire;
            counts.push(old + new_ready);
        }

        counts
    }

    /// Worst-case serving count during a rolling replacement.
    pub fn minimum_serving(&self, target: u32) -> u32 {
        self.serving_counts(target)
            .into_iter()
            .min()
            .unwrap_or(target)
    }
}

/// What a node provisions. Names, regions and zones common to a deployment
/// live on the node and the provisioner, not here.
#[derive(Debug, Clone)]
pub enum ResourceSpec {
    Bucket {
        location: String,
    },
    Secret,
    SecretVersion {
        secret: OutputRef,
        /// Environment variable holding the secret value. The value itself
        /// is read at apply time and never stored in the graph.
        value_env: String,
    },
    ServiceAccount {
        account_id: String,
        display_name: String,
    },
    IamBinding {
        member: OutputRef,
        /// Kept alongside the reference so the binding can be removed
        /// without resolving outputs during destroy.
        account_id: String,
        role: String,
    },
    Network {
        auto_subnets: bool,
    },
    Firewall {
        network: Option<OutputRef>,
        allowed: Vec<FirewallAllow>,
        source_ranges: Vec<String>,
        target_tags: Vec<String>,
    },
    Address {
        global: bool,
    },
    HealthCheck {
        path: String,
        port: u16,
    },
    InstanceTemplate {
        machine_type: String,
        image_family: String,
        image_project: String,
        tags: Vec<String>,
        service_account: OutputRef,
        scopes: Vec<String>,
        startup_script: String,
    },
    InstanceGroup {
        template: OutputRef,
        target_size: u32,
        base_instance_name: String,
        named_port: NamedPort,
        update_policy: RollingUpdatePolicy,
    },
    Autoscaler {
        group: OutputRef,
        min_replicas: u32,
        max_replicas: u32,
        cpu_target: f64,
    },
    BackendService {
        port_name: String,
        health_check: OutputRef,
        group: OutputRef,
    },
    UrlMap {
        default_service: OutputRef,
    },
    TargetHttpProxy {
        url_map: OutputRef,
    },
    ForwardingRule {
        target: OutputRef,
        address: OutputRef,
        port_range: String,
    },
    Instance {
        machine_type: String,
        image_family: String,
        image_project: String,
        network: Option<OutputRef>,
        tags: Vec<String>,
        service_account: OutputRef,
        scopes: Vec<String>,
        startup_script: String,
    },
}

impl ResourceSpec {
    /// Short human-readable kind, used in plan output and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceSpec::Bucket { .. } => "bucket",
            ResourceSpec::Secret => "secret",
            ResourceSpec::SecretVersion { .. } => "secret-version",
            ResourceSpec::ServiceAccount { .. } => "service-account",
            ResourceSpec::IamBinding { .. } => "iam-binding",
            ResourceSpec::Network { .. } => "network",
            ResourceSpec::Firewall { .. } => "firewall",
            ResourceSpec::Address { .. } => "address",
            ResourceSpec::HealthCheck { .. } => "health-check",
            ResourceSpec::InstanceTemplate { .. } => "instance-template",
            ResourceSpec::InstanceGroup { .. } => "instance-group",
            ResourceSpec::Autoscaler { .. } => "autoscaler",
            ResourceSpec::BackendService { .. } => "backend-service",
            ResourceSpec::UrlMap { .. } => "url-map",
            ResourceSpec::TargetHttpProxy { .. } => "target-http-proxy",
            ResourceSpec::ForwardingRule { .. } => "forwarding-rule",
            ResourceSpec::Instance { .. } => "instance",
        }
    }
}

/// One resource in the deployment graph.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    /// Stable identity inside the graph, referenced by dependents
    pub role: String,
    /// Name the resource is provisioned under
    pub name: String,
    /// Roles that must complete before this node starts
    pub depends_on: Vec<String>,
    pub spec: ResourceSpec,
}

impl ResourceNode {
    pub fn new(role: impl Into<String>, name: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            depends_on: Vec::new(),
            spec,
        }
    }

    pub fn needs(mut self, roles: &[&str]) -> Self {
        self.depends_on = roles.iter().map(|r| r.to_string()).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_ref_helpers() {
        assert_eq!(OutputRef::email("fleet-sa").field, OutputField::Email);
        assert_eq!(OutputRef::self_link("net").role, "net");
        assert_eq!(OutputField::SecretId.as_str(), "secret_id");
    }

    #[test]
    fn test_node_needs_records_dependencies() {
        let node = ResourceNode::new("lb-proxy", "demo-proxy", ResourceSpec::Secret)
            .needs(&["lb-url-map"]);
        assert_eq!(node.depends_on, vec!["lb-url-map"]);
    }

    #[test]
    fn test_firewall_allow_tcp() {
        let allow = FirewallAllow::tcp(&["22", "8080"]);
        assert_eq!(allow.protocol, "tcp");
        assert_eq!(allow.ports, vec!["22", "8080"]);
    }

    #[test]
    fn test_rolling_update_full_surge_never_drops_below_target() {
        let policy = RollingUpdatePolicy {
            max_surge: 3,
            max_unavailable: 0,
        };
        let counts = policy.serving_counts(3);
        assert_eq!(counts.first(), Some(&3));
        assert_eq!(counts.last(), Some(&3));
        assert!(counts.iter().all(|&c| c >= 3));
        assert!(counts.contains(&6));
        assert_eq!(policy.minimum_serving(3), 3);
    }

    #[test]
    fn test_rolling_update_single_surge_replaces_one_at_a_time() {
        let policy = RollingUpdatePolicy {
            max_surge: 1,
            max_unavailable: 0,
        };
        let counts = policy.serving_counts(3);
        assert!(counts.iter().all(|&c| c >= 3));
        assert!(counts.iter().all(|&c| c <= 4));
        assert_eq!(policy.minimum_serving(3), 3);
    }

    #[test]
    fn test_rolling_update_unavailability_dips_below_target() {
        let policy = RollingUpdatePolicy {
            max_surge: 0,
            max_unavailable: 1,
        };
        assert_eq!(policy.minimum_serving(3), 2);
    }

    #[test]
    fn test_rolling_update_stuck_policy_terminates() {
        let policy = RollingUpdatePolicy {
            max_surge: 0,
            max_unavailable: 0,
        };
        assert_eq!(policy.serving_counts(3), vec![3]);
    }
}
