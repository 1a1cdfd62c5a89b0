//! Deterministic resource naming
//!
//! Every platform resource name is a pure function of
//! (project, stack, role). Re-running a deployment therefore addresses the
//! same resources instead of creating duplicates, and two stacks in one
//! project never collide.

use sha2::{Digest, Sha256};

/// GCP caps service account IDs at 30 characters.
const SERVICE_ACCOUNT_ID_MAX: usize = 30;

/// Derives resource names for one deployment.
#[derive(Debug, Clone)]
pub struct ResourceNamer {
    project: String,
    stack: String,
}

impl ResourceNamer {
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
        }
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Canonical name for a role: `{project}-{stack}-{role}`.
    pub fn name(&self, role: &str) -> String {
        format!("{}-{}-{}", self.project, self.stack, role)
    }

    /// Service account ID for a role, within the platform's 30-char limit.
    ///
    /// Short names keep the readable `{name}-sa` form. Longer names are
    /// truncated and carry a digest suffix so two roles that share a prefix
    /// still map to distinct IDs.
    pub fn service_account_id(&self, role: &str) -> String {
        let base = self.name(role);
        if base.len() + 3 <= SERVICE_ACCOUNT_ID_MAX {
            return format!("{}-sa", base);
        }

        let mut hasher = Sha256::new();
        hasher.update(base.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        let prefix = base[..21].trim_end_matches('-');
        format!("{}-{}-sa", prefix, &digest[..5])
    }

    /// Email the platform assigns to a service account ID in this project.
    pub fn service_account_email(&self, account_id: &str) -> String {
        format!("{}@{}.iam.gserviceaccount.com", account_id, self.project)
    }
}

/// Port naming shared by the instance group and the backend service.
///
/// The backend service routes by port *name*, so both sides must agree on
/// it. Both always derive it from this one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPort {
    pub name: String,
    pub port: u16,
}

impl NamedPort {
    pub fn http(port: u16) -> Self {
        Self {
            name: format!("http-{}", port),
            port,
        }
    }

    /// `name:port` as gcloud's `--named-ports` expects it.
    pub fn flag_value(&self) -> String {
        format!("{}:{}", self.name, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_project_stack_role() {
        let namer = ResourceNamer::new("acme", "dev");
        assert_eq!(namer.name("github-token"), "acme-dev-github-token");
    }

    #[test]
    fn test_names_are_stable_across_calls() {
        let namer = ResourceNamer::new("acme", "prod");
        assert_eq!(namer.name("instance-group"), namer.name("instance-group"));
        assert_eq!(
            namer.service_account_id("fleet-sa"),
            namer.service_account_id("fleet-sa")
        );
    }

    #[test]
    fn test_names_are_distinct_per_role_and_stack() {
        let dev = ResourceNamer::new("acme", "dev");
        let prod = ResourceNamer::new("acme", "prod");
        assert_ne!(dev.name("allow-http"), prod.name("allow-http"));
        assert_ne!(dev.name("allow-http"), dev.name("allow-lb-to-instances"));
    }

    #[test]
    fn test_short_service_account_id_keeps_readable_form() {
        let namer = ResourceNamer::new("acme", "dev");
        assert_eq!(namer.service_account_id("fleet"), "acme-dev-fleet-sa");
    }

    #[test]
    fn test_long_service_account_id_is_truncated_with_digest() {
        let namer = ResourceNamer::new("encyclopedic-project", "staging");
        let id = namer.service_account_id("continuous-integration");
        assert!(id.len() <= 30, "id too long: {} ({})", id, id.len());
        assert!(id.ends_with("-sa"));
    }

    #[test]
    fn test_truncated_ids_stay_distinct_for_shared_prefixes() {
        // Both roles truncate to the same 21-char prefix; the digest suffix
        // must keep them apart.
        let namer = ResourceNamer::new("encyclopedic-project", "dev");
        let a = namer.service_account_id("alpha-service-long-role-name");
        let b = namer.service_account_id("alpha-service-long-role-number");
        assert_ne!(a, b);
        assert!(a.len() <= 30 && b.len() <= 30);
    }

    #[test]
    fn test_service_account_email() {
        let namer = ResourceNamer::new("acme", "dev");
        assert_eq!(
            namer.service_account_email("acme-dev-fleet-sa"),
            "acme-dev-fleet-sa@acme.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn test_named_port_form() {
        let port = NamedPort::http(8080);
        assert_eq!(port.name, "http-8080");
        assert_eq!(port.flag_value(), "http-8080:8080");
    }
}
