//! Deployment configuration
//!
//! One YAML file describes everything `groundwork` provisions: the target
//! project, the application fleet, the CI node, and the GitHub repositories
//! wired into Jenkins. Secret VALUES never appear in the file; it only names
//! the environment variables that carry them.
//!
//! ## Example
//!
//! ```yaml
//! project: acme-platform
//! stack: dev
//! region: us-central1
//! app:
//!   port: 8080
//!   health_path: /healthz
//! fleet:
//!   target_size: 3
//!   min_replicas: 2
//!   max_replicas: 3
//! repositories:
//!   - owner: acme
//!     name: storefront
//! ```

use std::env;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

/// Complete deployment configuration, loaded from a single YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    /// Target GCP project id
    pub project: String,

    /// Stack name, part of every resource name (e.g. "dev", "prod")
    pub stack: String,

    /// Region for the managed instance group and its autoscaler
    #[serde(default = "default_region")]
    pub region: String,

    /// Zone for the standalone CI instance. Defaults to `{region}-a`.
    #[serde(default)]
    pub zone: Option<String>,

    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub fleet: FleetConfig,

    #[serde(default)]
    pub ci: CiConfig,

    /// Repositories Jenkins builds and the fleet serves. The first entry is
    /// the application the fleet runs.
    pub repositories: Vec<RepositoryConfig>,

    #[serde(default)]
    pub secrets: SecretsConfig,
}

/// The application served by the fleet.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_port")]
    pub port: u16,

    /// HTTP path the load balancer health check probes
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

/// Shape and scaling of the load-balanced fleet.
#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    #[serde(default = "default_fleet_machine_type")]
    pub machine_type: String,

    #[serde(default = "default_image_family")]
    pub image_family: String,

    #[serde(default = "default_image_project")]
    pub image_project: String,

    /// Instances the group converges to before the autoscaler takes over
    #[serde(default = "default_target_size")]
    pub target_size: u32,

    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,

    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,

    /// Autoscaler CPU utilization target, fraction of one core
    #[serde(default = "default_cpu_target")]
    pub cpu_target: f64,

    /// Extra instances allowed above target during a rolling update
    #[serde(default = "default_max_surge")]
    pub max_surge: u32,

    /// Instances allowed below target during a rolling update
    #[serde(default = "default_max_unavailable")]
    pub max_unavailable: u32,
}

/// The standalone Jenkins CI node.
#[derive(Debug, Clone, Deserialize)]
pub struct CiConfig {
    #[serde(default = "default_ci_machine_type")]
    pub machine_type: String,

    #[serde(default = "default_admin_user")]
    pub admin_user: String,

    /// Jenkins web UI and webhook port
    #[serde(default = "default_ci_port")]
    pub port: u16,

    /// Plugins installed during bootstrap
    #[serde(default = "default_plugins")]
    pub plugins: Vec<String>,

    /// Id of the stored GitHub credential inside Jenkins
    #[serde(default = "default_credentials_id")]
    pub credentials_id: String,
}

/// A GitHub repository Jenkins builds on push.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,

    #[serde(default = "default_branch")]
    pub branch: String,
}

impl RepositoryConfig {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.name)
    }
}

/// Names of the environment variables that carry secret values.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_github_token_env")]
    pub github_token_env: String,

    #[serde(default = "default_admin_password_env")]
    pub admin_password_env: String,
}

impl DeploymentConfig {
    /// Load and validate a deployment config from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Zone for the CI instance, `{region}-a` unless set explicitly.
    pub fn ci_zone(&self) -> String {
        self.zone
            .clone()
            .unwrap_or_else(|| format!("{}-a", self.region))
    }

    /// Validate field values and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name_pattern = Regex::new(r"^[a-z][a-z0-9-]*$").unwrap();

        if self.project.is_empty() {
            return Err(ConfigError::MissingField {
                field: "project".to_string(),
            });
        }
        if self.stack.is_empty() {
            return Err(ConfigError::MissingField {
                field: "stack".to_string(),
            });
        }
        if !name_pattern.is_match(&self.stack) {
            return Err(ConfigError::InvalidValue {
                field: "stack".to_string(),
                value: format!("{} (lowercase letters, digits and hyphens only)", self.stack),
            });
        }
        if self.repositories.is_empty() {
            return Err(ConfigError::MissingField {
                field: "repositories".to_string(),
            });
        }
        for repo in &self.repositories {
            if repo.owner.is_empty() || repo.name.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "repositories[].owner/name".to_string(),
                });
            }
        }

        if self.app.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "app.port".to_string(),
                value: "0".to_string(),
            });
        }
        if !self.app.health_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "app.health_path".to_string(),
                value: format!("{} (must start with '/')", self.app.health_path),
            });
        }

        check_range("fleet.min_replicas", self.fleet.min_replicas, 1, 1000)?;
        check_range(
            "fleet.max_replicas",
            self.fleet.max_replicas,
            self.fleet.min_replicas,
            1000,
        )?;
        check_range(
            "fleet.target_size",
            self.fleet.target_size,
            self.fleet.min_replicas,
            self.fleet.max_replicas,
        )?;
        if !(self.fleet.cpu_target > 0.0 && self.fleet.cpu_target <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "fleet.cpu_target".to_string(),
                value: format!("{} (expected a fraction in (0, 1])", self.fleet.cpu_target),
            });
        }
        // A rolling update with no surge and no allowed unavailability can
        // never replace an instance.
        if self.fleet.max_surge == 0 && self.fleet.max_unavailable == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fleet.max_surge".to_string(),
                value: "0 while fleet.max_unavailable is also 0".to_string(),
            });
        }

        if self.ci.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ci.port".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }

    /// The repository whose application the fleet serves.
    pub fn app_repository(&self) -> &RepositoryConfig {
        &self.repositories[0]
    }
}

/// Read a required environment variable, rejecting empty values.
pub fn require_env(var: &str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv {
            var: var.to_string(),
        }),
    }
}

fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: format!("{} (expected {}..={})", value, min, max),
        });
    }
    Ok(())
}

// ============================================================================
// Defaults
// ============================================================================

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_app_port(),
            health_path: default_health_path(),
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            machine_type: default_fleet_machine_type(),
            image_family: default_image_family(),
            image_project: default_image_project(),
            target_size: default_target_size(),
            min_replicas: default_min_replicas(),
            max_replicas: default_max_replicas(),
            cpu_target: default_cpu_target(),
            max_surge: default_max_surge(),
            max_unavailable: default_max_unavailable(),
        }
    }
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            machine_type: default_ci_machine_type(),
            admin_user: default_admin_user(),
            port: default_ci_port(),
            plugins: default_plugins(),
            credentials_id: default_credentials_id(),
        }
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            github_token_env: default_github_token_env(),
            admin_password_env: default_admin_password_env(),
        }
    }
}

fn default_region() -> String {
    "us-central1".to_string()
}

fn default_app_port() -> u16 {
    8080
}

fn default_health_path() -> String {
    "/healthz".to_string()
}

fn default_fleet_machine_type() -> String {
    "e2-small".to_string()
}

fn default_image_family() -> String {
    "ubuntu-2204-lts".to_string()
}

fn default_image_project() -> String {
    "ubuntu-os-cloud".to_string()
}

fn default_target_size() -> u32 {
    3
}

fn default_min_replicas() -> u32 {
    2
}

fn default_max_replicas() -> u32 {
    3
}

fn default_cpu_target() -> f64 {
    0.6
}

fn default_max_surge() -> u32 {
    3
}

fn default_max_unavailable() -> u32 {
    0
}

fn default_ci_machine_type() -> String {
    "e2-medium".to_string()
}

fn default_admin_user() -> String {
    "admin".to_string()
}

fn default_ci_port() -> u16 {
    8080
}

fn default_plugins() -> Vec<String> {
    vec![
        "workflow-job".to_string(),
        "git".to_string(),
        "github".to_string(),
        "github-branch-source".to_string(),
    ]
}

fn default_credentials_id() -> String {
    "github-token-v1".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_admin_password_env() -> String {
    "JENKINS_PASSWORD".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
project: acme-platform
stack: dev
repositories:
  - owner: acme
    name: storefront
"#
    }

    fn parse(yaml: &str) -> DeploymentConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = parse(minimal_yaml());
        assert_eq!(config.region, "us-central1");
        assert_eq!(config.ci_zone(), "us-central1-a");
        assert_eq!(config.app.port, 8080);
        assert_eq!(config.app.health_path, "/healthz");
        assert_eq!(config.fleet.target_size, 3);
        assert_eq!(config.fleet.min_replicas, 2);
        assert_eq!(config.fleet.max_replicas, 3);
        assert_eq!(config.fleet.max_surge, 3);
        assert_eq!(config.fleet.max_unavailable, 0);
        assert_eq!(config.ci.admin_user, "admin");
        assert_eq!(config.ci.credentials_id, "github-token-v1");
        assert_eq!(config.repositories[0].branch, "main");
        assert_eq!(config.secrets.github_token_env, "GITHUB_TOKEN");
        assert_eq!(config.secrets.admin_password_env, "JENKINS_PASSWORD");
        config.validate().unwrap();
    }

    #[test]
    fn test_explicit_zone_wins() {
        let mut config = parse(minimal_yaml());
        config.zone = Some("europe-west1-b".to_string());
        assert_eq!(config.ci_zone(), "europe-west1-b");
    }

    #[test]
    fn test_repository_urls() {
        let config = parse(minimal_yaml());
        let repo = config.app_repository();
        assert_eq!(repo.slug(), "acme/storefront");
        assert_eq!(repo.clone_url(), "https://github.com/acme/storefront.git");
    }

    #[test]
    fn test_validate_rejects_empty_project() {
        let mut config = parse(minimal_yaml());
        config.project = String::new();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::MissingField { ref field } if field == "project"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_stack_name() {
        let mut config = parse(minimal_yaml());
        config.stack = "Dev_1".to_string();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidValue { ref field, .. } if field == "stack"
        ));
    }

    #[test]
    fn test_validate_rejects_no_repositories() {
        let mut config = parse(minimal_yaml());
        config.repositories.clear();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::MissingField { ref field } if field == "repositories"
        ));
    }

    #[test]
    fn test_validate_rejects_target_outside_replica_bounds() {
        let mut config = parse(minimal_yaml());
        config.fleet.target_size = 7;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidValue { ref field, .. } if field == "fleet.target_size"
        ));
    }

    #[test]
    fn test_validate_rejects_stuck_rolling_update() {
        let mut config = parse(minimal_yaml());
        config.fleet.max_surge = 0;
        config.fleet.max_unavailable = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_health_path() {
        let mut config = parse(minimal_yaml());
        config.app.health_path = "healthz".to_string();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidValue { ref field, .. } if field == "app.health_path"
        ));
    }

    #[test]
    fn test_require_env_rejects_missing_and_empty() {
        env::remove_var("GROUNDWORK_TEST_ABSENT");
        assert!(matches!(
            require_env("GROUNDWORK_TEST_ABSENT").unwrap_err(),
            ConfigError::MissingEnv { ref var } if var == "GROUNDWORK_TEST_ABSENT"
        ));

        env::set_var("GROUNDWORK_TEST_EMPTY", "");
        assert!(require_env("GROUNDWORK_TEST_EMPTY").is_err());

        env::set_var("GROUNDWORK_TEST_SET", "value");
        assert_eq!(require_env("GROUNDWORK_TEST_SET").unwrap(), "value");
    }
}
