//! Configuration structures for jenkins-provision
//!
//! The deployment tool renders this document at build time and hands it to
//! the instance. It carries Secret Manager secret NAMES, never values; the
//! values are fetched on the instance while the sequence runs.

use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;

use crate::validation::{validate_identifier, validate_numeric_range};

/// Complete bootstrap configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapConfig {
    /// Google Cloud project the secrets live in
    pub project: String,

    /// Local Jenkins settings
    #[serde(default)]
    pub jenkins: JenkinsConfig,

    /// Secret Manager secret names
    pub secrets: SecretNames,

    /// Jenkins credential id the pipeline jobs reference
    #[serde(default = "default_credentials_id")]
    pub credentials_id: String,

    /// Plugins required before jobs can be registered
    #[serde(default = "default_plugins")]
    pub plugins: Vec<String>,

    /// Repositories to wire up with a job and a push webhook
    pub repositories: Vec<RepositoryConfig>,

    /// Readiness polling bounds
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Plugin installation retry budget
    #[serde(default)]
    pub plugin_retry: PluginRetryConfig,

    /// Well-known file locations on the instance
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JenkinsConfig {
    /// Administrator account to create during rotation
    #[serde(default = "default_admin_user")]
    pub admin_user: String,

    /// Port the local Jenkins listens on
    #[serde(default = "default_jenkins_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecretNames {
    /// Secret holding the GitHub access token
    pub github_token: String,

    /// Secret holding the permanent administrator password
    pub admin_password: String,
}

#[derive(Debug, Deserialize, Clone)]
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

#[derive(Debug, Deserialize, Clone)]
pub struct ReadinessConfig {
    /// Seconds between readiness probes (default: 30)
    #[serde(default = "default_readiness_interval_secs")]
    pub interval_secs: u64,

    /// Overall deadline in seconds for Jenkins to come up (default: 900)
    #[serde(default = "default_readiness_deadline_secs")]
    pub deadline_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PluginRetryConfig {
    /// Attempts per plugin before the sequence fails (default: 5)
    #[serde(default = "default_plugin_max_attempts")]
    pub max_attempts: u32,

    /// Seconds between attempts (default: 30)
    #[serde(default = "default_plugin_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// One-time password Jenkins generates on first start
    #[serde(default = "default_initial_password_path")]
    pub initial_password: PathBuf,

    /// Where to place the downloaded jenkins-cli.jar
    #[serde(default = "default_cli_jar_path")]
    pub cli_jar: PathBuf,

    /// CLI auth file (user:password, mode 0600)
    #[serde(default = "default_auth_file_path")]
    pub auth_file: PathBuf,

    /// Copy of the one-time password kept for recovery, mode 0600
    #[serde(default = "default_saved_password_path")]
    pub saved_admin_password: PathBuf,

    /// Structured final status, written on success and failure
    #[serde(default = "default_status_path")]
    pub status: PathBuf,
}

impl BootstrapConfig {
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.jenkins.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.project.is_empty() {
            anyhow::bail!("project cannot be empty");
        }
        if self.jenkins.port == 0 {
            anyhow::bail!("jenkins.port cannot be 0");
        }
        if self.repositories.is_empty() {
            anyhow::bail!("at least one repository is required");
        }

        validate_identifier(&self.credentials_id, "credentials_id")?;
        validate_identifier(&self.secrets.github_token, "secrets.github_token")?;
        validate_identifier(&self.secrets.admin_password, "secrets.admin_password")?;
        for repo in &self.repositories {
            validate_identifier(&repo.owner, "repository owner")?;
            validate_identifier(&repo.name, "repository name")?;
            validate_identifier(&repo.branch, "repository branch")?;
        }
        for plugin in &self.plugins {
            validate_identifier(plugin, "plugin name")?;
        }

        validate_numeric_range(self.readiness.interval_secs, "readiness.interval_secs", 1, 300)?;
        validate_numeric_range(
            self.readiness.deadline_secs,
            "readiness.deadline_secs",
            self.readiness.interval_secs,
            7200,
        )?;
        validate_numeric_range(
            u64::from(self.plugin_retry.max_attempts),
            "plugin_retry.max_attempts",
            1,
            100,
        )?;
        validate_numeric_range(self.plugin_retry.interval_secs, "plugin_retry.interval_secs", 1, 600)?;

        Ok(())
    }
}

impl Default for JenkinsConfig {
    fn default() -> Self {
        Self {
            admin_user: default_admin_user(),
            port: default_jenkins_port(),
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_readiness_interval_secs(),
            deadline_secs: default_readiness_deadline_secs(),
        }
    }
}

impl Default for PluginRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_plugin_max_attempts(),
            interval_secs: default_plugin_interval_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            initial_password: default_initial_password_path(),
            cli_jar: default_cli_jar_path(),
            auth_file: default_auth_file_path(),
            saved_admin_password: default_saved_password_path(),
            status: default_status_path(),
        }
    }
}

fn default_admin_user() -> String {
    "admin".to_string()
}

fn default_jenkins_port() -> u16 {
    8080
}

fn default_credentials_id() -> String {
    "github-token-v1".to_string()
}

fn default_plugins() -> Vec<String> {
    vec![
        "workflow-job".to_string(),
        "git".to_string(),
        "github".to_string(),
        "github-branch-source".to_string(),
    ]
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_readiness_interval_secs() -> u64 {
    30
}

fn default_readiness_deadline_secs() -> u64 {
    900
}

fn default_plugin_max_attempts() -> u32 {
    5
}

fn default_plugin_interval_secs() -> u64 {
    30
}

fn default_initial_password_path() -> PathBuf {
    PathBuf::from("/var/lib/jenkins/secrets/initialAdminPassword")
}

fn default_cli_jar_path() -> PathBuf {
    PathBuf::from("/tmp/jenkins-cli.jar")
}

fn default_auth_file_path() -> PathBuf {
    PathBuf::from("/var/lib/jenkins-provision/cli-auth")
}

fn default_saved_password_path() -> PathBuf {
    PathBuf::from("/var/lib/jenkins-provision/initial-admin-password")
}

fn default_status_path() -> PathBuf {
    PathBuf::from("/var/lib/jenkins-provision/status.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
project: acme
secrets:
  github_token: acme-dev-github-token
  admin_password: acme-dev-admin-password
repositories:
  - owner: acme
    name: storefront
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: BootstrapConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.jenkins.admin_user, "admin");
        assert_eq!(config.jenkins.port, 8080);
        assert_eq!(config.credentials_id, "github-token-v1");
        assert_eq!(
            config.plugins,
            vec!["workflow-job", "git", "github", "github-branch-source"]
        );
        assert_eq!(config.repositories[0].branch, "main");
        assert_eq!(config.readiness.interval_secs, 30);
        assert_eq!(config.readiness.deadline_secs, 900);
        assert_eq!(config.plugin_retry.max_attempts, 5);
        assert_eq!(config.base_url(), "http://localhost:8080");
        assert_eq!(
            config.paths.initial_password,
            PathBuf::from("/var/lib/jenkins/secrets/initialAdminPassword")
        );
    }

    #[test]
    fn test_repository_urls() {
        let config: BootstrapConfig = serde_yaml::from_str(MINIMAL).unwrap();
        let repo = &config.repositories[0];
        assert_eq!(repo.slug(), "acme/storefront");
        assert_eq!(repo.clone_url(), "https://github.com/acme/storefront.git");
    }

    #[test]
    fn test_validate_rejects_empty_repositories() {
        let yaml = r#"
project: acme
secrets:
  github_token: t
  admin_password: p
repositories: []
"#;
        let config: BootstrapConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shell_metacharacters_in_names() {
        let yaml = r#"
project: acme
secrets:
  github_token: acme-token
  admin_password: acme-password
repositories:
  - owner: "acme;rm -rf"
    name: storefront
"#;
        let config: BootstrapConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_deadline_shorter_than_interval() {
        let yaml = r#"
project: acme
secrets:
  github_token: t-1
  admin_password: p-1
repositories:
  - owner: acme
    name: storefront
readiness:
  interval_secs: 60
  deadline_secs: 30
"#;
        let config: BootstrapConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
