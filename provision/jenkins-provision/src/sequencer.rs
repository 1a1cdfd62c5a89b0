//! The eleven stage bootstrap sequence
//!
//! Stages run strictly in order and the sequence stops at the first
//! failure. Every stage is individually convergent, so rerunning the
//! binary after a partial failure picks up the remaining work instead
//! of duplicating what already succeeded.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{info, warn};

use crate::artifacts;
use crate::config::BootstrapConfig;
use crate::github::GitHubClient;
use crate::jenkins::{self, JenkinsCli, INITIAL_ADMIN_USER};
use crate::metadata::MetadataClient;
use crate::poll;
use crate::secrets::SecretClient;
use crate::status;
use crate::system;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InstallPackages,
    AwaitReady,
    InitialCredentials,
    FetchCli,
    InstallPlugins,
    PostPluginReady,
    RegisterCredential,
    RegisterJobs,
    RotateAdmin,
    RegisterWebhooks,
    FinalRestart,
}

impl Stage {
    pub fn number(self) -> u32 {
        match self {
            Stage::InstallPackages => 1,
            Stage::AwaitReady => 2,
            Stage::InitialCredentials => 3,
            Stage::FetchCli => 4,
            Stage::InstallPlugins => 5,
            Stage::PostPluginReady => 6,
            Stage::RegisterCredential => 7,
            Stage::RegisterJobs => 8,
            Stage::RotateAdmin => 9,
            Stage::RegisterWebhooks => 10,
            Stage::FinalRestart => 11,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::InstallPackages => "package installation",
            Stage::AwaitReady => "service readiness",
            Stage::InitialCredentials => "initial credentials",
            Stage::FetchCli => "cli download",
            Stage::InstallPlugins => "plugin installation",
            Stage::PostPluginReady => "post-plugin readiness",
            Stage::RegisterCredential => "credential registration",
            Stage::RegisterJobs => "job registration",
            Stage::RotateAdmin => "administrator rotation",
            Stage::RegisterWebhooks => "webhook registration",
            Stage::FinalRestart => "final restart",
        }
    }
}

/// A stage paired with the error that stopped it.
pub struct StageFailure {
    pub stage: Stage,
    pub error: anyhow::Error,
}

fn at(stage: Stage) -> impl FnOnce(anyhow::Error) -> StageFailure {
    move |error| StageFailure { stage, error }
}

/// Run the full bootstrap and record the outcome in the status file.
pub async fn run(config: &BootstrapConfig) -> Result<()> {
    info!("=== Jenkins Bootstrap (Idempotent) ===");

    match run_stages(config).await {
        Ok(()) => {
            status::write_success(&config.paths.status).await?;
            info!("=== Jenkins Bootstrap Complete ===");
            Ok(())
        }
        Err(failure) => {
            if let Err(write_err) = status::write_failure(&config.paths.status, &failure).await {
                warn!("Could not record bootstrap status: {:#}", write_err);
            }
            let stage = failure.stage;
            Err(failure
                .error
                .context(format!("stage {} ({}) failed", stage.number(), stage.name())))
        }
    }
}

async fn run_stages(config: &BootstrapConfig) -> Result<(), StageFailure> {
    let http = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
        .map_err(at(Stage::InstallPackages))?;

    info!("1. Installing Jenkins, Java and Docker");
    install_packages(&http).await.map_err(at(Stage::InstallPackages))?;

    info!("2. Starting Jenkins and waiting for it to answer");
    start_service(config, &http).await.map_err(at(Stage::AwaitReady))?;

    info!("3. Reading the generated administrator password");
    let (cli, initial_password) = initial_credentials(config)
        .await
        .map_err(at(Stage::InitialCredentials))?;

    info!("4. Downloading the Jenkins CLI");
    jenkins::download_cli_jar(&http, &config.base_url(), &config.paths.cli_jar)
        .await
        .map_err(at(Stage::FetchCli))?;

    info!("5. Installing {} plugins", config.plugins.len());
    install_plugins(config, &cli).await.map_err(at(Stage::InstallPlugins))?;

    info!("6. Waiting for Jenkins after plugin restarts");
    await_ready(config, &http).await.map_err(at(Stage::PostPluginReady))?;

    info!("7. Registering the GitHub credential");
    let github_token = fetch_secret(config, &config.secrets.github_token)
        .await
        .map_err(at(Stage::RegisterCredential))?;
    register_credential(config, &cli, &github_token)
        .await
        .map_err(at(Stage::RegisterCredential))?;

    info!("8. Registering pipeline jobs");
    register_jobs(config, &cli).await.map_err(at(Stage::RegisterJobs))?;

    info!("9. Rotating the administrator account");
    rotate_admin(config, &cli, &initial_password)
        .await
        .map_err(at(Stage::RotateAdmin))?;

    info!("10. Registering GitHub push webhooks");
    register_webhooks(config, &github_token)
        .await
        .map_err(at(Stage::RegisterWebhooks))?;

    info!("11. Restarting Jenkins");
    final_restart(config, &http).await.map_err(at(Stage::FinalRestart))?;

    Ok(())
}

async fn install_packages(http: &Client) -> Result<()> {
    system::ensure_jenkins_apt_repo(http).await?;
    system::apt_update().await?;
    system::install_docker(http).await?;
    system::apt_install(&["openjdk-17-jdk", "jenkins"]).await?;
    Ok(())
}

async fn start_service(config: &BootstrapConfig, http: &Client) -> Result<()> {
    system::systemctl("start", "jenkins").await?;
    system::systemctl("enable", "jenkins").await?;
    await_ready(config, http).await
}

async fn await_ready(config: &BootstrapConfig, http: &Client) -> Result<()> {
    let base_url = config.base_url();
    poll::poll_until(
        "Jenkins HTTP endpoint",
        Duration::from_secs(config.readiness.interval_secs),
        Duration::from_secs(config.readiness.deadline_secs),
        || jenkins::endpoint_ready(http, &base_url),
    )
    .await
}

/// Read the one time password Jenkins generated and point the CLI at it.
///
/// The password itself stays in memory until stage 9 persists a recovery
/// copy; on disk it only ever lands in 0600 files.
async fn initial_credentials(config: &BootstrapConfig) -> Result<(JenkinsCli, String)> {
    let raw = tokio::fs::read_to_string(&config.paths.initial_password)
        .await
        .with_context(|| {
            format!(
                "Failed to read the generated administrator password from {}",
                config.paths.initial_password.display()
            )
        })?;
    let initial_password = raw.trim().to_string();

    let cli = JenkinsCli::new(&config.paths.cli_jar, &config.base_url(), &config.paths.auth_file)?;
    cli.write_auth(INITIAL_ADMIN_USER, &initial_password).await?;

    Ok((cli, initial_password))
}

async fn install_plugins(config: &BootstrapConfig, cli: &JenkinsCli) -> Result<()> {
    let interval = Duration::from_secs(config.plugin_retry.interval_secs);

    for plugin in &config.plugins {
        // install-plugin with -restart bounces Jenkins, which aborts the
        // next CLI call now and then; the retry budget absorbs that.
        let what = format!("install-plugin {}", plugin);
        poll::retry_fixed(&what, config.plugin_retry.max_attempts, interval, || {
            let cli = cli.clone();
            let plugin = plugin.clone();
            async move {
                cli.run(&["install-plugin", &plugin, "-restart"], None).await?;
                Ok(())
            }
        })
        .await?;
        info!("✓ Plugin {} installed", plugin);
    }

    Ok(())
}

async fn fetch_secret(config: &BootstrapConfig, secret_name: &str) -> Result<String> {
    let metadata = MetadataClient::new()?;
    let access_token = metadata
        .access_token()
        .await
        .context("Failed to obtain an access token from the metadata service")?;
    let secrets = SecretClient::new(&config.project)?;
    secrets.access(&access_token, secret_name).await
}

async fn register_credential(config: &BootstrapConfig, cli: &JenkinsCli, token: &str) -> Result<()> {
    let xml = artifacts::credentials_xml(&config.credentials_id, token)?;
    let create = cli
        .run(
            &["create-credentials-by-xml", "system::system::jenkins", "_"],
            Some(xml.as_bytes()),
        )
        .await;

    match create {
        Ok(_) => info!("✓ Credential {} created", config.credentials_id),
        Err(e) if format!("{:#}", e).contains("already exists") => {
            cli.run(
                &[
                    "update-credentials-by-xml",
                    "system::system::jenkins",
                    "_",
                    &config.credentials_id,
                ],
                Some(xml.as_bytes()),
            )
            .await?;
            info!("✓ Credential {} updated", config.credentials_id);
        }
        Err(e) => return Err(e),
    }

    Ok(())
}

pub(crate) fn job_name(repo_name: &str) -> String {
    format!("{}-deployment-job", repo_name)
}

/// One (job name, job XML) pair per configured repository.
fn job_registrations(config: &BootstrapConfig) -> Result<Vec<(String, String)>> {
    config
        .repositories
        .iter()
        .map(|repo| {
            let xml = artifacts::job_xml(
                &repo.slug(),
                &repo.clone_url(),
                &repo.branch,
                &config.credentials_id,
            )?;
            Ok((job_name(&repo.name), xml))
        })
        .collect()
}

async fn register_jobs(config: &BootstrapConfig, cli: &JenkinsCli) -> Result<()> {
    for (name, xml) in job_registrations(config)? {
        match cli.run(&["create-job", &name], Some(xml.as_bytes())).await {
            Ok(_) => info!("✓ Job {} created", name),
            Err(e) if format!("{:#}", e).contains("already exists") => {
                info!("✓ Job {} already exists, skipping", name);
            }
            Err(e) => return Err(e.context(format!("Failed to create job {}", name))),
        }
    }

    Ok(())
}

async fn rotate_admin(config: &BootstrapConfig, cli: &JenkinsCli, initial_password: &str) -> Result<()> {
    let permanent = fetch_secret(config, &config.secrets.admin_password).await?;

    let script = artifacts::admin_groovy(&config.jenkins.admin_user, &permanent)?;
    cli.run(&["groovy", "="], Some(script.as_bytes()))
        .await
        .context("Administrator rotation script failed")?;

    // Recovery copy of the one time password, owner readable only
    system::write_private(&config.paths.saved_admin_password, initial_password.as_bytes()).await?;

    // Switch the CLI to the rotated account and prove it works
    cli.write_auth(&config.jenkins.admin_user, &permanent).await?;
    cli.who_am_i()
        .await
        .context("Rotated administrator credentials were rejected")?;
    info!("✓ Administrator account {} active", config.jenkins.admin_user);

    Ok(())
}

/// One (owner, repository, callback URL) triple per configured repository.
/// Every repository points its hook at the same Jenkins endpoint.
fn webhook_registrations(
    config: &BootstrapConfig,
    external_ip: &str,
) -> Vec<(String, String, String)> {
    let callback = format!("http://{}:{}/github-webhook/", external_ip, config.jenkins.port);
    config
        .repositories
        .iter()
        .map(|repo| (repo.owner.clone(), repo.name.clone(), callback.clone()))
        .collect()
}

async fn register_webhooks(config: &BootstrapConfig, token: &str) -> Result<()> {
    let metadata = MetadataClient::new()?;
    let external_ip = metadata
        .external_ip()
        .await
        .context("Failed to discover the instance external IP")?;
    info!("Instance external IP is {}", external_ip);

    let github = GitHubClient::new(token)?;
    for (owner, repo, callback) in webhook_registrations(config, &external_ip) {
        github.ensure_push_webhook(&owner, &repo, &callback).await?;
    }

    Ok(())
}

async fn final_restart(config: &BootstrapConfig, http: &Client) -> Result<()> {
    system::systemctl("restart", "jenkins").await?;
    await_ready(config, http).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_numbers_are_dense_and_ordered() {
        let stages = [
            Stage::InstallPackages,
            Stage::AwaitReady,
            Stage::InitialCredentials,
            Stage::FetchCli,
            Stage::InstallPlugins,
            Stage::PostPluginReady,
            Stage::RegisterCredential,
            Stage::RegisterJobs,
            Stage::RotateAdmin,
            Stage::RegisterWebhooks,
            Stage::FinalRestart,
        ];

        for (i, stage) in stages.iter().enumerate() {
            assert_eq!(stage.number(), (i + 1) as u32);
            assert!(!stage.name().is_empty());
        }
        assert_eq!(stages.len(), 11);
    }

    #[test]
    fn test_at_attributes_the_failing_stage() {
        let failure = at(Stage::FetchCli)(anyhow::anyhow!("download interrupted"));
        assert_eq!(failure.stage, Stage::FetchCli);
        assert_eq!(failure.error.to_string(), "download interrupted");
    }

    #[test]
    fn test_job_name_convention() {
        assert_eq!(job_name("storefront"), "storefront-deployment-job");
        assert_eq!(job_name("billing-api"), "billing-api-deployment-job");
    }

    #[test]
    fn test_two_repositories_get_one_job_and_one_webhook_each() {
        let config: BootstrapConfig = serde_yaml::from_str(
            r#"
project: acme
secrets:
  github_token: acme-dev-github-token
  admin_password: acme-dev-admin-password
repositories:
  - owner: acme
    name: storefront
  - owner: acme
    name: billing
    branch: release
"#,
        )
        .unwrap();

        let jobs = job_registrations(&config).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].0, "storefront-deployment-job");
        assert_eq!(jobs[1].0, "billing-deployment-job");
        // Both jobs reference the same credential id.
        for (_, xml) in &jobs {
            assert!(xml.contains("github-token-v1"));
        }
        assert!(jobs[1].1.contains("*/release"));

        let hooks = webhook_registrations(&config, "34.10.20.30");
        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks[0].1, "storefront");
        assert_eq!(hooks[1].1, "billing");
        // Every hook points at the same Jenkins callback.
        for (_, _, callback) in &hooks {
            assert_eq!(callback, "http://34.10.20.30:8080/github-webhook/");
        }
    }
}
