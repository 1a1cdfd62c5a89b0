//! Jenkins CLI wrapper
//!
//! All Jenkins control actions go through `java -jar jenkins-cli.jar`.
//! Authentication uses the `-auth @file` form so the password only ever
//! lives in a 0600 file, never in the process argument list.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::Client;

use crate::system;

/// Account Jenkins generates on first start, before rotation.
pub const INITIAL_ADMIN_USER: &str = "admin";

#[derive(Clone)]
pub struct JenkinsCli {
    java: PathBuf,
    jar: PathBuf,
    url: String,
    auth_file: PathBuf,
}

impl JenkinsCli {
    pub fn new(jar: &Path, base_url: &str, auth_file: &Path) -> Result<Self> {
        let java = which::which("java")
            .context("java not found on PATH; the package install stage should have provided it")?;
        Ok(Self {
            java,
            jar: jar.to_path_buf(),
            url: base_url.to_string(),
            auth_file: auth_file.to_path_buf(),
        })
    }

    /// Write `user:password` to the auth file with owner-only permissions.
    ///
    /// Called once with the generated password and again after rotation.
    pub async fn write_auth(&self, user: &str, password: &str) -> Result<()> {
        let line = format!("{}:{}", user, password);
        system::write_private(&self.auth_file, line.as_bytes()).await
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "-jar".to_string(),
            self.jar.display().to_string(),
            "-s".to_string(),
            self.url.clone(),
            "-auth".to_string(),
            format!("@{}", self.auth_file.display()),
        ]
    }

    /// Run a CLI command, optionally piping a document through stdin.
    pub async fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<String> {
        let java = self.java.display().to_string();
        let mut full = self.base_args();
        full.extend(args.iter().map(|s| s.to_string()));
        let full_refs: Vec<&str> = full.iter().map(String::as_str).collect();

        match stdin {
            Some(input) => system::run_with_input(&java, &full_refs, input).await,
            None => system::run_checked(&java, &full_refs).await,
        }
    }

    /// Verify the auth file works by asking Jenkins who we are.
    pub async fn who_am_i(&self) -> Result<String> {
        self.run(&["who-am-i"], None).await
    }
}

/// True once the local Jenkins answers HTTP at all.
///
/// Any response counts, including the 403 login page served during setup;
/// only connection failures mean the service is still starting.
pub async fn endpoint_ready(http: &Client, base_url: &str) -> bool {
    http.get(base_url).send().await.is_ok()
}

/// Download jenkins-cli.jar from the running service and verify it landed.
pub async fn download_cli_jar(http: &Client, base_url: &str, dest: &Path) -> Result<()> {
    let url = format!("{}/jnlpJars/jenkins-cli.jar", base_url);
    let bytes = http
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?
        .error_for_status()
        .with_context(|| format!("Jenkins rejected the CLI download from {}", url))?
        .bytes()
        .await
        .context("Failed to read the Jenkins CLI jar")?;

    tokio::fs::write(dest, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    if !dest.is_file() {
        anyhow::bail!("Jenkins CLI jar missing at {} after download", dest.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_args_reference_auth_file_not_credentials() {
        let cli = JenkinsCli {
            java: PathBuf::from("/usr/bin/java"),
            jar: PathBuf::from("/tmp/jenkins-cli.jar"),
            url: "http://localhost:8080".to_string(),
            auth_file: PathBuf::from("/var/lib/jenkins-provision/cli-auth"),
        };

        let args = cli.base_args();
        assert_eq!(
            args,
            vec![
                "-jar",
                "/tmp/jenkins-cli.jar",
                "-s",
                "http://localhost:8080",
                "-auth",
                "@/var/lib/jenkins-provision/cli-auth",
            ]
        );
    }

    #[tokio::test]
    async fn test_write_auth_creates_owner_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let auth_file = dir.path().join("cli-auth");
        let cli = JenkinsCli {
            java: PathBuf::from("/usr/bin/java"),
            jar: PathBuf::from("/tmp/jenkins-cli.jar"),
            url: "http://localhost:8080".to_string(),
            auth_file: auth_file.clone(),
        };

        cli.write_auth("admin", "one-time-password").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&auth_file).unwrap(),
            "admin:one-time-password"
        );
        let mode = std::fs::metadata(&auth_file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
