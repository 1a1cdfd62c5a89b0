//! Host level operations: packages, services, private files
//!
//! Everything here shells out to the standard Debian tooling on the
//! instance. Command failures surface the program, its arguments and
//! stderr; stdin content is never echoed because callers pipe secrets
//! through it.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

const JENKINS_KEYRING_PATH: &str = "/usr/share/keyrings/jenkins-keyring.asc";
const JENKINS_KEY_URL: &str = "https://pkg.jenkins.io/debian-stable/jenkins.io-2023.key";
const JENKINS_SOURCES_PATH: &str = "/etc/apt/sources.list.d/jenkins.list";
const DOCKER_INSTALL_URL: &str = "https://get.docker.com";

/// Run a command and fail with its stderr when it exits non-zero.
pub async fn run_checked(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run {}", program))?;

    if !output.status.success() {
        anyhow::bail!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run a command with bytes piped to stdin.
///
/// The error path reports arguments and stderr only, never the piped input.
pub async fn run_with_input(program: &str, args: &[&str], input: &[u8]) -> Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to run {}", program))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input)
            .await
            .with_context(|| format!("Failed to write stdin for {}", program))?;
        // Dropping the handle closes the pipe so the child sees EOF
    }

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("Failed to wait for {}", program))?;

    if !output.status.success() {
        anyhow::bail!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

async fn apt_get(args: &[&str]) -> Result<()> {
    let output = Command::new("apt-get")
        .env("DEBIAN_FRONTEND", "noninteractive")
        .args(args)
        .output()
        .await
        .context("Failed to run apt-get")?;

    if !output.status.success() {
        anyhow::bail!(
            "apt-get {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}

pub async fn apt_update() -> Result<()> {
    apt_get(&["update"]).await
}

pub async fn apt_install(packages: &[&str]) -> Result<()> {
    let mut args = vec!["install", "-y"];
    args.extend_from_slice(packages);
    apt_get(&args).await
}

pub async fn systemctl(action: &str, unit: &str) -> Result<()> {
    run_checked("systemctl", &[action, unit]).await?;
    Ok(())
}

/// Register the Jenkins LTS apt repository with its signing key.
pub async fn ensure_jenkins_apt_repo(http: &Client) -> Result<()> {
    let key = http
        .get(JENKINS_KEY_URL)
        .send()
        .await
        .context("Failed to download the Jenkins repository signing key")?
        .error_for_status()
        .context("Jenkins repository signing key download was rejected")?
        .bytes()
        .await
        .context("Failed to read the Jenkins repository signing key")?;

    tokio::fs::write(JENKINS_KEYRING_PATH, &key)
        .await
        .with_context(|| format!("Failed to write {}", JENKINS_KEYRING_PATH))?;

    let sources_line = format!(
        "deb [signed-by={}] https://pkg.jenkins.io/debian-stable binary/\n",
        JENKINS_KEYRING_PATH
    );
    tokio::fs::write(JENKINS_SOURCES_PATH, sources_line)
        .await
        .with_context(|| format!("Failed to write {}", JENKINS_SOURCES_PATH))?;

    Ok(())
}

/// Install Docker with the upstream convenience script, skipping when present.
pub async fn install_docker(http: &Client) -> Result<()> {
    if which::which("docker").is_ok() {
        info!("✓ Docker already installed, skipping");
        return Ok(());
    }

    let script = http
        .get(DOCKER_INSTALL_URL)
        .send()
        .await
        .context("Failed to download the Docker install script")?
        .error_for_status()
        .context("Docker install script download was rejected")?
        .text()
        .await
        .context("Failed to read the Docker install script")?;

    run_with_input("sh", &[], script.as_bytes())
        .await
        .context("Docker install script failed")?;

    Ok(())
}

/// Write a file readable by its owner only (mode 0600).
pub async fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_checked_captures_stdout() {
        let out = run_checked("echo", &["hello"]).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_checked_reports_failure_with_args() {
        let err = run_checked("ls", &["/definitely/not/a/path"]).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ls /definitely/not/a/path failed"));
    }

    #[tokio::test]
    async fn test_run_with_input_pipes_stdin_but_never_logs_it() {
        let out = run_with_input("cat", &[], b"piped-value").await.unwrap();
        assert_eq!(out, "piped-value");

        // A failing command must not echo what was piped in
        let err = run_with_input("ls", &["/definitely/not/a/path"], b"piped-value")
            .await
            .unwrap_err();
        assert!(!format!("{:#}", err).contains("piped-value"));
    }

    #[tokio::test]
    async fn test_write_private_sets_owner_only_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/secret.txt");
        write_private(&path, b"s3cret").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "s3cret");
    }
}
