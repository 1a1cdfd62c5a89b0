//! gcloud CLI operations
//!
//! Every platform mutation goes through the system `gcloud` binary. The
//! client pins the target project and runs non-interactively; callers pass
//! the subcommand arguments only. Secret values are piped through stdin and
//! never placed on a command line.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::GcloudError;

/// Client for gcloud commands against one project.
#[derive(Debug, Clone)]
pub struct GcloudClient {
    project: String,
}

impl GcloudClient {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }

    /// Verify the Google Cloud SDK is installed before any command runs.
    pub fn preflight() -> Result<(), GcloudError> {
        which::which("gcloud").map_err(|_| GcloudError::NotInstalled)?;
        Ok(())
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Run a gcloud command and return its stdout.
    pub async fn run(&self, args: &[&str]) -> Result<String, GcloudError> {
        self.execute(args, false, None).await
    }

    /// Run a gcloud command with bytes piped to stdin.
    pub async fn run_with_stdin(&self, args: &[&str], input: &[u8]) -> Result<String, GcloudError> {
        self.execute(args, false, Some(input)).await
    }

    /// Run a gcloud command and parse its stdout as JSON.
    pub async fn run_json(&self, args: &[&str]) -> Result<serde_json::Value, GcloudError> {
        let stdout = self.execute(args, true, None).await?;
        serde_json::from_str(stdout.trim()).map_err(|e| GcloudError::ParseFailed {
            command: args.join(" "),
            message: e.to_string(),
        })
    }

    /// Describe a resource, returning `None` when the lookup fails.
    ///
    /// Absence and lookup failure are folded together on purpose: callers
    /// follow up with a create, and a real problem (permissions, auth)
    /// surfaces there with a full error.
    pub async fn try_describe(
        &self,
        args: &[&str],
    ) -> Result<Option<serde_json::Value>, GcloudError> {
        match self.run_json(args).await {
            Ok(value) => Ok(Some(value)),
            Err(GcloudError::CommandFailed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn execute(
        &self,
        args: &[&str],
        json: bool,
        input: Option<&[u8]>,
    ) -> Result<String, GcloudError> {
        // Argv never carries secret values, so it is safe in errors.
        let command_line = args.join(" ");

        let mut cmd = Command::new("gcloud");
        cmd.args(self.full_args(args, json));
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = if let Some(input) = input {
            cmd.stdin(Stdio::piped());
            let mut child = cmd.spawn().map_err(|e| GcloudError::CommandFailed {
                command: command_line.clone(),
                stderr: e.to_string(),
            })?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input)
                    .await
                    .map_err(|e| GcloudError::CommandFailed {
                        command: command_line.clone(),
                        stderr: format!("failed to write stdin: {}", e),
                    })?;
            }
            child
                .wait_with_output()
                .await
                .map_err(|e| GcloudError::CommandFailed {
                    command: command_line.clone(),
                    stderr: e.to_string(),
                })?
        } else {
            cmd.output().await.map_err(|e| GcloudError::CommandFailed {
                command: command_line.clone(),
                stderr: e.to_string(),
            })?
        };

        if !output.status.success() {
            return Err(GcloudError::CommandFailed {
                command: command_line,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Project pin, output format and non-interactive mode for every call.
    fn full_args(&self, args: &[&str], json: bool) -> Vec<String> {
        let mut full: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        full.push("--project".to_string());
        full.push(self.project.clone());
        if json {
            full.push("--format=json".to_string());
        }
        full.push("--quiet".to_string());
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_args_pins_project_and_quiet() {
        let client = GcloudClient::new("acme-platform");
        let args = client.full_args(&["compute", "networks", "list"], false);
        assert_eq!(
            args,
            vec!["compute", "networks", "list", "--project", "acme-platform", "--quiet"]
        );
    }

    #[test]
    fn test_full_args_json_format_before_quiet() {
        let client = GcloudClient::new("acme-platform");
        let args = client.full_args(&["compute", "addresses", "describe", "demo-ip"], true);
        assert_eq!(args[args.len() - 2], "--format=json");
        assert_eq!(args[args.len() - 1], "--quiet");
    }
}
