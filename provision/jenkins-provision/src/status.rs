//! Final bootstrap status file
//!
//! Written on both success and failure so an operator (or the deployment
//! tool) can read how far the sequence got without scraping logs. The file
//! carries no secret material and stays world readable.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sequencer::{Stage, StageFailure};

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct BootstrapStatus {
    pub outcome: Outcome,
    pub stage: u32,
    pub stage_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

async fn write(path: &Path, status: &BootstrapStatus) -> Result<()> {
    let json = serde_json::to_string_pretty(status).context("Failed to serialize bootstrap status")?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write bootstrap status to {}", path.display()))?;

    Ok(())
}

pub async fn write_success(path: &Path) -> Result<()> {
    let status = BootstrapStatus {
        outcome: Outcome::Succeeded,
        stage: Stage::FinalRestart.number(),
        stage_name: Stage::FinalRestart.name().to_string(),
        error: None,
        finished_at: Utc::now(),
    };
    write(path, &status).await
}

pub async fn write_failure(path: &Path, failure: &StageFailure) -> Result<()> {
    let status = BootstrapStatus {
        outcome: Outcome::Failed,
        stage: failure.stage.number(),
        stage_name: failure.stage.name().to_string(),
        error: Some(format!("{:#}", failure.error)),
        finished_at: Utc::now(),
    };
    write(path, &status).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_success_records_final_stage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/status.json");

        write_success(&path).await.unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["outcome"], "succeeded");
        assert_eq!(parsed["stage"], 11);
        assert!(parsed.get("error").is_none());
    }

    #[tokio::test]
    async fn test_write_failure_records_stage_and_error_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        let failure = StageFailure {
            stage: Stage::InstallPlugins,
            error: anyhow::anyhow!("install-plugin git failed").context("plugin budget exhausted"),
        };
        write_failure(&path, &failure).await.unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["outcome"], "failed");
        assert_eq!(parsed["stage"], 5);
        assert_eq!(parsed["stage_name"], "plugin installation");
        let error = parsed["error"].as_str().unwrap();
        assert!(error.contains("plugin budget exhausted"));
        assert!(error.contains("install-plugin git failed"));
    }
}
