//! GitHub REST API client for webhook registration
//!
//! The token travels in the Authorization header only. GitHub answers 422
//! with "Hook already exists" when the webhook is already in place, which
//! this client treats as success so reruns converge.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::info;

pub struct GitHubClient {
    http: Client,
    token: String,
}

fn webhook_payload(callback_url: &str) -> serde_json::Value {
    json!({
        "name": "web",
        "active": true,
        "events": ["push"],
        "config": {
            "url": callback_url,
            "content_type": "json",
            "insecure_ssl": "0",
        },
    })
}

impl GitHubClient {
    pub fn new(token: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent("jenkins-provision")
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for the GitHub API")?;
        Ok(Self {
            http,
            token: token.to_string(),
        })
    }

    /// Create a push webhook on the repository, converging when it exists.
    pub async fn ensure_push_webhook(&self, owner: &str, repo: &str, callback_url: &str) -> Result<()> {
        let url = format!("https://api.github.com/repos/{}/{}/hooks", owner, repo);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&webhook_payload(callback_url))
            .send()
            .await
            .with_context(|| format!("Webhook request for {}/{} failed", owner, repo))?;

        let status = response.status();
        if status == StatusCode::CREATED {
            info!("✓ Webhook registered for {}/{}", owner, repo);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("Hook already exists") {
            info!("✓ Webhook already registered for {}/{}, skipping", owner, repo);
            return Ok(());
        }

        anyhow::bail!(
            "GitHub returned {} creating the webhook for {}/{}: {}",
            status,
            owner,
            repo,
            body.trim()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_payload_shape() {
        let payload = webhook_payload("http://203.0.113.9:8080/github-webhook/");
        assert_eq!(payload["name"], "web");
        assert_eq!(payload["events"][0], "push");
        assert_eq!(payload["config"]["url"], "http://203.0.113.9:8080/github-webhook/");
        assert_eq!(payload["config"]["content_type"], "json");
    }
}
