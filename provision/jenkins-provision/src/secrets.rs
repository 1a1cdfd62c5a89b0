//! Secret Manager access
//!
//! Secret values are fetched straight from the Secret Manager REST API with
//! a metadata-service token. They stay in memory; every error path reports
//! the secret NAME only.

use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: Payload,
}

#[derive(Debug, Deserialize)]
struct Payload {
    data: String,
}

pub struct SecretClient {
    http: Client,
    project: String,
}

impl SecretClient {
    pub fn new(project: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for Secret Manager")?;
        Ok(Self {
            http,
            project: project.to_string(),
        })
    }

    /// Fetch the latest version of a secret as UTF-8 text.
    pub async fn access(&self, access_token: &str, secret_name: &str) -> Result<String> {
        let url = format!(
            "https://secretmanager.googleapis.com/v1/projects/{}/secrets/{}/versions/latest:access",
            self.project, secret_name
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .with_context(|| format!("Secret Manager request for {} failed", secret_name))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Secret Manager returned {} for {}",
                response.status(),
                secret_name
            );
        }

        let access: AccessResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Secret Manager response for {}", secret_name))?;

        let bytes = STANDARD
            .decode(access.payload.data.as_bytes())
            .with_context(|| format!("Secret {} payload is not valid base64", secret_name))?;

        let value = String::from_utf8(bytes)
            .map_err(|_| anyhow::anyhow!("Secret {} payload is not valid UTF-8", secret_name))?;

        Ok(value.trim_end_matches('\n').to_string())
    }
}
