//! GCE metadata service client
//!
//! The instance learns its own external IP and obtains access tokens for
//! Google APIs from the metadata service. Both come from the link-local
//! endpoint, which only answers requests carrying the Metadata-Flavor header.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

const METADATA_BASE: &str = "http://metadata.google.internal/computeMetadata/v1";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct MetadataClient {
    http: Client,
}

impl MetadataClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for the metadata service")?;
        Ok(Self { http })
    }

    async fn get(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", METADATA_BASE, path);
        let response = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .with_context(|| format!("Metadata request to {} failed", path))?;

        if !response.status().is_success() {
            anyhow::bail!("Metadata service returned {} for {}", response.status(), path);
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read metadata response for {}", path))
    }

    /// External IP of the first network interface.
    pub async fn external_ip(&self) -> Result<String> {
        let ip = self
            .get("/instance/network-interfaces/0/access-configs/0/external-ip")
            .await?;
        Ok(ip.trim().to_string())
    }

    /// OAuth access token for the instance's default service account.
    pub async fn access_token(&self) -> Result<String> {
        let body = self.get("/instance/service-accounts/default/token").await?;
        let token: TokenResponse = serde_json::from_str(&body)
            .context("Failed to parse access token response from the metadata service")?;
        Ok(token.access_token)
    }
}
