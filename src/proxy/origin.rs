//! Origin oracle: learns our own public address from the echo service

use crate::error::OriginError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// Default timeout for the origin request in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct OriginEcho {
    origin: Option<String>,
}

/// Resolves the address the echo service sees when we connect directly
pub struct OriginOracle {
    client: Client,
    echo_host: String,
}

impl OriginOracle {
    pub fn with_echo_host(echo_host: impl Into<String>) -> Result<Self, OriginError> {
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            echo_host: echo_host.into(),
        })
    }

    /// Ask the echo service who we are
    pub async fn resolve(&self) -> Result<String, OriginError> {
        let url = format!("http://{}/get", self.echo_host);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OriginError::Status(status));
        }

        let body = response.text().await?;
        let echo: OriginEcho =
            serde_json::from_str(&body).map_err(|e| OriginError::Malformed(e.to_string()))?;
        let origin = echo
            .origin
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .ok_or_else(|| OriginError::Malformed("missing origin field".to_string()))?;

        info!("Current IP address: {}", origin);
        Ok(origin)
    }
}
