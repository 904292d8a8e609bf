//! Guardian status polling
//!
//! The gate fetches the guardian's status endpoint with a bounded timeout.
//! Any failure, timeout, or unparseable body surfaces as an error that the
//! gate maps to the unknown mode; nothing here ever reaches a request
//! handler as an exception.

use super::GateMode;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// One successfully polled status
#[derive(Debug, Clone)]
pub struct FetchedStatus {
    pub mode: GateMode,
    pub detail: String,
}

/// Trait for status endpoint pollers
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Poll the guardian once; must complete within the configured timeout
    async fn fetch(&self) -> Result<FetchedStatus>;
}

/// Wire shape of the status endpoint body
#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
    #[serde(default)]
    detail_status: Option<String>,
}

/// Map the published status string onto a gate mode
///
/// `emergency` stops traffic, `degraded` throttles inference, anything
/// else counts as healthy.
pub fn mode_from_status(status: &str) -> GateMode {
    match status {
        "emergency" => GateMode::Stop,
        "degraded" => GateMode::Degrade,
        _ => GateMode::Ok,
    }
}

/// HTTP poller for the guardian status endpoint
pub struct HttpStatusFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpStatusFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create status fetch client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl StatusFetcher for HttpStatusFetcher {
    async fn fetch(&self) -> Result<FetchedStatus> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Status fetch failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Status endpoint returned {}", response.status());
        }

        let body: HealthBody = response
            .json()
            .await
            .context("Status body was not valid JSON")?;

        let detail = body.detail_status.unwrap_or_else(|| body.status.clone());
        Ok(FetchedStatus {
            mode: mode_from_status(&body.status),
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_mapping() {
        assert_eq!(mode_from_status("emergency"), GateMode::Stop);
        assert_eq!(mode_from_status("degraded"), GateMode::Degrade);
        assert_eq!(mode_from_status("ok"), GateMode::Ok);
        // Unrecognized statuses count as healthy rather than blocking
        assert_eq!(mode_from_status("fine-ish"), GateMode::Ok);
    }
}
