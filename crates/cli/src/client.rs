//! API client for communicating with the guardian agent

use anyhow::{Context, Result};
use guardian_lib::brownout::BrownoutProfile;
use guardian_lib::models::GuardianStatusSnapshot;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

/// API client for the guardian control surface
pub struct GuardianClient {
    client: Client,
    base_url: Url,
}

impl GuardianClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Fetch the guardian status snapshot
    pub async fn status(&self) -> Result<GuardianStatusSnapshot> {
        self.get("/health").await
    }

    /// Fetch the active brownout profile
    pub async fn profile(&self) -> Result<BrownoutProfile> {
        self.get("/admin/profile").await
    }

    /// Activate a brownout level
    pub async fn activate_brownout(&self, level: &str) -> Result<BrownoutProfile> {
        self.post("/admin/brownout", &serde_json::json!({ "level": level }))
            .await
    }

    /// Restore the primary profile
    pub async fn deactivate_brownout(&self) -> Result<BrownoutProfile> {
        let url = self
            .base_url
            .join("/admin/brownout")
            .context("Invalid path")?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;
        Self::parse(response).await
    }

    /// Switch the served model
    pub async fn set_model(&self, model: &str) -> Result<serde_json::Value> {
        self.post("/admin/model", &serde_json::json!({ "model": model }))
            .await
    }

    /// Set the context window
    pub async fn set_context_window(&self, value: u32) -> Result<serde_json::Value> {
        self.post("/admin/context-window", &serde_json::json!({ "value": value }))
            .await
    }

    /// Set the retrieval depth
    pub async fn set_rag_top_k(&self, value: u32) -> Result<serde_json::Value> {
        self.post("/admin/rag-top-k", &serde_json::json!({ "value": value }))
            .await
    }

    /// Enable or disable heavy tools
    pub async fn set_tools_heavy(&self, enabled: bool) -> Result<serde_json::Value> {
        self.post("/admin/tools-heavy", &serde_json::json!({ "enabled": enabled }))
            .await
    }

    /// Request an emergency reset
    pub async fn emergency_reset(&self) -> Result<serde_json::Value> {
        self.post("/admin/emergency-reset", &serde_json::json!({}))
            .await
    }

    /// Make a GET request
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;
        Self::parse(response).await
    }

    /// Make a POST request with JSON body
    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}
