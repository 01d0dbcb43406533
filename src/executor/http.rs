//! Outbound HTTP seam used by `http` webhooks and secondary notifications.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

#[async_trait]
pub trait WebClient: Send + Sync {
    /// Issue a request and return the response status code.
    async fn request(&self, method: &str, url: &str, body: Option<&Value>) -> Result<u16>;
}

/// `reqwest` client with a fixed request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebClient for ReqwestClient {
    async fn request(&self, method: &str, url: &str, body: Option<&Value>) -> Result<u16> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| anyhow!("Invalid HTTP method '{method}'"))?;
        debug!(target: "telepwn::http", %method, %url, "Sending request");
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.context("HTTP request failed")?;
        Ok(response.status().as_u16())
    }
}
