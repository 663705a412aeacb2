//! Backend API client
//!
//! The console only reads from the honeypot backend: the event log, the
//! aggregate statistics and the plain-text raw logs of one protocol.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::future::Future;

use crate::config::BackendConfig;

/// Base path of every backend endpoint
pub const API_BASE_PATH: &str = "/api";

/// Read side of the honeypot backend
pub trait Backend: Send + Sync + 'static {
    /// `GET /logs`: raw event payload, expected to be an array
    fn fetch_logs(&self) -> impl Future<Output = Result<Value>> + Send;

    /// `GET /stats`: raw statistics payload
    fn fetch_stats(&self) -> impl Future<Output = Result<Value>> + Send;

    /// `GET /raw-logs?protocol=...`: opaque text blob
    fn fetch_raw_logs(&self, protocol: &str) -> impl Future<Output = Result<String>> + Send;
}

/// HTTP implementation of [`Backend`]
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(cfg: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: normalize_base_url(&cfg.base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_BASE_PATH, path)
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "GET {} returned status {}: {}",
                url,
                status,
                text.trim()
            ));
        }

        Ok(response)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        self.get(path, &[])
            .await?
            .json::<Value>()
            .await
            .with_context(|| format!("Malformed JSON from {}", path))
    }
}

impl Backend for HttpBackend {
    async fn fetch_logs(&self) -> Result<Value> {
        self.get_json("/logs").await
    }

    async fn fetch_stats(&self) -> Result<Value> {
        self.get_json("/stats").await
    }

    async fn fetch_raw_logs(&self, protocol: &str) -> Result<String> {
        self.get("/raw-logs", &[("protocol", protocol)])
            .await?
            .text()
            .await
            .context("Failed to read raw log body")
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix(API_BASE_PATH)
        .unwrap_or(trimmed)
        .to_string()
}
