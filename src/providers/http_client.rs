use crate::config::ProviderConfig;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Raw HTTP reply; classification is left to each provider.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Yahoo hands out a session cookie that the crumb endpoint checks
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner })
    }

    /// Single GET, no retries. Timeouts and connection failures come back as `Err`.
    pub async fn get_text(&self, url: &Url) -> Result<HttpReply> {
        debug!("GET {}", redact(url));

        let resp = self
            .inner
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Request to {} failed", redact(url)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .context("Failed to read response body")?;

        Ok(HttpReply { status, body })
    }
}

/// URL without its query string, safe to log (the Finnhub token rides in it).
pub fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
