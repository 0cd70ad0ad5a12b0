#[cfg(test)]
pub mod fakes;
pub mod finnhub;
pub mod http_client;
pub mod yahoo;

use crate::models::{Fundamentals, PriceSeries};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

pub use self::finnhub::FinnhubClient;
pub use self::yahoo::YahooClient;

// ── Provider reply taxonomy ───────────────────────────────────────────────────

/// Why a provider call produced no payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Transient: the caller may cool down before its next request.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Permanent for this ticker (no access, unknown resource, bad token).
    #[error("access denied: {0}")]
    Denied(String),

    /// An error reply that names neither access nor a limit.
    #[error("provider error: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    /// Network failure or timeout.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }

    /// Replies that still cost a request slot and are paced like a success.
    pub fn is_paced(&self) -> bool {
        matches!(self, ProviderError::Rejected(_))
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────────

/// One Finnhub `/company-news` item.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FinnhubNewsItem {
    /// Epoch seconds.
    pub datetime: i64,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// One Finnhub `/stock/insider-transactions` record.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinnhubInsiderRecord {
    #[serde(default)]
    pub transaction_date: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub transaction_code: Option<String>,
    #[serde(default)]
    pub share: Option<f64>,
    #[serde(default)]
    pub transaction_price: Option<f64>,
}

/// One Yahoo news item.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct YahooNewsItem {
    /// Epoch seconds; items without it are unusable.
    #[serde(default)]
    pub provider_publish_time: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

// ── Source traits ─────────────────────────────────────────────────────────────

/// Price history, fundamentals and news for one instrument (Yahoo).
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_price_history(&self, symbol: &str) -> Result<PriceSeries>;
    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals>;
    async fn fetch_news(&self, symbol: &str) -> Result<Vec<YahooNewsItem>>;
}

/// The two Finnhub endpoints used by the aggregators.
#[async_trait]
pub trait FinnhubApi: Send + Sync {
    async fn company_news(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FinnhubNewsItem>, ProviderError>;

    async fn insider_transactions(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FinnhubInsiderRecord>, ProviderError>;
}
