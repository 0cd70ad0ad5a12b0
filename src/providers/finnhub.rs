//! Finnhub REST client (company news + insider transactions).
//!
//! Finnhub reports failures as a JSON object `{"error": "..."}`, sometimes with
//! a 200 status. `classify` turns those into `ProviderError`s.

use super::http_client::{HttpClient, HttpReply};
use super::{FinnhubApi, FinnhubInsiderRecord, FinnhubNewsItem, ProviderError};
use crate::config::ProviderConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

pub struct FinnhubClient {
    client: HttpClient,
    base_url: String,
    token: String,
}

impl FinnhubClient {
    pub fn new(config: &ProviderConfig, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: config.finnhub_base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn endpoint_url(&self, path: &str, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Url> {
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        Url::parse_with_params(
            &format!("{}/{}", self.base_url, path),
            &[
                ("symbol", symbol),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("token", self.token.as_str()),
            ],
        )
        .with_context(|| format!("Bad Finnhub URL for {}", path))
    }

    async fn get_json(&self, url: &Url) -> Result<Value, ProviderError> {
        let reply = self
            .client
            .get_text(url)
            .await
            .map_err(|e| ProviderError::Transport(format!("{:#}", e)))?;
        decode_reply(&reply)
    }
}

#[async_trait]
impl FinnhubApi for FinnhubClient {
    async fn company_news(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FinnhubNewsItem>, ProviderError> {
        let url = self
            .endpoint_url("company-news", symbol, from, to)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let json = self.get_json(&url).await?;
        parse_news(json)
    }

    async fn insider_transactions(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FinnhubInsiderRecord>, ProviderError> {
        let url = self
            .endpoint_url("stock/insider-transactions", symbol, from, to)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let json = self.get_json(&url).await?;
        parse_insider(json)
    }
}

// ── Reply decoding ────────────────────────────────────────────────────────────

/// Map a Finnhub error message onto the reply taxonomy.
pub fn classify(message: &str) -> ProviderError {
    let lower = message.to_lowercase();
    if lower.contains("access") || lower.contains("resource") {
        ProviderError::Denied(message.to_string())
    } else if lower.contains("limit") {
        ProviderError::RateLimited(message.to_string())
    } else {
        ProviderError::Rejected(message.to_string())
    }
}

fn decode_reply(reply: &HttpReply) -> Result<Value, ProviderError> {
    let parsed: Option<Value> = serde_json::from_str(&reply.body).ok();

    if let Some(message) = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
    {
        return Err(classify(message));
    }

    match reply.status {
        s if s.is_success() => {}
        StatusCode::TOO_MANY_REQUESTS => {
            return Err(ProviderError::RateLimited(format!("HTTP {}", reply.status)));
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            return Err(ProviderError::Denied(format!("HTTP {}", reply.status)));
        }
        s => return Err(ProviderError::Transport(format!("HTTP {}", s))),
    }

    parsed.ok_or_else(|| ProviderError::Malformed("body is not JSON".into()))
}

/// News payload is a bare array. Items that do not decode are dropped.
fn parse_news(json: Value) -> Result<Vec<FinnhubNewsItem>, ProviderError> {
    let Value::Array(items) = json else {
        return Err(ProviderError::Malformed("expected a list of news items".into()));
    };

    let total = items.len();
    let news: Vec<FinnhubNewsItem> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();

    if news.len() < total {
        debug!("Dropped {} undecodable news items", total - news.len());
    }
    Ok(news)
}

#[derive(Deserialize)]
struct InsiderEnvelope {
    data: Vec<Value>,
}

fn parse_insider(json: Value) -> Result<Vec<FinnhubInsiderRecord>, ProviderError> {
    let envelope: InsiderEnvelope = serde_json::from_value(json)
        .map_err(|e| ProviderError::Malformed(format!("insider payload: {}", e)))?;

    Ok(envelope
        .data
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: u16, body: &str) -> HttpReply {
        HttpReply {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        }
    }

    #[test]
    fn error_strings_are_classified() {
        assert!(matches!(
            classify("You don't have access to this resource."),
            ProviderError::Denied(_)
        ));
        assert!(matches!(
            classify("API limit reached. Please try again later."),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(classify("Invalid API key"), ProviderError::Rejected(_)));
    }

    #[test]
    fn error_body_wins_over_status() {
        let r = reply(200, r#"{"error": "rate limit exceeded"}"#);
        assert!(decode_reply(&r).unwrap_err().is_rate_limit());

        let r = reply(403, r#"{"error": "You don't have access to this resource."}"#);
        assert!(matches!(decode_reply(&r), Err(ProviderError::Denied(_))));
    }

    #[test]
    fn bare_status_codes_are_classified() {
        assert!(decode_reply(&reply(429, "Too Many Requests")).unwrap_err().is_rate_limit());
        assert!(matches!(decode_reply(&reply(401, "")), Err(ProviderError::Denied(_))));
        assert!(matches!(decode_reply(&reply(502, "")), Err(ProviderError::Transport(_))));
        assert!(matches!(decode_reply(&reply(200, "<html>")), Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn news_items_decode_leniently() {
        let json: Value = serde_json::from_str(
            r#"[
                {"datetime": 1700000000, "headline": "Up", "source": "Reuters", "url": "https://x/1"},
                {"headline": "no timestamp"},
                {"datetime": 1700000100}
            ]"#,
        )
        .unwrap();
        let news = parse_news(json).unwrap();
        assert_eq!(news.len(), 2);
        assert_eq!(news[0].headline.as_deref(), Some("Up"));
        assert_eq!(news[1].headline, None);
    }

    #[test]
    fn news_must_be_a_list() {
        let json: Value = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(matches!(parse_news(json), Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn insider_records_keep_missing_fields_absent() {
        let json: Value = serde_json::from_str(
            r#"{"symbol": "AAPL", "data": [
                {"name": "COOK TIMOTHY D", "share": 3280052, "transactionCode": "S",
                 "transactionDate": "2024-04-01", "transactionPrice": 171.2},
                {"name": "LEVINSON ARTHUR D"}
            ]}"#,
        )
        .unwrap();
        let records = parse_insider(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].share, Some(3_280_052.0));
        assert_eq!(records[0].transaction_code.as_deref(), Some("S"));
        assert_eq!(records[1].transaction_date, None);
        assert_eq!(records[1].transaction_price, None);
    }

    #[test]
    fn insider_without_data_is_malformed() {
        let json: Value = serde_json::from_str("[]").unwrap();
        assert!(matches!(parse_insider(json), Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn endpoint_url_carries_window_and_token() {
        let client = FinnhubClient::new(&ProviderConfig::default(), "tok").unwrap();
        let from = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 5, 4).unwrap();
        let url = client.endpoint_url("company-news", "AAPL", from, to).unwrap();
        assert_eq!(
            url.as_str(),
            "https://finnhub.io/api/v1/company-news?symbol=AAPL&from=2024-05-01&to=2024-05-04&token=tok"
        );
    }
}
