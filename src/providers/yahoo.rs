//! Yahoo Finance client: daily chart bars, quoteSummary fundamentals, news.
//!
//! quoteSummary needs a session cookie plus a "crumb" token; the crumb is
//! fetched once and reused until Yahoo answers 401.

use super::http_client::HttpClient;
use super::{MarketDataSource, YahooNewsItem};
use crate::config::ProviderConfig;
use crate::models::{DailyBar, Fundamentals, PriceSeries};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

const COOKIE_URL: &str = "https://fc.yahoo.com";

/// quoteSummary modules, in lookup priority order.
const SUMMARY_MODULES: [&str; 4] = ["summaryDetail", "financialData", "defaultKeyStatistics", "price"];

pub struct YahooClient {
    client: HttpClient,
    base_url: String,
    history_range: String,
    news_count: u32,
    crumb: Mutex<Option<String>>,
}

impl YahooClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: config.yahoo_base_url.trim_end_matches('/').to_string(),
            history_range: config.yahoo_history_range.clone(),
            news_count: config.yahoo_news_count,
            crumb: Mutex::new(None),
        })
    }

    fn url(&self, segments: &[&str], params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Bad Yahoo base URL {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Yahoo base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    async fn crumb(&self) -> Result<String> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // Only the Set-Cookie matters; the page itself is usually a 404.
        let cookie_url = Url::parse(COOKIE_URL)?;
        self.client.get_text(&cookie_url).await.ok();

        let reply = self
            .client
            .get_text(&self.url(&["v1", "test", "getcrumb"], &[])?)
            .await
            .context("Crumb request failed")?;
        let crumb = reply.body.trim().to_string();
        if !reply.status.is_success() || crumb.is_empty() || crumb.starts_with('{') {
            bail!("Yahoo refused a crumb (HTTP {})", reply.status);
        }

        debug!("Obtained Yahoo crumb");
        *cached = Some(crumb.clone());
        Ok(crumb)
    }
}

#[async_trait]
impl MarketDataSource for YahooClient {
    async fn fetch_price_history(&self, symbol: &str) -> Result<PriceSeries> {
        let url = self.url(
            &["v8", "finance", "chart", symbol],
            &[("range", self.history_range.as_str()), ("interval", "1d")],
        )?;
        let reply = self
            .client
            .get_text(&url)
            .await
            .with_context(|| format!("Chart request for {} failed", symbol))?;

        // Unknown symbols come back as 404 with a JSON error body.
        if !reply.status.is_success() && reply.status != StatusCode::NOT_FOUND {
            bail!("Chart for {}: HTTP {}", symbol, reply.status);
        }
        parse_chart(symbol, &reply.body)
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        let crumb = self.crumb().await?;
        let modules = SUMMARY_MODULES.join(",");
        let url = self.url(
            &["v10", "finance", "quoteSummary", symbol],
            &[("modules", modules.as_str()), ("crumb", crumb.as_str())],
        )?;
        let reply = self
            .client
            .get_text(&url)
            .await
            .with_context(|| format!("quoteSummary request for {} failed", symbol))?;

        if reply.status == StatusCode::UNAUTHORIZED {
            warn!("Yahoo crumb rejected; it will be refreshed on the next call");
            *self.crumb.lock().await = None;
            bail!("quoteSummary for {}: HTTP 401", symbol);
        }
        parse_quote_summary(symbol, &reply.body)
    }

    async fn fetch_news(&self, symbol: &str) -> Result<Vec<YahooNewsItem>> {
        let count = self.news_count.to_string();
        let url = self.url(
            &["v1", "finance", "search"],
            &[("q", symbol), ("quotesCount", "0"), ("newsCount", count.as_str())],
        )?;
        let reply = self.client.get_text(&url).await?;
        if !reply.status.is_success() {
            bail!("News search for {}: HTTP {}", symbol, reply.status);
        }

        let parsed: YahooSearchResponse =
            serde_json::from_str(&reply.body).context("Bad search payload")?;
        Ok(parsed.news)
    }
}

// ── Payload parsing ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooChartIndicators {
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct YahooSearchResponse {
    #[serde(default)]
    news: Vec<YahooNewsItem>,
}

fn api_error(error: &Option<Value>) -> Option<String> {
    match error {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(v) => Some(
            v.get("description")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| v.to_string()),
        ),
    }
}

/// Daily bars, oldest first. Bars missing any of OHLC are dropped.
pub fn parse_chart(symbol: &str, body: &str) -> Result<PriceSeries> {
    let resp: YahooChartResponse =
        serde_json::from_str(body).with_context(|| format!("Bad chart payload for {}", symbol))?;

    if let Some(msg) = api_error(&resp.chart.error) {
        bail!("Chart for {}: {}", symbol, msg);
    }

    let Some(result) = resp.chart.result.and_then(|r| r.into_iter().next()) else {
        bail!("Chart for {}: no result", symbol);
    };

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close)) = (
            field(&quote.open),
            field(&quote.high),
            field(&quote.low),
            field(&quote.close),
        ) else {
            continue;
        };
        let Some(when) = DateTime::from_timestamp(ts, 0) else {
            continue;
        };
        bars.push(DailyBar {
            date: when.date_naive(),
            open,
            high,
            low,
            close,
            volume: quote.volume.get(i).copied().flatten(),
        });
    }
    bars.sort_by_key(|b| b.date);

    debug!("{}: {} daily bars", symbol, bars.len());
    Ok(PriceSeries::new(symbol, bars))
}

/// Flatten the numeric fields of the summary modules into one map.
/// Earlier modules in `SUMMARY_MODULES` win on duplicate keys.
pub fn parse_quote_summary(symbol: &str, body: &str) -> Result<Fundamentals> {
    let json: Value = serde_json::from_str(body)
        .with_context(|| format!("Bad quoteSummary payload for {}", symbol))?;
    let summary = json
        .get("quoteSummary")
        .ok_or_else(|| anyhow!("quoteSummary for {}: missing envelope", symbol))?;

    if let Some(msg) = api_error(&summary.get("error").cloned()) {
        bail!("quoteSummary for {}: {}", symbol, msg);
    }

    let result = summary
        .get("result")
        .and_then(Value::as_array)
        .and_then(|r| r.first())
        .ok_or_else(|| anyhow!("quoteSummary for {}: no result", symbol))?;

    let mut fundamentals = Fundamentals::new();
    for module in SUMMARY_MODULES {
        let Some(Value::Object(fields)) = result.get(module) else {
            continue;
        };
        for (key, value) in fields {
            if fundamentals.get(key).is_some() {
                continue;
            }
            if let Some(v) = raw_number(value) {
                fundamentals.insert(key.clone(), v);
            }
        }
    }
    debug!("{}: {} fundamentals", symbol, fundamentals.len());
    Ok(fundamentals)
}

/// Yahoo wraps most numbers as `{"raw": 1.2, "fmt": "1.2"}`; `{}` means no value.
fn raw_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(o) => o.get("raw").and_then(Value::as_f64),
        _ => None,
    }
}
