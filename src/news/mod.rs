//! News aggregation over Finnhub (paced, rate-limit aware) and Yahoo (unpaced).
//!
//! Both passes normalize into `NewsItem` and are simply concatenated by the
//! caller; the same story may show up once per provider.

use crate::config::ProviderConfig;
use crate::models::{NewsItem, NewsProvider, SkippedTicker};
use crate::providers::{FinnhubApi, FinnhubNewsItem, MarketDataSource, ProviderError, YahooNewsItem};
use crate::utils::{Lookback, SuffixFilter};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Sleeps applied between Finnhub calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// After every successful call.
    pub request_delay: Duration,
    /// After a rate-limit reply, before the next ticker.
    pub rate_limit_cooldown: Duration,
}

impl Pacing {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            request_delay: config.request_delay(),
            rate_limit_cooldown: config.rate_limit_cooldown(),
        }
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            request_delay: Duration::ZERO,
            rate_limit_cooldown: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub struct NewsBatch {
    pub items: Vec<NewsItem>,
    pub skipped: Vec<SkippedTicker>,
}

fn epoch_to_utc(secs: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|d| d.naive_utc())
}

/// One request per ticker over `[from_date, to_date]`.
///
/// A rate-limited ticker is not retried in this pass: the whole pass pauses
/// for the cooldown and moves on to the next ticker.
pub async fn fetch_finnhub_news(
    api: &dyn FinnhubApi,
    tickers: &[String],
    window: Lookback,
    filter: &SuffixFilter,
    pacing: Pacing,
) -> NewsBatch {
    let from = window.from_date();
    let to = window.to_date();
    let mut batch = NewsBatch::default();

    for ticker in tickers {
        if filter.is_excluded(ticker) {
            info!("Finnhub - skipping excluded ticker {}", ticker);
            continue;
        }

        match api.company_news(ticker, from, to).await {
            Ok(items) => {
                let before = batch.items.len();
                batch.items.extend(
                    items
                        .into_iter()
                        .filter_map(|item| normalize_finnhub(ticker, item))
                        .filter(|n| n.published_at.date() >= from),
                );
                debug!("{}: {} Finnhub headlines", ticker, batch.items.len() - before);
                sleep(pacing.request_delay).await;
            }
            Err(e) => {
                warn!("Bad Finnhub news response for {}: {}", ticker, e);
                let (cooldown, paced) = (e.is_rate_limit(), e.is_paced());
                batch.skipped.push(skipped(ticker, e));
                if cooldown {
                    info!("Cooling down for {:?}", pacing.rate_limit_cooldown);
                    sleep(pacing.rate_limit_cooldown).await;
                } else if paced {
                    sleep(pacing.request_delay).await;
                }
            }
        }
    }

    batch
}

fn skipped(ticker: &str, e: ProviderError) -> SkippedTicker {
    SkippedTicker {
        ticker: ticker.to_string(),
        stage: "news",
        reason: e.to_string(),
    }
}

fn normalize_finnhub(ticker: &str, item: FinnhubNewsItem) -> Option<NewsItem> {
    Some(NewsItem {
        ticker: ticker.to_string(),
        published_at: epoch_to_utc(item.datetime)?,
        headline: item.headline,
        source: item.source,
        provider: NewsProvider::Finnhub,
        link: item.url,
    })
}

/// Yahoo news published at or after the window cutoff. Failures are skipped quietly.
pub async fn fetch_yahoo_news(
    source: &dyn MarketDataSource,
    tickers: &[String],
    window: Lookback,
) -> Vec<NewsItem> {
    let cutoff = window.cutoff().naive_utc();
    let mut items = Vec::new();

    for ticker in tickers {
        match source.fetch_news(ticker).await {
            Ok(news) => items.extend(
                news.into_iter()
                    .filter_map(|item| normalize_yahoo(ticker, item))
                    .filter(|n| n.published_at >= cutoff),
            ),
            Err(e) => debug!("Yahoo news for {} skipped: {:#}", ticker, e),
        }
    }

    items
}

fn normalize_yahoo(ticker: &str, item: YahooNewsItem) -> Option<NewsItem> {
    Some(NewsItem {
        ticker: ticker.to_string(),
        published_at: epoch_to_utc(item.provider_publish_time?)?,
        headline: item.title,
        source: item.publisher,
        provider: NewsProvider::Yahoo,
        link: item.link,
    })
}
