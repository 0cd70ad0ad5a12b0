//! Refresh orchestrator: providers → indicators → merge → storage.
//!
//! ## Stages
//!
//! 1. Load the watch table and derive the ticker universe from its `Ticker` column.
//! 2. For each ticker, fetch history + fundamentals and compute one indicator row.
//!    Fetch failures are recorded as skipped; empty history is omitted silently.
//! 3. Merge the rows into the table and save it.
//! 4. News (Finnhub, then Yahoo) replaces the stored news region.
//! 5. Insider trades (Finnhub) replace the stored insider region.
//!
//! Tickers are processed one at a time; the Finnhub news pass is paced.

use crate::config::AppConfig;
use crate::indicators;
use crate::insider::fetch_insider_trades;
use crate::merge::merge;
use crate::models::{KeyedRow, NewsItem, SkippedTicker};
use crate::news::{fetch_finnhub_news, fetch_yahoo_news, Pacing};
use crate::providers::{FinnhubApi, FinnhubClient, MarketDataSource, YahooClient};
use crate::storage::{Repository, RunSummary};
use crate::utils::{Lookback, SuffixFilter};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<RefreshReport> {
        let repo = Repository::open(&self.config.storage.db_path)
            .context("Failed to open DuckDB")?;

        if self.config.storage.run_migrations {
            repo.run_migrations()?;
        }

        let yahoo = YahooClient::new(&self.config.providers)
            .context("Failed to build Yahoo client")?;

        let finnhub = match self.config.providers.finnhub_api_key.as_deref() {
            Some(key) => Some(
                FinnhubClient::new(&self.config.providers, key)
                    .context("Failed to build Finnhub client")?,
            ),
            None => {
                warn!("No Finnhub API key configured; Finnhub news and insider trades are skipped");
                None
            }
        };

        self.run_with(
            &repo,
            &yahoo,
            finnhub.as_ref().map(|c| c as &dyn FinnhubApi),
            Utc::now(),
        )
        .await
    }

    /// One full refresh against explicit sources and clock.
    ///
    /// A storage failure part way through closes the run log entry as `error`.
    pub async fn run_with(
        &self,
        repo: &Repository,
        market: &dyn MarketDataSource,
        finnhub: Option<&dyn FinnhubApi>,
        now: DateTime<Utc>,
    ) -> Result<RefreshReport> {
        let run_id = repo.begin_refresh_run()?;

        match self.refresh(repo, market, finnhub, now).await {
            Ok(report) => {
                repo.finish_refresh_run(run_id, &report.summary())?;
                Ok(report)
            }
            Err(e) => {
                if let Err(log_err) = repo.fail_refresh_run(run_id, &format!("{:#}", e)) {
                    warn!("Could not close refresh run {}: {:#}", run_id, log_err);
                }
                Err(e)
            }
        }
    }

    async fn refresh(
        &self,
        repo: &Repository,
        market: &dyn MarketDataSource,
        finnhub: Option<&dyn FinnhubApi>,
        now: DateTime<Utc>,
    ) -> Result<RefreshReport> {
        // ── 1. Ticker universe ────────────────────────────────────────────────
        let table = repo.load_watch_table()?;
        let tickers = table.tickers();
        info!("=== Step 1: {} tickers in watch table ===", tickers.len());

        let mut skipped: Vec<SkippedTicker> = Vec::new();

        // ── 2. Indicators ─────────────────────────────────────────────────────
        info!("=== Step 2: Computing indicators ===");
        let mut rows: Vec<KeyedRow> = Vec::with_capacity(tickers.len());
        for ticker in &tickers {
            match self.indicator_row(market, ticker).await {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => debug!("{}: no price history, omitted", ticker),
                Err(e) => {
                    warn!("{}: {:#}", ticker, e);
                    skipped.push(SkippedTicker {
                        ticker: ticker.clone(),
                        stage: "indicators",
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        // ── 3. Merge + save ───────────────────────────────────────────────────
        let rows_updated = rows.len();
        let merged = merge(table, &rows);
        repo.save_watch_table(&merged)?;
        info!("=== Step 3: {} rows merged into watch table ===", rows_updated);

        // ── 4. News ───────────────────────────────────────────────────────────
        info!("=== Step 4: Fetching news ===");
        let filter = SuffixFilter::new(&self.config.pipeline.excluded_suffixes);
        let news_window = Lookback::new(now, self.config.pipeline.news_days);

        let mut news: Vec<NewsItem> = Vec::new();
        if let Some(api) = finnhub {
            let pacing = Pacing::from_config(&self.config.providers);
            let batch = fetch_finnhub_news(api, &tickers, news_window, &filter, pacing).await;
            news.extend(batch.items);
            skipped.extend(batch.skipped);
        }
        news.extend(fetch_yahoo_news(market, &tickers, news_window).await);
        let news_rows = repo.replace_news(&news)?;

        // ── 5. Insider trades ─────────────────────────────────────────────────
        let insider_rows = match finnhub {
            Some(api) => {
                info!("=== Step 5: Fetching insider trades ===");
                let window = Lookback::new(now, self.config.pipeline.insider_days);
                let trades = fetch_insider_trades(api, &tickers, window, &filter).await;
                repo.replace_insider_trades(&trades)?
            }
            None => repo.replace_insider_trades(&[])?,
        };

        let report = RefreshReport {
            tickers: tickers.len(),
            rows_updated,
            news_rows,
            insider_rows,
            skipped,
        };

        info!(
            "=== Done: {} tickers | {} rows | {} news | {} insider | {} skipped ===",
            report.tickers,
            report.rows_updated,
            report.news_rows,
            report.insider_rows,
            report.skipped.len(),
        );

        Ok(report)
    }

    async fn indicator_row(
        &self,
        market: &dyn MarketDataSource,
        ticker: &str,
    ) -> Result<Option<KeyedRow>> {
        let series = market
            .fetch_price_history(ticker)
            .await
            .with_context(|| format!("fetch_price_history({})", ticker))?;
        let fundamentals = market
            .fetch_fundamentals(ticker)
            .await
            .with_context(|| format!("fetch_fundamentals({})", ticker))?;

        if fundamentals.is_empty() {
            debug!("{}: no fundamentals, ratio columns left blank", ticker);
        }
        if !series.is_empty() {
            debug!("{}: {} bars", ticker, series.len());
        }
        Ok(indicators::compute(&series, &fundamentals).map(|row| row.to_keyed_row()))
    }
}

#[derive(Debug, Default)]
pub struct RefreshReport {
    pub tickers: usize,
    pub rows_updated: usize,
    pub news_rows: usize,
    pub insider_rows: usize,
    pub skipped: Vec<SkippedTicker>,
}

impl RefreshReport {
    fn summary(&self) -> RunSummary {
        RunSummary {
            tickers_requested: self.tickers,
            rows_updated: self.rows_updated,
            news_rows: self.news_rows,
            insider_rows: self.insider_rows,
            skipped: self.skipped.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, DailyBar, Fundamentals, PriceSeries, WatchRow, WatchTable};
    use crate::providers::fakes::{FakeFinnhub, FakeMarket};
    use crate::providers::{FinnhubInsiderRecord, FinnhubNewsItem, ProviderError, YahooNewsItem};
    use chrono::{Duration, NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    fn pipeline() -> Pipeline {
        let mut config = AppConfig::default();
        config.providers.request_delay_ms = 0;
        config.providers.rate_limit_cooldown_secs = 0;
        Pipeline::new(config)
    }

    fn repo_with(tickers: &[&str]) -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        let mut table = WatchTable::new(vec!["Notes".into()]);
        for t in tickers {
            let mut row = WatchRow::new(*t);
            row.set("Notes", CellValue::Text(format!("{t} notes")));
            table.push(row);
        }
        repo.save_watch_table(&table).unwrap();
        repo
    }

    fn series(symbol: &str, days: usize) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let bars = (0..days)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.1;
                DailyBar {
                    date: start + Duration::days(i as i64),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: Some(1_000 + i as i64),
                }
            })
            .collect();
        PriceSeries::new(symbol, bars)
    }

    fn market() -> FakeMarket {
        let mut m = FakeMarket::default();
        m.history.insert("AAPL".into(), series("AAPL", 260));
        m.history.insert("RY.TO".into(), series("RY.TO", 40));
        m.history.insert("NEW".into(), PriceSeries::new("NEW", vec![]));
        m.fundamentals.insert(
            "AAPL".into(),
            Fundamentals::from_iter([("trailingPE".to_string(), 28.5)]),
        );
        m.news.insert(
            "AAPL".into(),
            vec![YahooNewsItem {
                provider_publish_time: Some(now().timestamp() - 3_600),
                title: Some("Apple ships".into()),
                publisher: Some("Reuters".into()),
                link: Some("https://example.com/a".into()),
            }],
        );
        m
    }

    #[tokio::test]
    async fn refresh_updates_table_news_and_insider() {
        let repo = repo_with(&["AAPL", "RY.TO", "NEW", "GONE"]);
        let mut finnhub = FakeFinnhub::default();
        finnhub.news.insert(
            "AAPL".into(),
            Ok(vec![FinnhubNewsItem {
                datetime: now().timestamp() - 7_200,
                headline: Some("Apple beats".into()),
                source: Some("CNBC".into()),
                url: Some("https://example.com/b".into()),
            }]),
        );
        finnhub.insider.insert(
            "AAPL".into(),
            Ok(vec![FinnhubInsiderRecord {
                name: Some("COOK TIMOTHY D".into()),
                ..Default::default()
            }]),
        );

        let report = pipeline()
            .run_with(&repo, &market(), Some(&finnhub as &dyn FinnhubApi), now())
            .await
            .unwrap();

        assert_eq!(report.tickers, 4);
        assert_eq!(report.rows_updated, 2);
        assert_eq!(report.news_rows, 2);
        assert_eq!(report.insider_rows, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].ticker, "GONE");
        assert_eq!(report.skipped[0].stage, "indicators");

        let table = repo.load_watch_table().unwrap();
        let aapl = table.row("AAPL").unwrap();
        assert_eq!(aapl.get("Notes"), &CellValue::Text("AAPL notes".into()));
        assert_eq!(aapl.get("P/E"), &CellValue::Number(28.5));
        assert!(matches!(aapl.get("Current Price"), CellValue::Number(_)));
        assert!(table.row("NEW").unwrap().get("Current Price").is_null());
        assert_eq!(table.len(), 4);

        let calls = finnhub.calls();
        assert!(!calls.iter().any(|c| c.ends_with("RY.TO")));
    }

    #[tokio::test]
    async fn finnhub_failures_are_reported_and_do_not_abort() {
        let repo = repo_with(&["AAPL"]);
        let mut finnhub = FakeFinnhub::default();
        finnhub.news.insert(
            "AAPL".into(),
            Err(ProviderError::RateLimited("API limit reached".into())),
        );
        finnhub.insider.insert(
            "AAPL".into(),
            Err(ProviderError::Denied("You don't have access to this resource.".into())),
        );

        let report = pipeline()
            .run_with(&repo, &market(), Some(&finnhub as &dyn FinnhubApi), now())
            .await
            .unwrap();

        assert_eq!(report.rows_updated, 1);
        assert_eq!(report.news_rows, 1);
        assert_eq!(report.insider_rows, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].stage, "news");

        let run = repo.last_run().unwrap().unwrap();
        assert_eq!(run.status, "partial");
    }

    #[tokio::test]
    async fn without_finnhub_only_yahoo_news_is_stored() {
        let repo = repo_with(&["AAPL"]);

        let report = pipeline().run_with(&repo, &market(), None, now()).await.unwrap();

        assert_eq!(report.news_rows, 1);
        assert_eq!(report.insider_rows, 0);
        let news = repo.load_news().unwrap();
        assert_eq!(news[0].headline.as_deref(), Some("Apple ships"));
        assert_eq!(repo.last_run().unwrap().unwrap().status, "success");
    }

    #[tokio::test]
    async fn second_refresh_overwrites_news_region() {
        let repo = repo_with(&["AAPL"]);
        let p = pipeline();

        p.run_with(&repo, &market(), None, now()).await.unwrap();
        p.run_with(&repo, &market(), None, now()).await.unwrap();

        assert_eq!(repo.news_count().unwrap(), 1);
        assert_eq!(repo.watch_row_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn storage_failure_marks_run_as_error() {
        let repo = repo_with(&["AAPL"]);
        repo.execute_batch("DROP TABLE news;").unwrap();

        let result = pipeline().run_with(&repo, &market(), None, now()).await;

        assert!(result.is_err());
        let run = repo.last_run().unwrap().unwrap();
        assert_eq!(run.status, "error");
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn empty_table_is_a_no_op() {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();

        let report = tokio_test::assert_ok!(pipeline().run_with(&repo, &market(), None, now()).await);

        assert_eq!(report.tickers, 0);
        assert!(report.skipped.is_empty());
        assert!(repo.load_watch_table().unwrap().is_empty());
    }
}
