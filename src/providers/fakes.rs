//! Scripted provider doubles for unit tests.

use super::{
    FinnhubApi, FinnhubInsiderRecord, FinnhubNewsItem, MarketDataSource, ProviderError,
    YahooNewsItem,
};
use crate::models::{Fundamentals, PriceSeries};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

/// Scripted Finnhub: unknown tickers answer with an empty list.
#[derive(Default)]
pub struct FakeFinnhub {
    pub news: HashMap<String, Result<Vec<FinnhubNewsItem>, ProviderError>>,
    pub insider: HashMap<String, Result<Vec<FinnhubInsiderRecord>, ProviderError>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeFinnhub {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FinnhubApi for FakeFinnhub {
    async fn company_news(
        &self,
        symbol: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<FinnhubNewsItem>, ProviderError> {
        self.calls.lock().unwrap().push(format!("news:{symbol}"));
        self.news.get(symbol).cloned().unwrap_or(Ok(vec![]))
    }

    async fn insider_transactions(
        &self,
        symbol: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<FinnhubInsiderRecord>, ProviderError> {
        self.calls.lock().unwrap().push(format!("insider:{symbol}"));
        self.insider.get(symbol).cloned().unwrap_or(Ok(vec![]))
    }
}

/// Scripted Yahoo: missing entries are failures.
#[derive(Default)]
pub struct FakeMarket {
    pub history: HashMap<String, PriceSeries>,
    pub fundamentals: HashMap<String, Fundamentals>,
    pub news: HashMap<String, Vec<YahooNewsItem>>,
}

#[async_trait]
impl MarketDataSource for FakeMarket {
    async fn fetch_price_history(&self, symbol: &str) -> Result<PriceSeries> {
        self.history
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("no history for {symbol}"))
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        Ok(self.fundamentals.get(symbol).cloned().unwrap_or_default())
    }

    async fn fetch_news(&self, symbol: &str) -> Result<Vec<YahooNewsItem>> {
        self.news
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("no news for {symbol}"))
    }
}
