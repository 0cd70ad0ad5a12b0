//! Insider transaction aggregation (Finnhub).
//!
//! Unlike the news pass there is no pacing and no cooldown: any failed ticker
//! is logged at debug level and contributes nothing.

use crate::models::InsiderTransaction;
use crate::providers::{FinnhubApi, FinnhubInsiderRecord};
use crate::utils::{Lookback, SuffixFilter};
use tracing::debug;

pub async fn fetch_insider_trades(
    api: &dyn FinnhubApi,
    tickers: &[String],
    window: Lookback,
    filter: &SuffixFilter,
) -> Vec<InsiderTransaction> {
    let from = window.from_date();
    let to = window.to_date();
    let mut trades = Vec::new();

    for ticker in tickers {
        if filter.is_excluded(ticker) {
            continue;
        }

        match api.insider_transactions(ticker, from, to).await {
            Ok(records) => {
                debug!("{}: {} insider transactions", ticker, records.len());
                trades.extend(records.into_iter().map(|r| normalize(ticker, r)));
            }
            Err(e) => debug!("Insider trades for {} skipped: {}", ticker, e),
        }
    }

    trades
}

fn normalize(ticker: &str, record: FinnhubInsiderRecord) -> InsiderTransaction {
    InsiderTransaction {
        ticker: ticker.to_string(),
        transaction_date: record.transaction_date,
        insider_name: record.name,
        transaction_code: record.transaction_code,
        shares: record.share,
        price: record.transaction_price,
    }
}
