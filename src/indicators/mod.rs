//! Indicator engine: one `IndicatorRow` per price series.
//!
//! Rolling statistics follow the "full window" rule: a window of `n` bars is
//! only evaluated when at least `n` bars exist, otherwise the value is absent.
//! EMAs use the adjusted-weight definition and are defined from the first bar.
//!
//! Edge cases:
//! - RSI with zero average loss over the window is 100 (flat windows included).
//! - A crossover flag is `false` when either average is absent.

use crate::models::{Fundamentals, KeyedRow, PriceSeries};
use serde::Serialize;

pub const WEEKS_52_BARS: usize = 252;
pub const VOLUME_AVG_BARS: usize = 30;
pub const RSI_PERIOD: usize = 14;
pub const SMA_FAST: usize = 50;
pub const SMA_SLOW: usize = 200;
pub const EMA_FAST_SPAN: usize = 9;
pub const EMA_SLOW_SPAN: usize = 21;

// Provider snapshot keys for the pass-through columns.
pub const KEY_TRAILING_PE: &str = "trailingPE";
pub const KEY_PRICE_TO_SALES: &str = "priceToSalesTrailing12Months";
pub const KEY_MARKET_CAP: &str = "marketCap";
pub const KEY_TOTAL_REVENUE: &str = "totalRevenue";
pub const KEY_REVENUE_GROWTH: &str = "revenueGrowth";
pub const KEY_GROSS_MARGINS: &str = "grossMargins";
pub const KEY_PROFIT_MARGINS: &str = "profitMargins";
pub const KEY_DEBT_TO_EQUITY: &str = "debtToEquity";
pub const KEY_EARNINGS_GROWTH: &str = "earningsQuarterlyGrowth";
pub const KEY_RETURN_ON_EQUITY: &str = "returnOnEquity";
pub const KEY_RETURN_ON_ASSETS: &str = "returnOnAssets";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndicatorRow {
    pub ticker: String,
    pub current_price: f64,
    pub open_price: f64,
    pub pct_change: Option<f64>,
    pub high_52w: Option<f64>,
    pub low_52w: Option<f64>,
    pub volume_today: Option<f64>,
    pub volume_avg_30: Option<f64>,
    pub rsi_14: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub sma_crossover: bool,
    pub ema_9: Option<f64>,
    pub ema_21: Option<f64>,
    pub ema_crossover: bool,

    pub pe: Option<f64>,
    pub ps: Option<f64>,
    pub market_cap: Option<f64>,
    pub revenue: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub gross_margin: Option<f64>,
    pub profit_margin: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub eps_growth: Option<f64>,
    pub roe: Option<f64>,
    pub roa: Option<f64>,
}

/// Compute the indicator row for one instrument.
///
/// Returns `None` for an empty series: the instrument is left out of the
/// refresh without being reported as a failure.
pub fn compute(series: &PriceSeries, fundamentals: &Fundamentals) -> Option<IndicatorRow> {
    let last = series.last()?;

    let closes = series.closes();
    let volumes = series.volumes();

    let sma_50 = rolling_mean(&closes, SMA_FAST);
    let sma_200 = rolling_mean(&closes, SMA_SLOW);
    let ema_9 = ema(&closes, EMA_FAST_SPAN);
    let ema_21 = ema(&closes, EMA_SLOW_SPAN);

    Some(IndicatorRow {
        ticker: series.symbol.clone(),
        current_price: last.close,
        open_price: last.open,
        pct_change: pct_change(last.open, last.close),
        high_52w: rolling_max(&series.highs(), WEEKS_52_BARS),
        low_52w: rolling_min(&series.lows(), WEEKS_52_BARS),
        volume_today: last.volume.map(|v| v as f64),
        volume_avg_30: rolling_mean_opt(&volumes, VOLUME_AVG_BARS),
        rsi_14: rsi(&closes, RSI_PERIOD),
        sma_50,
        sma_200,
        sma_crossover: crossed_above(sma_50, sma_200),
        ema_9,
        ema_21,
        ema_crossover: crossed_above(ema_9, ema_21),

        pe: fundamentals.get(KEY_TRAILING_PE),
        ps: fundamentals.get(KEY_PRICE_TO_SALES),
        market_cap: fundamentals.get(KEY_MARKET_CAP),
        revenue: fundamentals.get(KEY_TOTAL_REVENUE),
        revenue_growth: fundamentals.get(KEY_REVENUE_GROWTH),
        gross_margin: fundamentals.get(KEY_GROSS_MARGINS),
        profit_margin: fundamentals.get(KEY_PROFIT_MARGINS),
        debt_to_equity: fundamentals.get(KEY_DEBT_TO_EQUITY),
        eps_growth: fundamentals.get(KEY_EARNINGS_GROWTH),
        roe: fundamentals.get(KEY_RETURN_ON_EQUITY),
        roa: fundamentals.get(KEY_RETURN_ON_ASSETS),
    })
}

impl IndicatorRow {
    /// Column layout written into the watch table.
    pub fn to_keyed_row(&self) -> KeyedRow {
        KeyedRow::new(self.ticker.clone())
            .with("Current Price", self.current_price)
            .with("Price at open", self.open_price)
            .with("% Change", self.pct_change)
            .with("52W High", self.high_52w)
            .with("52W Low", self.low_52w)
            .with("Vol today", self.volume_today)
            .with("Vol Avg (30)", self.volume_avg_30)
            .with("RSI", self.rsi_14)
            .with("SMA50", self.sma_50)
            .with("SMA200", self.sma_200)
            .with("SMA crossover", self.sma_crossover)
            .with("EMA9", self.ema_9)
            .with("EMA21", self.ema_21)
            .with("EMA crossover", self.ema_crossover)
            .with("P/E", self.pe)
            .with("P/S", self.ps)
            .with("Market Cap", self.market_cap)
            .with("Revenue", self.revenue)
            .with("Rev (YoY)", self.revenue_growth)
            .with("Gross Margin", self.gross_margin)
            .with("Profit Margin", self.profit_margin)
            .with("Debt-to-Eq", self.debt_to_equity)
            .with("EPS Growth", self.eps_growth)
            .with("ROE", self.roe)
            .with("ROA", self.roa)
    }
}

// ── Series statistics ─────────────────────────────────────────────────────────

fn trailing<T>(values: &[T], window: usize) -> Option<&[T]> {
    if window == 0 || values.len() < window {
        return None;
    }
    Some(&values[values.len() - window..])
}

/// (close - open) / open * 100, absent when open is zero.
pub fn pct_change(open: f64, close: f64) -> Option<f64> {
    if open == 0.0 {
        return None;
    }
    let pct = (close - open) / open * 100.0;
    pct.is_finite().then_some(pct)
}

pub fn rolling_mean(values: &[f64], window: usize) -> Option<f64> {
    let w = trailing(values, window)?;
    Some(w.iter().sum::<f64>() / window as f64)
}

/// Mean over the trailing window; any gap inside the window makes it absent.
pub fn rolling_mean_opt(values: &[Option<f64>], window: usize) -> Option<f64> {
    let w = trailing(values, window)?;
    let sum = w.iter().copied().sum::<Option<f64>>()?;
    Some(sum / window as f64)
}

pub fn rolling_max(values: &[f64], window: usize) -> Option<f64> {
    trailing(values, window)?
        .iter()
        .copied()
        .reduce(f64::max)
}

pub fn rolling_min(values: &[f64], window: usize) -> Option<f64> {
    trailing(values, window)?
        .iter()
        .copied()
        .reduce(f64::min)
}

/// Adjusted-weight EMA with alpha = 2 / (span + 1), evaluated at the last value.
pub fn ema(values: &[f64], span: usize) -> Option<f64> {
    if values.is_empty() || span == 0 {
        return None;
    }
    let decay = 1.0 - 2.0 / (span as f64 + 1.0);
    let (mut num, mut den) = (0.0, 0.0);
    for &x in values {
        num = num * decay + x;
        den = den * decay + 1.0;
    }
    Some(num / den)
}

/// RSI from simple means of gains and losses over the last `period` deltas.
/// Needs `period + 1` closes.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    let w = trailing(closes, period + 1)?;
    if period == 0 {
        return None;
    }

    let (mut gains, mut losses) = (0.0, 0.0);
    for pair in w.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

fn crossed_above(fast: Option<f64>, slow: Option<f64>) -> bool {
    matches!((fast, slow), (Some(f), Some(s)) if f > s)
}
