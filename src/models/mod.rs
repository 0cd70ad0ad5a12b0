use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Header of the key column in every tabular region.
pub const TICKER_COLUMN: &str = "Ticker";

// ── Price history ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<i64>,
}

/// Oldest bar first. One snapshot per refresh cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    pub bars: Vec<DailyBar>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<DailyBar>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn last(&self) -> Option<&DailyBar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn volumes(&self) -> Vec<Option<f64>> {
        self.bars.iter().map(|b| b.volume.map(|v| v as f64)).collect()
    }
}

// ── Fundamentals ──────────────────────────────────────────────────────────────

/// Named financial metrics as reported by the provider (e.g. `trailingPE`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Fundamentals(BTreeMap<String, f64>);

impl Fundamentals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        if value.is_finite() {
            self.0.insert(key.into(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Fundamentals {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut f = Fundamentals::new();
        for (k, v) in iter {
            f.insert(k, v);
        }
        f
    }
}

// ── Table cells ───────────────────────────────────────────────────────────────

/// One cell of a keyed table. `Null` is "absent", never zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn number(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => CellValue::Number(v),
            _ => CellValue::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Parse a raw spreadsheet cell: blank → Null, numeric → Number, else Text.
    ///
    /// Only numbers that render back to the same text become `Number`, so
    /// `00501` or `1.50` stay text and export unchanged.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return CellValue::Null;
        }
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() && v.to_string() == s => CellValue::Number(v),
            _ => CellValue::Text(s.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(true) => f.write_str("Yes"),
            CellValue::Bool(false) => f.write_str("No"),
            CellValue::Number(v) => write!(f, "{v}"),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::number(Some(v))
    }
}

impl From<Option<f64>> for CellValue {
    fn from(v: Option<f64>) -> Self {
        CellValue::number(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

/// A freshly computed row, keyed by ticker, columns in output order.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRow {
    pub ticker: String,
    pub cells: Vec<(String, CellValue)>,
}

impl KeyedRow {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            cells: Vec::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.cells.push((column.into(), value.into()));
        self
    }
}

// ── Watch table ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchRow {
    pub ticker: String,
    /// Missing key = absent cell.
    pub cells: BTreeMap<String, CellValue>,
}

impl WatchRow {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            cells: BTreeMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> &CellValue {
        static NULL: CellValue = CellValue::Null;
        self.cells.get(column).unwrap_or(&NULL)
    }

    pub fn set(&mut self, column: impl Into<String>, value: CellValue) {
        let column = column.into();
        if value.is_null() {
            self.cells.remove(&column);
        } else {
            self.cells.insert(column, value);
        }
    }
}

/// The persistent watch list: key column `Ticker` plus ordered extra columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchTable {
    /// Non-key columns, in display order.
    pub columns: Vec<String>,
    pub rows: Vec<WatchRow>,
}

impl WatchTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: WatchRow) {
        self.rows.push(row);
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    #[cfg(test)]
    pub fn row(&self, ticker: &str) -> Option<&WatchRow> {
        self.rows.iter().find(|r| r.ticker == ticker)
    }

    /// Refresh universe: non-blank tickers, first occurrence order, no repeats.
    pub fn tickers(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.rows
            .iter()
            .map(|r| r.ticker.trim())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.to_string()))
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ── News ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NewsProvider {
    Finnhub,
    Yahoo,
}

impl NewsProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsProvider::Finnhub => "finnhub",
            NewsProvider::Yahoo => "yahoo",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "finnhub" => Some(NewsProvider::Finnhub),
            "yahoo" => Some(NewsProvider::Yahoo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub ticker: String,
    pub published_at: NaiveDateTime, // UTC
    pub headline: Option<String>,
    pub source: Option<String>,
    pub provider: NewsProvider,
    pub link: Option<String>,
}

// ── Insider trades ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsiderTransaction {
    pub ticker: String,
    /// Provider-native date string, not parsed.
    pub transaction_date: Option<String>,
    pub insider_name: Option<String>,
    pub transaction_code: Option<String>,
    pub shares: Option<f64>,
    pub price: Option<f64>,
}

// ── Run bookkeeping ───────────────────────────────────────────────────────────

/// An instrument dropped from one stage of a refresh, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTicker {
    pub ticker: String,
    pub stage: &'static str,
    pub reason: String,
}

impl fmt::Display for SkippedTicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.ticker, self.stage, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_parse_distinguishes_blank_numbers_and_text() {
        assert_eq!(CellValue::parse("  "), CellValue::Null);
        assert_eq!(CellValue::parse("150.5"), CellValue::Number(150.5));
        assert_eq!(CellValue::parse("Tech"), CellValue::Text("Tech".into()));
        assert_eq!(CellValue::parse("NaN"), CellValue::Text("NaN".into()));
        assert_eq!(CellValue::parse("-42"), CellValue::Number(-42.0));
        assert_eq!(CellValue::parse("00501"), CellValue::Text("00501".into()));
        assert_eq!(CellValue::parse("1.50"), CellValue::Text("1.50".into()));
        assert_eq!(CellValue::parse("1e3"), CellValue::Text("1e3".into()));
    }

    #[test]
    fn non_finite_numbers_are_absent() {
        assert!(CellValue::number(Some(f64::NAN)).is_null());
        assert!(CellValue::number(Some(f64::INFINITY)).is_null());
        assert!(CellValue::number(None).is_null());
    }

    #[test]
    fn cell_json_is_untagged() {
        let cells = vec![
            CellValue::Bool(true),
            CellValue::Number(1.5),
            CellValue::Text("x".into()),
        ];
        let json = serde_json::to_string(&cells).unwrap();
        assert_eq!(json, r#"[true,1.5,"x"]"#);
        let back: Vec<CellValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cells);
    }

    #[test]
    fn tickers_skip_blanks_and_repeats() {
        let mut t = WatchTable::default();
        for sym in ["AAPL", " ", "MSFT", "AAPL", "SHOP.TO"] {
            t.push(WatchRow::new(sym));
        }
        assert_eq!(t.tickers(), vec!["AAPL", "MSFT", "SHOP.TO"]);
    }

    #[test]
    fn setting_null_removes_the_cell() {
        let mut row = WatchRow::new("AAPL");
        row.set("RSI", CellValue::Number(60.0));
        row.set("RSI", CellValue::Null);
        assert!(row.cells.is_empty());
        assert!(row.get("RSI").is_null());
    }
}
