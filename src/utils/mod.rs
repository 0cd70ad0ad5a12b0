use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::time::{Duration, Instant};
use tracing::info;

/// A wall-clock timer that logs how long a command took when dropped.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("Finished: {} (took {:.2?})", self.label, self.elapsed());
    }
}

/// Tickers that must never be sent to a given provider, by market suffix.
#[derive(Debug, Clone, Default)]
pub struct SuffixFilter {
    suffixes: Vec<String>,
}

impl SuffixFilter {
    pub fn new(suffixes: &[String]) -> Self {
        Self {
            suffixes: suffixes
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn is_excluded(&self, ticker: &str) -> bool {
        let ticker = ticker.trim().to_uppercase();
        self.suffixes.iter().any(|s| ticker.ends_with(s.as_str()))
    }
}

/// A trailing window of `days` ending at `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookback {
    pub now: DateTime<Utc>,
    pub days: i64,
}

impl Lookback {
    pub fn new(now: DateTime<Utc>, days: i64) -> Self {
        Self { now, days }
    }

    pub fn to_date(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub fn from_date(&self) -> NaiveDate {
        self.to_date() - ChronoDuration::days(self.days)
    }

    /// Instant-precision lower bound.
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.now - ChronoDuration::days(self.days)
    }
}

/// Format a large integer with thousands separators.
pub fn fmt_number(n: i64) -> String {
    let s = n.abs().to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    if n < 0 {
        result.push('-');
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fmt_number() {
        assert_eq!(fmt_number(1_234_567), "1,234,567");
        assert_eq!(fmt_number(0), "0");
        assert_eq!(fmt_number(-42_000), "-42,000");
    }

    #[test]
    fn suffix_filter_matches_case_insensitively() {
        let f = SuffixFilter::new(&[".TO".to_string(), " ".to_string()]);
        assert!(f.is_excluded("SHOP.TO"));
        assert!(f.is_excluded("shop.to"));
        assert!(!f.is_excluded("AAPL"));
        assert!(!f.is_excluded("TOST"));
        assert!(!SuffixFilter::default().is_excluded("SHOP.TO"));
    }

    #[test]
    fn lookback_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        let w = Lookback::new(now, 3);
        assert_eq!(w.to_date(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(w.from_date(), NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
        assert_eq!(w.cutoff(), Utc.with_ymd_and_hms(2024, 3, 7, 15, 30, 0).unwrap());
    }
}
