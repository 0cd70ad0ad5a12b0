//! Sheet-shaped CSV export of the three stored regions.

use crate::models::{InsiderTransaction, NewsItem, WatchTable, TICKER_COLUMN};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const WATCHLIST_FILE: &str = "watchlist.csv";
pub const NEWS_FILE: &str = "news.csv";
pub const INSIDER_FILE: &str = "insider_trades.csv";

const NEWS_HEADERS: [&str; 6] = ["Ticker", "Date", "Headline", "Source", "API", "Link"];
const INSIDER_HEADERS: [&str; 6] = ["Ticker", "Date", "Name", "Transaction Type", "Shares", "Price"];
const NEWS_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug)]
pub struct ExportPaths {
    pub watchlist: PathBuf,
    pub news: PathBuf,
    pub insider: PathBuf,
}

/// Write all three regions into `dir`, creating it if needed.
pub fn export_all(
    dir: &Path,
    table: &WatchTable,
    news: &[NewsItem],
    trades: &[InsiderTransaction],
) -> Result<ExportPaths> {
    std::fs::create_dir_all(dir).with_context(|| format!("Could not create dir {:?}", dir))?;

    let paths = ExportPaths {
        watchlist: dir.join(WATCHLIST_FILE),
        news: dir.join(NEWS_FILE),
        insider: dir.join(INSIDER_FILE),
    };

    write_watchlist(create(&paths.watchlist)?, table)?;
    write_news(create(&paths.news)?, news)?;
    write_insider_trades(create(&paths.insider)?, trades)?;

    info!(
        "Exported {} rows, {} headlines, {} insider trades to {:?}",
        table.len(),
        news.len(),
        trades.len(),
        dir
    );
    Ok(paths)
}

fn create(path: &Path) -> Result<std::fs::File> {
    std::fs::File::create(path).with_context(|| format!("Cannot create {:?}", path))
}

pub fn write_watchlist<W: Write>(out: W, table: &WatchTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    let mut header = vec![TICKER_COLUMN];
    header.extend(table.columns.iter().map(String::as_str));
    wtr.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![row.ticker.clone()];
        record.extend(table.columns.iter().map(|c| row.get(c).to_string()));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_news<W: Write>(out: W, items: &[NewsItem]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(NEWS_HEADERS)?;

    for item in items {
        wtr.write_record([
            item.ticker.clone(),
            item.published_at.format(NEWS_DATE_FORMAT).to_string(),
            item.headline.clone().unwrap_or_default(),
            item.source.clone().unwrap_or_default(),
            item.provider.as_str().to_string(),
            item.link.as_deref().map(hyperlink).unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_insider_trades<W: Write>(out: W, trades: &[InsiderTransaction]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(INSIDER_HEADERS)?;

    for t in trades {
        wtr.write_record([
            t.ticker.clone(),
            t.transaction_date.clone().unwrap_or_default(),
            t.insider_name.clone().unwrap_or_default(),
            t.transaction_code.clone().unwrap_or_default(),
            t.shares.map(|v| v.to_string()).unwrap_or_default(),
            t.price.map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Spreadsheet formula that renders `url` as a clickable link.
pub fn hyperlink(url: &str) -> String {
    let url = url.replace('"', "\"\"");
    format!("=HYPERLINK(\"{url}\", \"{url}\")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, NewsProvider, WatchRow};
    use chrono::NaiveDate;

    fn to_string(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn watchlist_renders_flags_and_blanks() {
        let mut table = WatchTable::new(vec!["Current Price".into(), "SMA crossover".into(), "P/E".into()]);
        let mut row = WatchRow::new("AAPL");
        row.set("Current Price", CellValue::Number(150.5));
        row.set("SMA crossover", CellValue::Bool(false));
        table.push(row);

        let out = to_string(|buf| write_watchlist(buf, &table));

        assert_eq!(out, "Ticker,Current Price,SMA crossover,P/E\nAAPL,150.5,No,\n");
    }

    #[test]
    fn news_rows_carry_formatted_date_and_hyperlink() {
        let items = vec![NewsItem {
            ticker: "AAPL".into(),
            published_at: NaiveDate::from_ymd_opt(2024, 6, 3)
                .unwrap()
                .and_hms_opt(9, 5, 30)
                .unwrap(),
            headline: Some("Apple, again".into()),
            source: Some("Reuters".into()),
            provider: NewsProvider::Finnhub,
            link: Some("https://example.com/a".into()),
        }];

        let out = to_string(|buf| write_news(buf, &items));
        let mut reader = csv::Reader::from_reader(out.as_bytes());
        let record = reader.records().next().unwrap().unwrap();

        assert_eq!(&record[0], "AAPL");
        assert_eq!(&record[1], "2024-06-03 09:05");
        assert_eq!(&record[2], "Apple, again");
        assert_eq!(&record[4], "finnhub");
        assert_eq!(
            &record[5],
            "=HYPERLINK(\"https://example.com/a\", \"https://example.com/a\")"
        );
    }

    #[test]
    fn missing_link_leaves_cell_empty() {
        let items = vec![NewsItem {
            ticker: "XOM".into(),
            published_at: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            headline: None,
            source: None,
            provider: NewsProvider::Yahoo,
            link: None,
        }];
        let out = to_string(|buf| write_news(buf, &items));
        assert!(out.ends_with("XOM,2024-01-01 00:00,,,yahoo,\n"));
    }

    #[test]
    fn export_all_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let trades = vec![InsiderTransaction {
            ticker: "NVDA".into(),
            transaction_date: Some("2024-03-01".into()),
            insider_name: Some("HUANG JEN HSUN".into()),
            transaction_code: Some("S".into()),
            shares: Some(12000.0),
            price: None,
        }];

        let paths = export_all(dir.path(), &WatchTable::default(), &[], &trades).unwrap();

        assert_eq!(std::fs::read_to_string(&paths.watchlist).unwrap(), "Ticker\n");
        assert_eq!(
            std::fs::read_to_string(&paths.news).unwrap(),
            "Ticker,Date,Headline,Source,API,Link\n"
        );
        let insider = std::fs::read_to_string(&paths.insider).unwrap();
        assert!(insider.contains("NVDA,2024-03-01,HUANG JEN HSUN,S,12000,\n"));
    }
}
