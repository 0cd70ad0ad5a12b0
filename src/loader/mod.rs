//! CSV loader for seeding the watch table from a spreadsheet export.

use crate::models::{CellValue, WatchRow, WatchTable, TICKER_COLUMN};
use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Read a watch list CSV. Needs a `Ticker` header; every other column is kept.
pub fn load_watchlist_csv(path: &Path) -> Result<WatchTable> {
    let file = std::fs::File::open(path).with_context(|| format!("Cannot open {:?}", path))?;
    let table = read_watchlist(file).with_context(|| format!("Bad watch list {:?}", path))?;
    info!("{:?}: {} rows, {} columns", path, table.len(), table.columns.len());
    Ok(table)
}

pub fn read_watchlist<R: Read>(input: R) -> Result<WatchTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(input);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let Some(key_idx) = headers.iter().position(|h| h == TICKER_COLUMN) else {
        bail!("No {:?} column in header {:?}", TICKER_COLUMN, headers);
    };

    let mut columns: Vec<String> = Vec::new();
    for (i, h) in headers.iter().enumerate() {
        if i == key_idx {
            continue;
        }
        if h.is_empty() || columns.contains(h) {
            warn!("Ignoring blank or repeated column header {:?}", h);
            continue;
        }
        columns.push(h.clone());
    }

    let mut table = WatchTable::new(columns);
    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {}: {}", i + 1, e);
                continue;
            }
        };

        let ticker = record.get(key_idx).unwrap_or("").trim();
        if ticker.is_empty() {
            debug!("Row {}: no ticker, skipped", i + 1);
            continue;
        }

        let mut row = WatchRow::new(ticker);
        for (j, raw) in record.iter().enumerate() {
            let Some(header) = headers.get(j) else { continue };
            if j == key_idx || !table.has_column(header) {
                continue;
            }
            row.set(header.clone(), CellValue::parse(raw));
        }
        table.push(row);
    }

    Ok(table)
}
