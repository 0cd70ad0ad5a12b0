//! Reconciles freshly computed rows into the persisted watch table.
//!
//! - New columns are appended after the existing ones, in first-seen order.
//! - Only tickers already in the table are updated; unknown tickers are dropped.
//! - Every fresh column overwrites the matching cell, absent values included.
//! - Untouched rows and columns are preserved as-is.
//!
//! A ticker listed twice in the table has every copy updated. A ticker listed
//! twice in the fresh set resolves to its last occurrence.

use crate::models::{KeyedRow, WatchTable, TICKER_COLUMN};
use std::collections::HashMap;
use tracing::debug;

pub fn merge(mut existing: WatchTable, fresh: &[KeyedRow]) -> WatchTable {
    for row in fresh {
        for (column, _) in &row.cells {
            if column != TICKER_COLUMN && !existing.has_column(column) {
                existing.columns.push(column.clone());
            }
        }
    }

    let by_ticker: HashMap<&str, &KeyedRow> =
        fresh.iter().map(|r| (r.ticker.as_str(), r)).collect();

    let mut updated = 0usize;
    for row in existing.rows.iter_mut() {
        let Some(update) = by_ticker.get(row.ticker.as_str()) else {
            continue;
        };
        for (column, value) in &update.cells {
            if column != TICKER_COLUMN {
                row.set(column.clone(), value.clone());
            }
        }
        updated += 1;
    }

    debug!(
        "Merged {} fresh rows into {} of {} table rows",
        fresh.len(),
        updated,
        existing.len()
    );
    existing
}
