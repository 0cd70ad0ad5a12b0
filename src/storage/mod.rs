use crate::models::{CellValue, InsiderTransaction, NewsItem, NewsProvider, WatchRow, WatchTable};
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use duckdb::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
-- Overwrite regions are delete + re-insert in one transaction: no unique keys.

CREATE TABLE IF NOT EXISTS watch_columns (
    position    INTEGER NOT NULL,
    name        VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS watch_rows (
    position    INTEGER NOT NULL,
    ticker      VARCHAR NOT NULL
);

-- Absent cells have no row here. Values are JSON scalars.
CREATE TABLE IF NOT EXISTS watch_cells (
    row_position  INTEGER NOT NULL,
    column_name   VARCHAR NOT NULL,
    value         VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS news (
    position      INTEGER   NOT NULL,
    ticker        VARCHAR   NOT NULL,
    published_at  TIMESTAMP NOT NULL,
    headline      VARCHAR,
    source        VARCHAR,
    provider      VARCHAR   NOT NULL,
    link          VARCHAR
);

CREATE TABLE IF NOT EXISTS insider_trades (
    position          INTEGER NOT NULL,
    ticker            VARCHAR NOT NULL,
    transaction_date  VARCHAR,
    insider_name      VARCHAR,
    transaction_code  VARCHAR,
    shares            DOUBLE,
    price             DOUBLE
);

CREATE SEQUENCE IF NOT EXISTS refresh_run_ids START 1;

CREATE TABLE IF NOT EXISTS refresh_runs (
    id                  INTEGER PRIMARY KEY DEFAULT nextval('refresh_run_ids'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    tickers_requested   INTEGER DEFAULT 0,
    rows_updated        INTEGER DEFAULT 0,
    news_rows           INTEGER DEFAULT 0,
    insider_rows        INTEGER DEFAULT 0,
    skipped             VARCHAR,
    error               VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_news_ticker    ON news (ticker);
CREATE INDEX IF NOT EXISTS idx_insider_ticker ON insider_trades (ticker);
"#;

/// Summary of one refresh cycle, as recorded in `refresh_runs`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub tickers_requested: usize,
    pub rows_updated: usize,
    pub news_rows: usize,
    pub insider_rows: usize,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub status: String,
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Watch table ───────────────────────────────────────────────────────────

    pub fn load_watch_table(&self) -> Result<WatchTable> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM watch_columns ORDER BY position")?;
        let columns: Vec<String> = stmt
            .query_map([], |r| r.get(0))?
            .collect::<duckdb::Result<_>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT position, ticker FROM watch_rows ORDER BY position")?;
        let keys: Vec<(i64, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<duckdb::Result<_>>()?;

        let mut table = WatchTable::new(columns);
        let mut index: HashMap<i64, usize> = HashMap::with_capacity(keys.len());
        for (position, ticker) in keys {
            index.insert(position, table.rows.len());
            table.push(WatchRow::new(ticker));
        }

        let mut stmt = self
            .conn
            .prepare("SELECT row_position, column_name, value FROM watch_cells")?;
        let cells = stmt.query_map([], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
        })?;

        for cell in cells {
            let (position, column, raw) = cell?;
            let Some(&i) = index.get(&position) else {
                warn!("Orphan watch cell at row {} ({})", position, column);
                continue;
            };
            let value: CellValue = serde_json::from_str(&raw)
                .with_context(|| format!("Bad cell value {:?} in column {}", raw, column))?;
            table.rows[i].set(column, value);
        }

        Ok(table)
    }

    /// Replace the whole watch table in one transaction.
    pub fn save_watch_table(&self, table: &WatchTable) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM watch_cells; DELETE FROM watch_rows; DELETE FROM watch_columns;",
        )?;

        for (position, name) in table.columns.iter().enumerate() {
            tx.execute(
                "INSERT INTO watch_columns (position, name) VALUES (?, ?)",
                params![position as i64, name],
            )?;
        }

        for (position, row) in table.rows.iter().enumerate() {
            tx.execute(
                "INSERT INTO watch_rows (position, ticker) VALUES (?, ?)",
                params![position as i64, row.ticker],
            )
            .with_context(|| format!("insert watch row {}", row.ticker))?;

            for (column, value) in &row.cells {
                if value.is_null() {
                    continue;
                }
                let raw = serde_json::to_string(value)?;
                tx.execute(
                    "INSERT INTO watch_cells (row_position, column_name, value) VALUES (?, ?, ?)",
                    params![position as i64, column, raw],
                )
                .with_context(|| format!("insert cell {}/{}", row.ticker, column))?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn watch_row_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM watch_rows")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    // ── News ──────────────────────────────────────────────────────────────────

    /// Full overwrite of the news region.
    pub fn replace_news(&self, items: &[NewsItem]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM news", [])?;

        for (position, n) in items.iter().enumerate() {
            tx.execute(
                r#"INSERT INTO news (position, ticker, published_at, headline, source, provider, link)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    position as i64,
                    n.ticker,
                    n.published_at,
                    n.headline,
                    n.source,
                    n.provider.as_str(),
                    n.link,
                ],
            )
            .with_context(|| format!("insert news for {}", n.ticker))?;
        }

        tx.commit()?;
        Ok(items.len())
    }

    pub fn load_news(&self) -> Result<Vec<NewsItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT ticker, published_at, headline, source, provider, link FROM news ORDER BY position",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, NaiveDateTime>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (ticker, published_at, headline, source, provider, link) = row?;
            let Some(provider) = NewsProvider::parse(&provider) else {
                warn!("Unknown news provider {:?} for {}", provider, ticker);
                continue;
            };
            items.push(NewsItem { ticker, published_at, headline, source, provider, link });
        }
        Ok(items)
    }

    pub fn news_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM news")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    // ── Insider trades ────────────────────────────────────────────────────────

    /// Full overwrite of the insider trade region.
    pub fn replace_insider_trades(&self, trades: &[InsiderTransaction]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM insider_trades", [])?;

        for (position, t) in trades.iter().enumerate() {
            tx.execute(
                r#"INSERT INTO insider_trades
                       (position, ticker, transaction_date, insider_name, transaction_code, shares, price)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    position as i64,
                    t.ticker,
                    t.transaction_date,
                    t.insider_name,
                    t.transaction_code,
                    t.shares,
                    t.price,
                ],
            )
            .with_context(|| format!("insert insider trade for {}", t.ticker))?;
        }

        tx.commit()?;
        Ok(trades.len())
    }

    pub fn load_insider_trades(&self) -> Result<Vec<InsiderTransaction>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT ticker, transaction_date, insider_name, transaction_code, shares, price
               FROM insider_trades ORDER BY position"#,
        )?;
        let trades = stmt
            .query_map([], |r| {
                Ok(InsiderTransaction {
                    ticker: r.get(0)?,
                    transaction_date: r.get(1)?,
                    insider_name: r.get(2)?,
                    transaction_code: r.get(3)?,
                    shares: r.get(4)?,
                    price: r.get(5)?,
                })
            })?
            .collect::<duckdb::Result<_>>()?;
        Ok(trades)
    }

    pub fn insider_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM insider_trades")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    // ── Refresh run log ───────────────────────────────────────────────────────

    pub fn begin_refresh_run(&self) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO refresh_runs (started_at, status) VALUES (?, 'running') RETURNING id",
            params![Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_refresh_run(&self, run_id: i64, summary: &RunSummary) -> Result<()> {
        let skipped = if summary.skipped.is_empty() {
            None
        } else {
            Some(summary.skipped.join(", "))
        };
        self.conn.execute(
            r#"UPDATE refresh_runs SET
               finished_at = ?, status = ?,
               tickers_requested = ?, rows_updated = ?, news_rows = ?, insider_rows = ?,
               skipped = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if skipped.is_none() { "success" } else { "partial" },
                summary.tickers_requested as i64,
                summary.rows_updated as i64,
                summary.news_rows as i64,
                summary.insider_rows as i64,
                skipped,
                run_id,
            ],
        )?;
        Ok(())
    }

    /// Close a run that aborted part way; counts stay at their defaults.
    pub fn fail_refresh_run(&self, run_id: i64, error: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE refresh_runs SET finished_at = ?, status = 'error', error = ? WHERE id = ?",
            params![Utc::now().naive_utc(), error, run_id],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn last_run(&self) -> Result<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, status FROM refresh_runs ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map([], |r| {
            Ok(RunRecord {
                id: r.get(0)?,
                started_at: r.get(1)?,
                finished_at: r.get(2)?,
                status: r.get(3)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }
}
