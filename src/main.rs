mod config;
mod export;
mod indicators;
mod insider;
mod loader;
mod merge;
mod models;
mod news;
mod pipeline;
mod providers;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{AppConfig, LoggingConfig};
use crate::loader::load_watchlist_csv;
use crate::pipeline::Pipeline;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "stock-watch", about = "Per-ticker indicators, news and insider trades", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Replace the watch table with the contents of a CSV file (needs a Ticker column)
    Import {
        path: PathBuf,
    },

    /// Recompute indicators, news and insider trades for every watched ticker
    Refresh,

    /// Write watchlist.csv, news.csv and insider_trades.csv
    Export {
        #[arg(short, long, default_value = "export")]
        dir: PathBuf,
    },

    /// Show database statistics
    Stats,

    /// List watched ticker symbols
    Symbols,

    /// Apply schema migrations without loading data
    Migrate,
}

fn init_logging(verbose: u8, logging: &LoggingConfig) -> Result<Option<PathBuf>> {
    let filter = match verbose {
        0 => "stock_watch=info,warn",
        1 => "stock_watch=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let (file_layer, log_path) = if logging.to_file {
        let path = session_log_path(&logging.log_dir);
        std::fs::create_dir_all(&logging.log_dir)
            .with_context(|| format!("Could not create log dir {:?}", logging.log_dir))?;
        let file = File::create(&path).with_context(|| format!("Cannot create {:?}", path))?;
        let layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file));
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(log_path)
}

fn session_log_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    dir.join(format!("log_{stamp}.txt"))
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;

    if let Some(path) = init_logging(cli.verbose, &config.logging)? {
        info!("Logging to {:?}", path);
    }

    match cli.command {
        Command::Import { path } => {
            let _t = utils::Timer::start("Watch list import");
            let repo = open_repo(&config)?;
            let table = load_watchlist_csv(&path)?;
            repo.save_watch_table(&table)?;
            info!("Done: {} tickers imported", table.tickers().len());
        }

        Command::Refresh => {
            let _t = utils::Timer::start("Refresh");
            let report = Pipeline::new(config).run().await?;
            info!(
                "Done: {} tickers, {} rows updated, {} news, {} insider trades",
                report.tickers, report.rows_updated, report.news_rows, report.insider_rows
            );
            if report.skipped.is_empty() {
                println!("All tickers refreshed.");
            } else {
                println!("Skipped tickers ({}):", report.skipped.len());
                for s in &report.skipped {
                    println!("  {}", s);
                }
            }
        }

        Command::Export { dir } => {
            let repo = open_repo(&config)?;
            let table = repo.load_watch_table()?;
            let news = repo.load_news()?;
            let trades = repo.load_insider_trades()?;
            if table.is_empty() {
                warn!("Watch table is empty; run `stock-watch import` first");
            }
            let paths = export::export_all(&dir, &table, &news, &trades)?;
            println!("Wrote {:?}, {:?}, {:?}", paths.watchlist, paths.news, paths.insider);
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            let rows = repo.watch_row_count()?;
            let news = repo.news_count()?;
            let insider = repo.insider_count()?;
            let last = repo.last_run()?;
            println!("─────────────────────────────────");
            println!("  Stock Watch — Database Stats");
            println!("─────────────────────────────────");
            println!("  Tickers  : {}", utils::fmt_number(rows));
            println!("  News     : {}", utils::fmt_number(news));
            println!("  Insider  : {}", utils::fmt_number(insider));
            match last {
                Some(run) => {
                    println!("  Last run : #{} {} ({})", run.id, run.started_at.format("%Y-%m-%d %H:%M"), run.status);
                    if let Some(done) = run.finished_at {
                        println!("  Finished : {}", done.format("%Y-%m-%d %H:%M"));
                    }
                }
                None => println!("  Last run : —"),
            }
            println!("─────────────────────────────────");
        }

        Command::Symbols => {
            let repo = open_repo(&config)?;
            let syms = repo.load_watch_table()?.tickers();
            if syms.is_empty() {
                println!("No symbols — run `stock-watch import` first.");
            } else {
                println!("{} symbols:", syms.len());
                for s in &syms {
                    println!("  {}", s);
                }
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
