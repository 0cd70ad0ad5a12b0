use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream provider configuration (Finnhub + Yahoo)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_finnhub_base_url")]
    pub finnhub_base_url: String,

    /// Secret; usually supplied through `FINNHUB_API_KEY`.
    #[serde(default, skip_serializing)]
    pub finnhub_api_key: Option<String>,

    #[serde(default = "default_yahoo_base_url")]
    pub yahoo_base_url: String,

    #[serde(default = "default_yahoo_history_range")]
    pub yahoo_history_range: String,

    #[serde(default = "default_yahoo_news_count")]
    pub yahoo_news_count: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_rate_limit_cooldown_secs")]
    pub rate_limit_cooldown_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Refresh cycle configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_news_days")]
    pub news_days: i64,

    #[serde(default = "default_insider_days")]
    pub insider_days: i64,

    /// Tickers ending in one of these suffixes never reach Finnhub.
    #[serde(default = "default_excluded_suffixes")]
    pub excluded_suffixes: Vec<String>,
}

/// Log sink configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_true")]
    pub to_file: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_finnhub_base_url() -> String {
    "https://finnhub.io/api/v1".to_string()
}
fn default_yahoo_base_url() -> String {
    "https://query2.finance.yahoo.com".to_string()
}
fn default_yahoo_history_range() -> String {
    "2y".to_string()
}
fn default_yahoo_news_count() -> u32 {
    20
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_rate_limit_cooldown_secs() -> u64 {
    60
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) stock-watch/0.1".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/watch.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_news_days() -> i64 {
    3
}
fn default_insider_days() -> i64 {
    365
}
fn default_excluded_suffixes() -> Vec<String> {
    vec![".TO".to_string()]
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            finnhub_base_url: default_finnhub_base_url(),
            finnhub_api_key: None,
            yahoo_base_url: default_yahoo_base_url(),
            yahoo_history_range: default_yahoo_history_range(),
            yahoo_news_count: default_yahoo_news_count(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            news_days: default_news_days(),
            insider_days: default_insider_days(),
            excluded_suffixes: default_excluded_suffixes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            to_file: true,
        }
    }
}

impl ProviderConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("WATCH").separator("__"))
            .build()?;

        let mut app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;

        if app_cfg.providers.finnhub_api_key.is_none() {
            app_cfg.providers.finnhub_api_key = std::env::var("FINNHUB_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty());
        }

        Ok(app_cfg)
    }
}
