use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime settings, loaded from environment variables (with `.env` support
/// via dotenvy in main)
///
/// Every field has a default except the provider API keys, so the bot can
/// start against local Redis/Postgres with nothing but keys configured.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub finnhub_api_key: String,
    pub twelvedata_api_key: String,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default)]
    pub database_url: Option<String>,

    /// Quote cache refresh cadence inside the trading window, minutes
    #[serde(default = "default_quote_refresh")]
    pub quote_refresh_minutes: u64,
    /// Decision recompute cadence inside the trading window, minutes
    #[serde(default = "default_decision_refresh")]
    pub decision_refresh_minutes: u64,
    /// Risk recompute cadence inside the trading window, minutes
    #[serde(default = "default_risk_refresh")]
    pub risk_refresh_minutes: u64,
    /// Hour (UTC) at which the daily volatility + backfill jobs run
    #[serde(default = "default_daily_hour")]
    pub daily_job_hour: u32,

    /// Trading window open, "HH:MM" UTC
    #[serde(default = "default_market_open")]
    pub market_open: String,
    /// Trading window close, "HH:MM" UTC
    #[serde(default = "default_market_close")]
    pub market_close: String,

    /// Distributed lock TTL, seconds. Must exceed the expected job runtime.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_quote_refresh() -> u64 {
    15
}
fn default_decision_refresh() -> u64 {
    5
}
fn default_risk_refresh() -> u64 {
    2
}
fn default_daily_hour() -> u32 {
    1
}
fn default_market_open() -> String {
    "13:30".to_string()
}
fn default_market_close() -> String {
    "20:00".to_string()
}
fn default_lock_ttl() -> u64 {
    300
}

impl Settings {
    /// Load settings from the process environment
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("Failed to read environment configuration")?
            .try_deserialize::<Settings>()
            .context("Missing or invalid settings (are the provider API keys set?)")?;

        Ok(settings)
    }
}
