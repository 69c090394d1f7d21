use crate::api::{DailyClose, HistoryProvider, QuoteProvider};
use crate::models::PriceQuote;
use crate::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const TWELVEDATA_API_BASE: &str = "https://api.twelvedata.com";
const HTTP_TIMEOUT_SECS: u64 = 5;
const RATE_LIMIT_RPM: u32 = 55; // free tier headroom

// Type alias for the rate limiter to simplify signatures
type TwelveDataRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the Twelve Data API (secondary quote provider + daily history)
///
/// All numeric fields arrive as JSON strings. The client is cloneable; all
/// clones share one rate limiter so batch backfill cannot exceed the quota.
#[derive(Clone)]
pub struct TwelveDataClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<TwelveDataRateLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct QuoteRaw {
    symbol: String,
    close: String,
    thirty_day_high: String,
    sixty_day_high: String,
    month_change_percent: String,
    prev_month_change_percent: String,
    annualized_volatility: String,
    market_cap: String,
}

#[derive(Debug, Deserialize)]
struct SeriesRaw {
    values: Vec<SeriesValueRaw>,
}

#[derive(Debug, Deserialize)]
struct SeriesValueRaw {
    datetime: String,
    close: String,
}

// ============== Implementation ==============

impl TwelveDataClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, TWELVEDATA_API_BASE.to_string())
    }

    /// Point the client at an alternate base URL (test servers)
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());

        Self {
            client: Client::new(),
            api_key,
            base_url,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Rate-limited GET returning deserialized JSON
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("Twelve Data API error: {}", response.status()).into());
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl QuoteProvider for TwelveDataClient {
    fn name(&self) -> &'static str {
        "twelvedata"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<PriceQuote> {
        let url = format!(
            "{}/quote?symbol={}&apikey={}",
            self.base_url, symbol, self.api_key
        );

        let raw: QuoteRaw = self.get_json(&url).await?;

        Ok(PriceQuote {
            symbol: raw.symbol,
            price: raw.close.parse()?,
            high_30d: raw.thirty_day_high.parse()?,
            high_60d: raw.sixty_day_high.parse()?,
            percent_change_this_month: raw.month_change_percent.parse()?,
            percent_change_last_month: raw.prev_month_change_percent.parse()?,
            volatility: raw.annualized_volatility.parse()?,
            market_cap: raw.market_cap.parse()?,
            fetched_at: Utc::now(),
            stale: false,
        })
    }
}

#[async_trait]
impl HistoryProvider for TwelveDataClient {
    /// Daily closing prices, oldest first
    async fn daily_closes(&self, symbol: &str, days: u32) -> Result<Vec<DailyClose>> {
        let url = format!(
            "{}/time_series?symbol={}&interval=1day&outputsize={}&apikey={}",
            self.base_url, symbol, days, self.api_key
        );

        let raw: SeriesRaw = self.get_json(&url).await?;

        // API returns newest first
        let mut closes = Vec::with_capacity(raw.values.len());
        for value in raw.values.into_iter().rev() {
            let date = NaiveDate::parse_from_str(&value.datetime, "%Y-%m-%d")?;
            closes.push(DailyClose {
                date: Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)),
                close: value.close.parse()?,
            });
        }

        Ok(closes)
    }
}
