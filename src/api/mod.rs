pub mod finnhub;
pub mod twelvedata;

pub use finnhub::FinnhubClient;
pub use twelvedata::TwelveDataClient;

use crate::models::PriceQuote;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A single daily closing price, oldest-first in series
#[derive(Debug, Clone, PartialEq)]
pub struct DailyClose {
    pub date: DateTime<Utc>,
    pub close: f64,
}

/// Common capability of every upstream price provider
///
/// The gateway is polymorphic over this trait: fallback order, retries and
/// circuit breaking never branch on a concrete provider type.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Short identifier used in logs and breaker status
    fn name(&self) -> &'static str;

    /// Fetch a fresh snapshot for one symbol. One attempt, no retries -
    /// the gateway owns the retry budget.
    async fn fetch_quote(&self, symbol: &str) -> Result<PriceQuote>;
}

/// Providers that can also serve daily history, used by the backfill job
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn daily_closes(&self, symbol: &str, days: u32) -> Result<Vec<DailyClose>>;
}
