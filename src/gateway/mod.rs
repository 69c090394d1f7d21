pub mod breaker;
pub mod cache;

pub use breaker::{BreakerConfig, BreakerState, BreakerStatus};
pub use cache::CacheStats;

use crate::api::QuoteProvider;
use crate::models::PriceQuote;
use breaker::{Attempt, CircuitBreaker};
use cache::QuoteCache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

const CACHE_CAPACITY: usize = 1000;
const CACHE_TTL_SECS: u64 = 20;
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// Gateway failure taxonomy
///
/// Transient provider errors never surface here - they are retried, then
/// recorded on the breaker. Callers only ever see the end states.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no provider could serve {symbol} and no cached value exists")]
    NoData { symbol: String },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Attempts per provider per operation
    pub retry_attempts: u32,
    /// First backoff delay; doubles on each subsequent attempt
    pub retry_base_delay: Duration,
    pub breaker: BreakerConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_capacity: CACHE_CAPACITY,
            cache_ttl: Duration::from_secs(CACHE_TTL_SECS),
            retry_attempts: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            breaker: BreakerConfig::default(),
        }
    }
}

struct ProviderSlot {
    provider: Arc<dyn QuoteProvider>,
    breaker: CircuitBreaker,
}

struct GatewayInner {
    slots: Vec<ProviderSlot>,
    cache: QuoteCache,
    config: GatewayConfig,
}

/// Multi-provider market-data gateway
///
/// Owns the quote cache and one circuit breaker per provider. Providers are
/// tried in priority order; a provider whose breaker is open is skipped
/// without a network call. Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

/// Snapshot of gateway health for status queries
#[derive(Debug, Clone)]
pub struct GatewayStatus {
    pub breakers: Vec<BreakerStatus>,
    pub cache: CacheStats,
}

impl Gateway {
    pub fn new(providers: Vec<Arc<dyn QuoteProvider>>) -> Self {
        Self::with_config(providers, GatewayConfig::default())
    }

    pub fn with_config(providers: Vec<Arc<dyn QuoteProvider>>, config: GatewayConfig) -> Self {
        let slots = providers
            .into_iter()
            .map(|provider| ProviderSlot {
                provider,
                breaker: CircuitBreaker::new(config.breaker.clone()),
            })
            .collect();

        Self {
            inner: Arc::new(GatewayInner {
                slots,
                cache: QuoteCache::new(config.cache_capacity, config.cache_ttl),
                config,
            }),
        }
    }

    /// Fetch a quote, serving from cache when fresh
    ///
    /// Degrades to the last cached value (marked stale) when every provider
    /// fails; errors only when no cached value exists at all.
    pub async fn fetch_quote(&self, symbol: &str) -> Result<PriceQuote, GatewayError> {
        if let Some(quote) = self.inner.cache.fresh(symbol) {
            return Ok(quote);
        }

        for slot in &self.inner.slots {
            let attempt = match slot.breaker.try_acquire() {
                Some(attempt) => attempt,
                None => {
                    tracing::debug!(
                        "Skipping {} for {} (circuit open)",
                        slot.provider.name(),
                        symbol
                    );
                    continue;
                }
            };

            let attempts = match attempt {
                Attempt::Normal => self.inner.config.retry_attempts,
                Attempt::Probe => 1,
            };

            match self.try_provider(slot, symbol, attempts).await {
                Ok(quote) => {
                    slot.breaker.record_success();
                    self.inner.cache.insert(quote.clone());
                    return Ok(quote);
                }
                Err(e) => {
                    slot.breaker.record_failure();
                    tracing::warn!(
                        "Provider {} exhausted for {}: {}",
                        slot.provider.name(),
                        symbol,
                        e
                    );
                }
            }
        }

        // Every provider failed or was skipped - degrade to stale data
        match self.inner.cache.stale_fallback(symbol) {
            Some(quote) => {
                tracing::warn!("⚠ Serving stale quote for {} (all providers down)", symbol);
                Ok(quote)
            }
            None => Err(GatewayError::NoData {
                symbol: symbol.to_string(),
            }),
        }
    }

    /// Fetch quotes for many symbols with full fan-out parallelism
    ///
    /// One symbol's failure never fails the batch; failed symbols are simply
    /// absent from the result map.
    pub async fn fetch_quotes(&self, symbols: &[String]) -> HashMap<String, PriceQuote> {
        let mut seen = std::collections::HashSet::new();
        let mut handles = Vec::new();

        for symbol in symbols {
            if !seen.insert(symbol.clone()) {
                continue;
            }
            let gateway = self.clone();
            let symbol = symbol.clone();
            handles.push((
                symbol.clone(),
                tokio::spawn(async move { gateway.fetch_quote(&symbol).await }),
            ));
        }

        let mut quotes = HashMap::new();
        for (symbol, handle) in handles {
            match handle.await {
                Ok(Ok(quote)) => {
                    quotes.insert(symbol, quote);
                }
                Ok(Err(e)) => {
                    tracing::warn!("  ✗ {} fetch failed: {}", symbol, e);
                }
                Err(e) => {
                    tracing::error!("  ✗ fetch task for {} aborted: {}", symbol, e);
                }
            }
        }

        quotes
    }

    /// One provider operation: bounded retries with exponential backoff
    async fn try_provider(
        &self,
        slot: &ProviderSlot,
        symbol: &str,
        attempts: u32,
    ) -> crate::Result<PriceQuote> {
        let mut last_error = None;

        for attempt in 1..=attempts {
            match slot.provider.fetch_quote(symbol).await {
                Ok(quote) => {
                    if attempt > 1 {
                        tracing::info!(
                            "✓ {} served {} after {} attempts",
                            slot.provider.name(),
                            symbol,
                            attempt
                        );
                    }
                    return Ok(quote);
                }
                Err(e) => {
                    last_error = Some(e);

                    if attempt < attempts {
                        let backoff =
                            self.inner.config.retry_base_delay * 2u32.pow(attempt - 1);
                        tracing::warn!(
                            "Attempt {}/{} failed for {} via {}: {}. Retrying in {:?}...",
                            attempt,
                            attempts,
                            symbol,
                            slot.provider.name(),
                            last_error.as_ref().unwrap(),
                            backoff
                        );
                        sleep(backoff).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| "all retry attempts failed".into()))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            breakers: self
                .inner
                .slots
                .iter()
                .map(|slot| BreakerStatus {
                    provider: slot.provider.name(),
                    state: slot.breaker.state(),
                    failures: slot.breaker.failure_count(),
                })
                .collect(),
            cache: self.inner.cache.stats(),
        }
    }
}
