use crate::models::PriceQuote;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Cache entry with insert-time TTL tracking
///
/// Age is measured from the original fetch, never from last access, so a
/// hot entry cannot mask true staleness.
struct CacheEntry {
    quote: PriceQuote,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

/// Cache counters for the status endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub inserts: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    access_order: VecDeque<String>, // front = least recently used
    hits: u64,
    misses: u64,
    evictions: u64,
    inserts: u64,
}

/// Symbol-keyed quote cache with TTL freshness and LRU eviction
///
/// Expired entries are retained until evicted: the gateway serves them as an
/// explicitly-marked stale fallback when every provider is down.
pub struct QuoteCache {
    capacity: usize,
    ttl: Duration,
    inner: RwLock<CacheInner>,
}

impl QuoteCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                access_order: VecDeque::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
                inserts: 0,
            }),
        }
    }

    /// Return the cached quote if it is within the TTL window
    pub fn fresh(&self, symbol: &str) -> Option<PriceQuote> {
        let mut guard = self.inner.write().unwrap();
        let inner = &mut *guard;

        match inner.entries.get(symbol) {
            Some(entry) if entry.is_fresh(self.ttl) => {
                inner.hits += 1;
                touch(&mut inner.access_order, symbol);
                Some(entry.quote.clone())
            }
            _ => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Return the cached quote regardless of age, marked stale
    ///
    /// Used only after every provider has failed; does not count toward
    /// hit/miss statistics (the miss was already recorded by `fresh`).
    pub fn stale_fallback(&self, symbol: &str) -> Option<PriceQuote> {
        let inner = self.inner.read().unwrap();
        inner.entries.get(symbol).map(|entry| {
            let mut quote = entry.quote.clone();
            quote.stale = true;
            quote
        })
    }

    /// Insert a fresh quote, evicting the least recently used entry at capacity
    pub fn insert(&self, quote: PriceQuote) {
        let symbol = quote.symbol.clone();
        let mut guard = self.inner.write().unwrap();
        let inner = &mut *guard;

        if inner.entries.len() >= self.capacity && !inner.entries.contains_key(&symbol) {
            if let Some(lru) = inner.access_order.pop_front() {
                inner.entries.remove(&lru);
                inner.evictions += 1;
            }
        }

        inner.entries.insert(
            symbol.clone(),
            CacheEntry {
                quote,
                inserted_at: Instant::now(),
            },
        );
        inner.inserts += 1;
        touch(&mut inner.access_order, &symbol);
    }

    /// Drop all entries and reset the counters
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.entries.clear();
        inner.access_order.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
        inner.inserts = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read().unwrap();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            inserts: inner.inserts,
            size: inner.entries.len(),
            capacity: self.capacity,
        }
    }
}

fn touch(access_order: &mut VecDeque<String>, symbol: &str) {
    access_order.retain(|s| s != symbol);
    access_order.push_back(symbol.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn quote(symbol: &str, price: f64) -> PriceQuote {
        PriceQuote {
            symbol: symbol.to_string(),
            price,
            high_30d: price * 1.05,
            high_60d: price * 1.1,
            percent_change_this_month: 2.0,
            percent_change_last_month: -1.0,
            volatility: 0.2,
            market_cap: 1_000_000.0,
            fetched_at: Utc::now(),
            stale: false,
        }
    }

    #[test]
    fn test_fresh_hit_and_miss() {
        let cache = QuoteCache::new(10, Duration::from_secs(20));

        assert!(cache.fresh("AAPL").is_none());

        cache.insert(quote("AAPL", 190.0));
        let hit = cache.fresh("AAPL").unwrap();
        assert_eq!(hit.price, 190.0);
        assert!(!hit.stale);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_expired_entry_misses_but_survives_for_fallback() {
        let cache = QuoteCache::new(10, Duration::from_millis(10));
        cache.insert(quote("AAPL", 190.0));

        std::thread::sleep(Duration::from_millis(20));

        assert!(cache.fresh("AAPL").is_none());

        let stale = cache.stale_fallback("AAPL").unwrap();
        assert_eq!(stale.price, 190.0);
        assert!(stale.stale);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = QuoteCache::new(2, Duration::from_secs(20));

        cache.insert(quote("AAPL", 1.0));
        cache.insert(quote("MSFT", 2.0));

        // Touch AAPL so MSFT becomes the LRU entry
        cache.fresh("AAPL");

        cache.insert(quote("GOOG", 3.0));

        assert!(cache.fresh("MSFT").is_none());
        assert!(cache.fresh("AAPL").is_some());
        assert!(cache.fresh("GOOG").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_clear_resets_entries_and_counters() {
        let cache = QuoteCache::new(10, Duration::from_secs(20));
        cache.insert(quote("AAPL", 1.0));
        cache.fresh("AAPL");

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats {
            capacity: 10,
            ..Default::default()
        });
    }

    #[test]
    fn test_reinsert_refreshes_ttl() {
        let cache = QuoteCache::new(10, Duration::from_millis(30));
        cache.insert(quote("AAPL", 1.0));

        std::thread::sleep(Duration::from_millis(20));
        cache.insert(quote("AAPL", 2.0));
        std::thread::sleep(Duration::from_millis(20));

        // 40ms after the first insert, but only 20ms after the second
        let hit = cache.fresh("AAPL").unwrap();
        assert_eq!(hit.price, 2.0);
    }
}
