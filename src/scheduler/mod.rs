pub mod calendar;
pub mod lock;

pub use calendar::TradingCalendar;
pub use lock::{LockStore, MemoryLockStore, RedisLockStore};

use crate::analytics;
use crate::api::HistoryProvider;
use crate::db::PositionStore;
use crate::decision;
use crate::gateway::{Gateway, GatewayStatus};
use crate::models::{AlertSeverity, Position, PriceQuote};
use crate::notify::Notifier;
use crate::persistence::RedisHistory;
use crate::risk;
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant};
use uuid::Uuid;

const LOCK_RETRIES: u32 = 2;
const LOCK_RETRY_DELAY_MS: u64 = 250;
/// Days of daily closes the backfill job pulls per ticker
const HISTORY_DAYS: u32 = 30;
/// Retention window for stored closes
const HISTORY_RETENTION_DAYS: u32 = 90;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub quote_refresh_minutes: u64,
    pub decision_refresh_minutes: u64,
    pub risk_refresh_minutes: u64,
    /// Hour (UTC) for the daily volatility + backfill jobs
    pub daily_job_hour: u32,
    pub lock_ttl: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            quote_refresh_minutes: 15,
            decision_refresh_minutes: 5,
            risk_refresh_minutes: 2,
            daily_job_hour: 1,
            lock_ttl: Duration::from_secs(300),
        }
    }
}

/// What one decision-refresh pass changed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub updated: usize,
    pub notified: usize,
}

/// Full status snapshot for the external status endpoint
#[derive(Debug, Clone)]
pub struct CoreStatus {
    pub gateway: GatewayStatus,
    pub market_open: bool,
    pub next_quote_refresh: DateTime<Utc>,
    pub next_decision_refresh: DateTime<Utc>,
    pub next_risk_refresh: DateTime<Utc>,
}

/// Periodic orchestrator over gateway, engines and the position store
///
/// Every tick is a fresh attempt: a job either takes the distributed lock
/// and runs, or skips silently until the next tick. No job failure blocks
/// future ticks or other jobs.
pub struct Scheduler {
    gateway: Gateway,
    store: Arc<dyn PositionStore>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<dyn LockStore>,
    calendar: TradingCalendar,
    config: SchedulerConfig,
    history: Option<RedisHistory>,
    history_provider: Option<Arc<dyn HistoryProvider>>,
    /// Unique per process, so lock releases can be holder-checked
    holder: String,
    window_was_open: AtomicBool,
}

impl Scheduler {
    pub fn new(
        gateway: Gateway,
        store: Arc<dyn PositionStore>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<dyn LockStore>,
        calendar: TradingCalendar,
        config: SchedulerConfig,
    ) -> Self {
        let window_was_open = AtomicBool::new(calendar.is_open(Utc::now()));
        Self {
            gateway,
            store,
            notifier,
            locks,
            calendar,
            config,
            history: None,
            history_provider: None,
            holder: format!("stockbot-{}", Uuid::new_v4()),
            window_was_open,
        }
    }

    /// Wire up the daily history store + provider (backfill, volatility jobs)
    pub fn with_history(
        mut self,
        history: RedisHistory,
        provider: Arc<dyn HistoryProvider>,
    ) -> Self {
        self.history = Some(history);
        self.history_provider = Some(provider);
        self
    }

    // ========================================================================
    // Lock-guarded execution
    // ========================================================================

    /// Run a job body under the distributed lock for `job`
    ///
    /// Acquisition is retried a bounded number of times with a fixed delay;
    /// on contention the tick is skipped (Ok(None)) - the next tick tries
    /// again. The lock is released on completion, or expires via TTL if the
    /// process dies mid-job.
    async fn with_lock<T>(
        &self,
        job: &str,
        body: impl Future<Output = crate::Result<T>>,
    ) -> crate::Result<Option<T>> {
        let key = format!("lock:{}", job);

        let mut acquired = false;
        for attempt in 0..=LOCK_RETRIES {
            if self
                .locks
                .acquire(&key, &self.holder, self.config.lock_ttl)
                .await?
            {
                acquired = true;
                break;
            }
            if attempt < LOCK_RETRIES {
                sleep(Duration::from_millis(LOCK_RETRY_DELAY_MS)).await;
            }
        }

        if !acquired {
            tracing::debug!("⏭ {} skipped this tick (lock held elsewhere)", job);
            return Ok(None);
        }

        let result = body.await;

        if let Err(e) = self.locks.release(&key, &self.holder).await {
            tracing::warn!("Failed to release lock {}: {}", key, e);
        }

        result.map(Some)
    }

    // ========================================================================
    // Job bodies
    // ========================================================================

    /// Warm the quote cache for every distinct tracked ticker
    pub async fn run_quote_refresh(&self) -> crate::Result<usize> {
        let positions = self.store.load_positions().await?;
        let tickers = distinct_tickers(&positions);
        if tickers.is_empty() {
            return Ok(0);
        }

        let quotes = self.gateway.fetch_quotes(&tickers).await;
        tracing::info!(
            "🔄 Quote refresh: {}/{} tickers fetched",
            quotes.len(),
            tickers.len()
        );

        Ok(quotes.len())
    }

    /// Recompute every position's decision and persist what changed
    pub async fn run_decision_refresh(&self) -> crate::Result<RefreshOutcome> {
        let positions = self.store.load_positions().await?;
        let tickers = distinct_tickers(&positions);
        let quotes = self.gateway.fetch_quotes(&tickers).await;

        // Group by owner: one pass per user over their ticker set, fed from
        // the single batch fetch above
        let mut by_user: HashMap<Uuid, Vec<Position>> = HashMap::new();
        for position in positions {
            by_user.entry(position.user_id).or_default().push(position);
        }

        let mut outcome = RefreshOutcome::default();
        for (user_id, user_positions) in by_user {
            let user_outcome = apply_quotes(
                &user_positions,
                &quotes,
                self.store.as_ref(),
                self.notifier.as_ref(),
            )
            .await?;

            if user_outcome.updated > 0 {
                tracing::info!(
                    "  ✓ user {}: {} positions updated, {} action changes",
                    user_id,
                    user_outcome.updated,
                    user_outcome.notified
                );
            }

            outcome.updated += user_outcome.updated;
            outcome.notified += user_outcome.notified;
        }

        Ok(outcome)
    }

    /// Re-score every user's portfolio and log the alerts
    pub async fn run_risk_refresh(&self) -> crate::Result<usize> {
        let positions = self.store.load_positions().await?;
        let tickers = distinct_tickers(&positions);
        let quotes = self.gateway.fetch_quotes(&tickers).await;

        let mut by_user: HashMap<Uuid, Vec<Position>> = HashMap::new();
        for position in positions {
            by_user.entry(position.user_id).or_default().push(position);
        }

        let mut alert_count = 0;
        for (user_id, user_positions) in by_user {
            let report = risk::analyze_portfolio(&user_positions, &quotes);

            for warning in &report.warnings {
                tracing::warn!("  ⚠ user {}: {}", user_id, warning);
            }

            let alerts = report
                .position_risks
                .iter()
                .flat_map(|r| r.alerts.iter())
                .chain(report.alerts.iter());
            for alert in alerts {
                alert_count += 1;
                if alert.severity >= AlertSeverity::High {
                    tracing::warn!(
                        "  🚨 user {} [{:?}/{:?}]: {}",
                        user_id,
                        alert.kind,
                        alert.severity,
                        alert.message
                    );
                } else {
                    tracing::info!(
                        "  user {} [{:?}/{:?}]: {}",
                        user_id,
                        alert.kind,
                        alert.severity,
                        alert.message
                    );
                }
            }
        }

        Ok(alert_count)
    }

    /// Recompute realized volatility from stored history
    pub async fn run_daily_volatility(&self) -> crate::Result<usize> {
        let Some(history) = &self.history else {
            tracing::debug!("Volatility recompute skipped (no history store)");
            return Ok(0);
        };

        let positions = self.store.load_positions().await?;
        let mut computed = 0;

        for ticker in distinct_tickers(&positions) {
            let mut history = history.clone();
            match history.load_closes(&ticker, HISTORY_DAYS).await {
                Ok(closes) => {
                    let series: Vec<f64> = closes.iter().map(|c| c.close).collect();
                    match analytics::realized_volatility(&series) {
                        Some(vol) => {
                            tracing::info!(
                                "  📈 {} realized volatility {:.1}% over {} closes",
                                ticker,
                                vol,
                                series.len()
                            );
                            computed += 1;
                        }
                        None => {
                            tracing::debug!("  {} has too little history for volatility", ticker)
                        }
                    }
                }
                Err(e) => tracing::warn!("  ✗ Failed to load history for {}: {}", ticker, e),
            }
        }

        Ok(computed)
    }

    /// Pull daily close history for every tracked ticker into Redis
    pub async fn run_backfill(&self) -> crate::Result<usize> {
        let (Some(history), Some(provider)) = (&self.history, &self.history_provider) else {
            tracing::debug!("Backfill skipped (no history store/provider)");
            return Ok(0);
        };

        let positions = self.store.load_positions().await?;
        let mut backfilled = 0;

        for ticker in distinct_tickers(&positions) {
            match provider.daily_closes(&ticker, HISTORY_DAYS).await {
                Ok(closes) => {
                    let mut history = history.clone();
                    if let Err(e) = history.save_closes(&ticker, &closes).await {
                        tracing::warn!("  ✗ Failed to store history for {}: {}", ticker, e);
                        continue;
                    }
                    let _ = history.cleanup_old(&ticker, HISTORY_RETENTION_DAYS).await;
                    tracing::info!("  ✓ Backfilled {} closes for {}", closes.len(), ticker);
                    backfilled += 1;
                }
                Err(e) => {
                    tracing::warn!("  ✗ History fetch failed for {}: {}", ticker, e);
                }
            }
        }

        Ok(backfilled)
    }

    // ========================================================================
    // Manual triggers (interactive "refresh now")
    // ========================================================================

    /// Out-of-band quote refresh. None when the lock is busy.
    pub async fn trigger_refresh(&self) -> crate::Result<Option<usize>> {
        self.with_lock("quote_refresh", self.run_quote_refresh())
            .await
    }

    /// Out-of-band decision recompute. None when the lock is busy.
    pub async fn trigger_decision_update(&self) -> crate::Result<Option<RefreshOutcome>> {
        self.with_lock("decision_refresh", self.run_decision_refresh())
            .await
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn status(&self) -> CoreStatus {
        let now = Utc::now();
        CoreStatus {
            gateway: self.gateway.status(),
            market_open: self.calendar.is_open(now),
            next_quote_refresh: next_tick_time(now, self.config.quote_refresh_minutes),
            next_decision_refresh: next_tick_time(now, self.config.decision_refresh_minutes),
            next_risk_refresh: next_tick_time(now, self.config.risk_refresh_minutes),
        }
    }

    // ========================================================================
    // Loop spawning
    // ========================================================================

    /// Spawn all periodic loops. Returns their join handles.
    pub fn spawn_all(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        // Loop 1: quote refresh (clock-aligned)
        {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                let minutes = scheduler.config.quote_refresh_minutes;
                let mut ticker =
                    interval_at(next_minute_boundary(minutes), Duration::from_secs(minutes * 60));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

                loop {
                    ticker.tick().await;
                    if !scheduler.calendar.is_open(Utc::now()) {
                        continue;
                    }
                    if let Err(e) = scheduler
                        .with_lock("quote_refresh", scheduler.run_quote_refresh())
                        .await
                    {
                        tracing::error!("Quote refresh failed: {}", e);
                    }
                }
            }));
        }

        // Loop 2: decision refresh (30s after the boundary, so a same-tick
        // quote refresh lands first)
        {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                let minutes = scheduler.config.decision_refresh_minutes;
                let start = next_minute_boundary(minutes) + Duration::from_secs(30);
                let mut ticker = interval_at(start, Duration::from_secs(minutes * 60));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

                loop {
                    ticker.tick().await;
                    if !scheduler.calendar.is_open(Utc::now()) {
                        continue;
                    }
                    if let Err(e) = scheduler
                        .with_lock("decision_refresh", scheduler.run_decision_refresh())
                        .await
                    {
                        tracing::error!("Decision refresh failed: {}", e);
                    }
                }
            }));
        }

        // Loop 3: risk recompute
        {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                let minutes = scheduler.config.risk_refresh_minutes;
                let mut ticker =
                    interval_at(next_minute_boundary(minutes), Duration::from_secs(minutes * 60));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

                loop {
                    ticker.tick().await;
                    if !scheduler.calendar.is_open(Utc::now()) {
                        continue;
                    }
                    if let Err(e) = scheduler
                        .with_lock("risk_refresh", scheduler.run_risk_refresh())
                        .await
                    {
                        tracing::error!("Risk refresh failed: {}", e);
                    }
                }
            }));
        }

        // Loop 4: window open/close boundary refresh
        {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                let start = Instant::now() + Duration::from_secs(5);
                let mut ticker = interval_at(start, Duration::from_secs(60));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

                loop {
                    ticker.tick().await;
                    let open = scheduler.calendar.is_open(Utc::now());
                    let was_open = scheduler.window_was_open.swap(open, Ordering::SeqCst);
                    if open == was_open {
                        continue;
                    }

                    tracing::info!(
                        "🔔 Trading window {} - running boundary refresh",
                        if open { "opened" } else { "closed" }
                    );
                    let body = async {
                        scheduler.run_quote_refresh().await?;
                        scheduler.run_decision_refresh().await?;
                        Ok(())
                    };
                    if let Err(e) = scheduler.with_lock("boundary_refresh", body).await {
                        tracing::error!("Boundary refresh failed: {}", e);
                    }
                }
            }));
        }

        // Loop 5: daily jobs outside the window
        {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let wait = duration_until_hour(scheduler.config.daily_job_hour);
                    sleep(wait).await;

                    if scheduler.calendar.is_open(Utc::now()) {
                        tracing::debug!("Daily jobs deferred (trading window open)");
                        continue;
                    }

                    tracing::info!("🌙 Running daily jobs");
                    if let Err(e) = scheduler
                        .with_lock("daily_backfill", scheduler.run_backfill())
                        .await
                    {
                        tracing::error!("Backfill failed: {}", e);
                    }
                    if let Err(e) = scheduler
                        .with_lock("daily_volatility", scheduler.run_daily_volatility())
                        .await
                    {
                        tracing::error!("Volatility recompute failed: {}", e);
                    }
                }
            }));
        }

        handles
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Apply fetched quotes to a batch of positions
///
/// Writes back price + action + reason only when any of them changed, and
/// signals the notifier when the action itself changed. Running this twice
/// against unchanged prices is a no-op on the second pass.
pub async fn apply_quotes(
    positions: &[Position],
    quotes: &HashMap<String, PriceQuote>,
    store: &dyn PositionStore,
    notifier: &dyn Notifier,
) -> crate::Result<RefreshOutcome> {
    let mut outcome = RefreshOutcome::default();

    for position in positions {
        let Some(quote) = quotes.get(&position.ticker) else {
            tracing::debug!("  no quote for {}, decision unchanged", position.ticker);
            continue;
        };

        let decision = decision::decide(position, quote);

        let changed = position.current_price != quote.price
            || position.action != decision.action
            || position.reason != decision.reason;
        if !changed {
            continue;
        }

        store
            .update_market_state(
                position.id,
                quote.price,
                decision.action,
                &decision.reason,
                decision.color,
            )
            .await?;
        outcome.updated += 1;

        if decision.action != position.action {
            notifier
                .action_changed(
                    position.user_id,
                    &position.ticker,
                    decision.action,
                    &decision.reason,
                )
                .await;
            outcome.notified += 1;
        }
    }

    Ok(outcome)
}

fn distinct_tickers(positions: &[Position]) -> Vec<String> {
    let mut seen = HashSet::new();
    positions
        .iter()
        .filter(|p| seen.insert(p.ticker.clone()))
        .map(|p| p.ticker.clone())
        .collect()
}

/// Tokio instant of the next wall-clock boundary (XX:00, XX:05, ...)
fn next_minute_boundary(minutes: u64) -> Instant {
    let now = Utc::now();
    let current_minute = now.minute() as u64;
    let current_second = now.second() as u64;

    let minutes_until_next = minutes - (current_minute % minutes);
    let seconds_until_next = if minutes_until_next == minutes && current_second == 0 {
        0 // Already at boundary
    } else {
        minutes_until_next * 60 - current_second
    };

    Instant::now() + Duration::from_secs(seconds_until_next)
}

/// Wall-clock time of the next cadence boundary
fn next_tick_time(now: DateTime<Utc>, minutes: u64) -> DateTime<Utc> {
    let base = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let add = minutes - (now.minute() as u64 % minutes);
    base + ChronoDuration::minutes(add as i64)
}

/// How long until the next daily occurrence of `hour`:00:00 UTC
fn duration_until_hour(hour: u32) -> Duration {
    let now = Utc::now();
    let today = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .expect("hour clamped to 0-23")
        .and_utc();
    let target = if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    };

    (target - now).to_std().unwrap_or(Duration::from_secs(60))
}
