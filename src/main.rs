use stockbot::api::{FinnhubClient, QuoteProvider, TwelveDataClient};
use stockbot::config::Settings;
use stockbot::db::{MemoryPositionStore, PositionStore, PostgresStore};
use stockbot::gateway::Gateway;
use stockbot::notify::LogNotifier;
use stockbot::persistence::RedisHistory;
use stockbot::scheduler::{
    LockStore, MemoryLockStore, RedisLockStore, Scheduler, SchedulerConfig, TradingCalendar,
};
use stockbot::Result;
use std::sync::Arc;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    tracing::info!("🚀 StockBot starting - portfolio decision core");

    let settings = Settings::load()?;

    // Providers in priority order: Finnhub primary, Twelve Data fallback
    let finnhub = FinnhubClient::new(settings.finnhub_api_key.clone());
    let twelvedata = TwelveDataClient::new(settings.twelvedata_api_key.clone());
    let providers: Vec<Arc<dyn QuoteProvider>> =
        vec![Arc::new(finnhub), Arc::new(twelvedata.clone())];
    let gateway = Gateway::new(providers);

    let store = connect_position_store(&settings).await;
    let locks = connect_lock_store(&settings).await;

    let calendar = TradingCalendar::parse(&settings.market_open, &settings.market_close)?;
    let config = SchedulerConfig {
        quote_refresh_minutes: settings.quote_refresh_minutes,
        decision_refresh_minutes: settings.decision_refresh_minutes,
        risk_refresh_minutes: settings.risk_refresh_minutes,
        daily_job_hour: settings.daily_job_hour,
        lock_ttl: Duration::from_secs(settings.lock_ttl_secs),
    };

    let mut scheduler = Scheduler::new(
        gateway,
        store,
        Arc::new(LogNotifier),
        locks,
        calendar,
        config,
    );

    // Daily history jobs need Redis; run without them when it is absent
    match RedisHistory::new(&settings.redis_url).await {
        Ok(history) => {
            scheduler = scheduler.with_history(history, Arc::new(twelvedata));
        }
        Err(e) => {
            tracing::warn!("History store unavailable ({}), daily jobs disabled", e);
        }
    }

    let scheduler = Arc::new(scheduler);

    let status = scheduler.status();
    tracing::info!("\n📊 Configuration:");
    tracing::info!(
        "  Trading window: {}-{} UTC (weekdays), currently {}",
        settings.market_open,
        settings.market_close,
        if status.market_open { "open" } else { "closed" }
    );
    tracing::info!("  Quote refresh: every {} min", settings.quote_refresh_minutes);
    tracing::info!(
        "  Decision refresh: every {} min",
        settings.decision_refresh_minutes
    );
    tracing::info!("  Risk refresh: every {} min", settings.risk_refresh_minutes);
    tracing::info!(
        "  Daily jobs: {:02}:00 UTC, lock TTL {}s",
        settings.daily_job_hour,
        settings.lock_ttl_secs
    );

    tracing::info!("\n🔄 Spawning scheduler loops...");
    let handles = scheduler.spawn_all();
    tracing::info!("✅ All loops spawned successfully");
    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::signal::ctrl_c().await?;
    tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");

    for handle in handles {
        handle.abort();
    }

    tracing::info!("👋 StockBot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter("stockbot=info")
        .init();
}

async fn connect_position_store(settings: &Settings) -> Arc<dyn PositionStore> {
    match &settings.database_url {
        Some(url) => match PostgresStore::new(url).await {
            Ok(store) => {
                tracing::info!("Position persistence enabled at {}", url);
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to connect to Postgres ({}), using in-memory positions",
                    e
                );
                Arc::new(MemoryPositionStore::new())
            }
        },
        None => {
            tracing::info!("No DATABASE_URL set, using in-memory positions");
            Arc::new(MemoryPositionStore::new())
        }
    }
}

async fn connect_lock_store(settings: &Settings) -> Arc<dyn LockStore> {
    match RedisLockStore::new(&settings.redis_url).await {
        Ok(locks) => {
            tracing::info!("Distributed locks via Redis at {}", settings.redis_url);
            Arc::new(locks)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Redis ({}), job locks are process-local",
                e
            );
            Arc::new(MemoryLockStore::new())
        }
    }
}
