//! 🔭 Wallet Scout - trending-token wallet discovery and confluence alerts
//!
//! Pipeline: trending feeds → seed tokens → wallet discovery → FIFO PnL +
//! Being-Early stats → composite-ranked watchlist → high-frequency monitor
//! → time-windowed confluence alerts to Telegram.
//!
//! ## Scheduled jobs
//! - seed ingestion (≈5 min), wallet discovery (≈10 min)
//! - stats roll (≈15 min), wallet monitor (≈2 min)
//! - watchlist maintenance (daily)

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use wallet_scout::adapters::AdapterRegistry;
use wallet_scout::alerts::{telegram::TelegramClient, AlertSink, NullSink};
use wallet_scout::analytics::StatsRoller;
use wallet_scout::config::{Config, Secrets};
use wallet_scout::db::Database;
use wallet_scout::ingest::{RunnerIngestion, WalletDiscovery};
use wallet_scout::metrics;
use wallet_scout::monitor::confluence::{
    ConfluenceDetector, MemoryWindowStore, RedisWindowStore, WindowStore,
};
use wallet_scout::monitor::WalletMonitor;
use wallet_scout::price::PriceEnricher;
use wallet_scout::scheduler;
use wallet_scout::watchlist::WatchlistMaintainer;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("🔭 Wallet Scout starting...");

    dotenv::dotenv().ok();
    let secrets = Secrets::from_env();
    let config = Config::load_or_default().context("Failed to load configuration")?;
    info!("⚙️  Configuration loaded ({} chains)", config.chains.enabled.len());

    let db_path = secrets
        .database_path_override
        .clone()
        .unwrap_or_else(|| config.database.path.clone());
    let db = Arc::new(Mutex::new(Database::new(&db_path, config.database.wal_mode)?));
    info!("✅ Database: {}", db_path);

    // Registry and price cache are process-wide, built once, never mutated
    // after this point.
    let registry = Arc::new(AdapterRegistry::from_config(&config, &secrets));
    let prices = Arc::new(PriceEnricher::new(
        registry.clone(),
        db.clone(),
        Duration::from_secs(config.http.price_cache_ttl_secs),
    ));

    // Time-window store for confluence state. A Redis outage at startup
    // degrades to a process-local store rather than refusing to run.
    let window_store: Arc<dyn WindowStore> = match RedisWindowStore::connect(&secrets.redis_url).await {
        Ok(store) => {
            info!("✅ Window store: redis at {}", secrets.redis_url);
            Arc::new(store)
        }
        Err(e) => {
            warn!("⚠️  Redis unavailable ({}); using in-process window store", e);
            Arc::new(MemoryWindowStore::new())
        }
    };
    let detector = Arc::new(ConfluenceDetector::new(
        window_store,
        config.confluence.window_secs(),
        config.confluence.min_confluence,
    ));

    let sink: Arc<dyn AlertSink> = if secrets.telegram_enabled() {
        info!("✅ Telegram transport configured");
        Arc::new(TelegramClient::new(
            secrets.telegram_bot_token.clone().unwrap_or_default(),
            secrets.telegram_chat_id.clone().unwrap_or_default(),
        ))
    } else {
        warn!("⚠️  No Telegram credentials; alerts go to the log only");
        Arc::new(NullSink)
    };

    // Pipeline components.
    let ingestion = Arc::new(RunnerIngestion::new(db.clone(), registry.clone(), &config));
    let discovery = Arc::new(WalletDiscovery::new(
        db.clone(),
        registry.clone(),
        prices.clone(),
        &config,
    ));
    let roller = Arc::new(StatsRoller::new(
        db.clone(),
        prices.clone(),
        config.discovery.worker_pool_size,
    ));
    let maintainer = Arc::new(WatchlistMaintainer::new(db.clone(), &config));
    let monitor = Arc::new(WalletMonitor::new(
        db.clone(),
        registry.clone(),
        prices.clone(),
        detector,
        sink,
        &config,
    ));

    let _metrics_reporter =
        metrics::spawn_reporter(Duration::from_secs(config.monitoring.metrics_log_interval_secs));

    // Scheduled jobs.
    let ingest_job = {
        let ingestion = ingestion.clone();
        scheduler::spawn_interval_job(
            "seed_ingest",
            Duration::from_secs(config.jobs.ingest_interval_min * 60),
            move || {
                let ingestion = ingestion.clone();
                async move {
                    ingestion.run_all_sources(Utc::now().timestamp()).await?;
                    Ok(())
                }
            },
        )
    };

    let discovery_job = {
        let discovery = discovery.clone();
        scheduler::spawn_interval_job(
            "wallet_discovery",
            Duration::from_secs(config.jobs.discover_interval_min * 60),
            move || {
                let discovery = discovery.clone();
                async move {
                    discovery.discover_from_seed_tokens(Utc::now().timestamp()).await?;
                    Ok(())
                }
            },
        )
    };

    let stats_job = {
        let roller = roller.clone();
        scheduler::spawn_interval_job(
            "stats_roll",
            Duration::from_secs(config.jobs.stats_interval_min * 60),
            move || {
                let roller = roller.clone();
                async move {
                    roller.roll_all(Utc::now().timestamp()).await?;
                    Ok(())
                }
            },
        )
    };

    let monitor_job = {
        let monitor = monitor.clone();
        scheduler::spawn_interval_job(
            "wallet_monitor",
            Duration::from_secs(config.jobs.monitor_interval_secs),
            move || {
                let monitor = monitor.clone();
                async move {
                    monitor.run_tick(Utc::now().timestamp()).await?;
                    Ok(())
                }
            },
        )
    };

    let maintenance_job = {
        let maintainer = maintainer.clone();
        scheduler::spawn_daily_job("watchlist_maintenance", config.jobs.maintenance_hour_utc, move || {
            let maintainer = maintainer.clone();
            async move {
                maintainer.run_maintenance(Utc::now().timestamp()).await?;
                Ok(())
            }
        })
    };

    info!("🔭 All jobs running; Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;

    info!("👋 Shutting down");
    for handle in [ingest_job, discovery_job, stats_job, monitor_job, maintenance_job] {
        handle.abort();
    }

    Ok(())
}

fn init_logging() {
    // RUST_LOG wins; otherwise keep our own crate at info and quiet the
    // HTTP stack.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wallet_scout=info,hyper=warn,reqwest=warn"));

    fmt().with_env_filter(filter).with_target(false).compact().init();
}
