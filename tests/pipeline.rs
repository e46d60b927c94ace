//! Full-pipeline test: trending feed → seed → discovery → stats →
//! watchlist → monitor → confluence alert, with canned upstreams.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wallet_scout::adapters::{
    AdapterRegistry, PriceSource, TransferSource, TrendingSource, UpstreamError,
};
use wallet_scout::alerts::{AlertOutcome, AlertSink, ConfluenceAlert};
use wallet_scout::analytics::StatsRoller;
use wallet_scout::config::Config;
use wallet_scout::db::Database;
use wallet_scout::ingest::{RunnerIngestion, WalletDiscovery};
use wallet_scout::monitor::confluence::{ConfluenceDetector, MemoryWindowStore};
use wallet_scout::monitor::WalletMonitor;
use wallet_scout::price::PriceEnricher;
use wallet_scout::types::{TokenSnapshot, Transfer, TransferDirection};
use wallet_scout::watchlist::WatchlistMaintainer;

const TOKEN: &str = "0xaaa0000000000000000000000000000000000001";
const POOL: &str = "0xp00l000000000000000000000000000000000001";

struct CannedTrending;

#[async_trait]
impl TrendingSource for CannedTrending {
    fn name(&self) -> &'static str {
        "canned-trending"
    }
    fn supports_chain(&self, chain_id: &str) -> bool {
        chain_id == "eth"
    }
    async fn fetch_trending(&self, _chain_id: &str) -> Result<Vec<TokenSnapshot>, UpstreamError> {
        Ok(vec![TokenSnapshot {
            address: TOKEN.to_string(),
            symbol: Some("RUNR".to_string()),
            name: Some("Runner".to_string()),
            price_usd: Some(1.0),
            liquidity_usd: Some(120_000.0),
            vol_24h_usd: Some(400_000.0),
        }])
    }
}

struct CannedPrice;

#[async_trait]
impl PriceSource for CannedPrice {
    fn name(&self) -> &'static str {
        "canned-price"
    }
    fn supports_chain(&self, _chain_id: &str) -> bool {
        true
    }
    async fn price_of(
        &self,
        _chain_id: &str,
        _token_address: &str,
    ) -> Result<Option<f64>, UpstreamError> {
        Ok(Some(1.0))
    }
}

/// Historical token stream for discovery plus live per-wallet feeds for
/// the monitor. Live feeds are installed after the discovery phase.
struct CannedTransfers {
    token_stream: Vec<Transfer>,
    wallet_feeds: Mutex<HashMap<String, Vec<Transfer>>>,
}

#[async_trait]
impl TransferSource for CannedTransfers {
    fn name(&self) -> &'static str {
        "canned-transfers"
    }
    fn supports_chain(&self, chain_id: &str) -> bool {
        chain_id == "eth"
    }
    async fn fetch_token_transfers(
        &self,
        _chain_id: &str,
        _token_address: &str,
        _from_block: Option<u64>,
        _to_block: Option<u64>,
        _limit: u32,
    ) -> Result<Vec<Transfer>, UpstreamError> {
        Ok(self.token_stream.clone())
    }
    async fn fetch_wallet_transfers(
        &self,
        _chain_id: &str,
        wallet_address: &str,
        direction: TransferDirection,
        _from_block: Option<u64>,
        _limit: u32,
    ) -> Result<Vec<Transfer>, UpstreamError> {
        let feeds = self.wallet_feeds.lock().unwrap();
        Ok(feeds
            .get(wallet_address)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|t| match direction {
                TransferDirection::In => t.to_address == wallet_address,
                TransferDirection::Out => t.from_address == wallet_address,
            })
            .collect())
    }
}

struct CapturingSink {
    alerts: Mutex<Vec<ConfluenceAlert>>,
}

#[async_trait]
impl AlertSink for CapturingSink {
    async fn emit(&self, alert: &ConfluenceAlert) -> AlertOutcome {
        self.alerts.lock().unwrap().push(alert.clone());
        AlertOutcome::Ok
    }
}

fn pool_transfer(tx: &str, from: &str, to: &str, ts: i64, qty: f64) -> Transfer {
    Transfer {
        tx_hash: tx.to_string(),
        ts,
        from_address: from.to_string(),
        to_address: to.to_string(),
        token_address: TOKEN.to_string(),
        qty,
    }
}

#[tokio::test]
async fn test_trending_to_confluence_alert() {
    let day = 86_400i64;
    let t_discover = 40 * day; // historical discovery pass
    let t_live = t_discover + 3_600; // live monitor tick an hour later

    // Two profitable wallets with real history: each bought cheap and sold
    // higher days ago, then holds. Pool fan-out makes POOL a pool.
    let mut token_stream = Vec::new();
    for (i, wallet) in ["0xw1", "0xw2", "0xw3"].iter().enumerate() {
        let base = t_discover - 10 * day + i as i64;
        token_stream.push(pool_transfer(&format!("0xbuy{}", i), POOL, wallet, base, 100.0));
        // Sell back into the pool two days later.
        token_stream.push(pool_transfer(
            &format!("0xsell{}", i),
            wallet,
            POOL,
            base + 2 * day,
            40.0,
        ));
    }

    let transfers = Arc::new(CannedTransfers {
        token_stream,
        wallet_feeds: Mutex::new(HashMap::new()),
    });

    let registry = Arc::new(AdapterRegistry::with_adapters(
        vec![Arc::new(CannedTrending)],
        vec![transfers.clone()],
        vec![Arc::new(CannedPrice)],
        vec![],
    ));

    let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
    let prices = Arc::new(PriceEnricher::new(
        registry.clone(),
        db.clone(),
        Duration::from_secs(60),
    ));

    let mut config = Config::default();
    config.chains.enabled = vec!["eth".to_string()];
    config.watchlist.min_best_multiple = 1.0;

    // Phase 1: trending ingestion seeds the token.
    let ingestion = RunnerIngestion::new(db.clone(), registry.clone(), &config);
    let seeded = ingestion.run_all_sources(t_discover).await.unwrap();
    assert_eq!(seeded, 1);

    // Phase 2: discovery finds the wallets and their trades.
    let discovery = WalletDiscovery::new(db.clone(), registry.clone(), prices.clone(), &config);
    let outcome = discovery.discover_from_seed_tokens(t_discover).await.unwrap();
    assert_eq!(outcome.wallets_new, 3);
    assert_eq!(outcome.trades_inserted, 6);

    // Phase 3: stats roll computes PnL and early scores.
    let roller = StatsRoller::new(db.clone(), prices.clone(), 4);
    let rolled = roller.roll_all(t_discover).await.unwrap();
    assert_eq!(rolled, 3);

    // Phase 4: maintenance activates the top wallets.
    let maintainer = WatchlistMaintainer::new(db.clone(), &config);
    let maintenance = maintainer.run_maintenance(t_discover).await.unwrap();
    assert!(maintenance.added >= 2, "expected ≥2 wallets added, got {}", maintenance.added);

    // Phase 5: two watched wallets buy the token again within the window.
    {
        let mut feeds = transfers.wallet_feeds.lock().unwrap();
        for (i, wallet) in ["0xw1", "0xw2"].iter().enumerate() {
            let tx = format!("0xlive{}", i);
            let ts = t_live - 300 + i as i64 * 120;
            let mut feed = vec![pool_transfer(&tx, POOL, wallet, ts, 50.0)];
            // Enough pool fan-out inside the live window for classification.
            for j in 0..3 {
                feed.push(pool_transfer(
                    &format!("{}noise{}", tx, j),
                    POOL,
                    &format!("0xnoise{}{}", i, j),
                    ts,
                    1.0,
                ));
            }
            feeds.insert(wallet.to_string(), feed);
        }
    }

    let sink = Arc::new(CapturingSink { alerts: Mutex::new(Vec::new()) });
    let detector = Arc::new(ConfluenceDetector::new(
        Arc::new(MemoryWindowStore::new()),
        config.confluence.window_secs(),
        config.confluence.min_confluence,
    ));
    let monitor = WalletMonitor::new(
        db.clone(),
        registry.clone(),
        prices.clone(),
        detector,
        sink.clone(),
        &config,
    );

    let tick = monitor.run_tick(t_live).await.unwrap();
    assert_eq!(tick.trades_recorded, 2);
    assert_eq!(tick.alerts_emitted, 1);

    let alerts = sink.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.kind, "buy_confluence");
    assert_eq!(alert.token_address, TOKEN);
    assert_eq!(alert.symbol.as_deref(), Some("RUNR"));
    let wallets: Vec<&str> = alert.wallets.iter().map(|w| w.address.as_str()).collect();
    assert_eq!(wallets, vec!["0xw1", "0xw2"]);
    // Stats snapshots rode along with the payload.
    assert!(alert.wallets.iter().all(|w| w.trades_count > 0));

    // Replay the tick: cursors + tx idempotence + alert dedup hold.
    let replay = monitor.run_tick(t_live + 60).await.unwrap();
    assert_eq!(replay.trades_recorded, 0);
    assert_eq!(replay.alerts_emitted, 0);
    assert_eq!(db.lock().unwrap().alert_count().unwrap(), 1);
}
