//! High-frequency watchlist monitoring.
//!
//! Every tick: fetch recent transfers for each watched wallet in both
//! directions, classify swaps with the same pool heuristic discovery uses,
//! record new trades, and feed them to the confluence detector. Wallet
//! fetches run in a bounded pool and fail independently; a window-store
//! outage short-circuits confluence for the tick ("no confluence possible")
//! and retries next tick.

pub mod confluence;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::adapters::{AdapterRegistry, UpstreamError};
use crate::alerts::{AlertOutcome, AlertSink, ConfluenceAlert, WalletBrief};
use crate::config::Config;
use crate::db::{Database, TradeInsert};
use crate::ingest::swap_classifier::{swap_to_trade, SwapClassifier};
use crate::metrics;
use crate::price::PriceEnricher;
use crate::types::{short_addr, TradeSide, TransferDirection};
use crate::watchlist::{Weights, WeightsState};
use confluence::ConfluenceDetector;

#[derive(Debug, Default, Clone, Copy)]
pub struct MonitorOutcome {
    pub wallets_checked: usize,
    pub trades_recorded: usize,
    pub alerts_emitted: usize,
    pub store_degraded: bool,
}

pub struct WalletMonitor {
    db: Arc<Mutex<Database>>,
    registry: Arc<AdapterRegistry>,
    prices: Arc<PriceEnricher>,
    detector: Arc<ConfluenceDetector>,
    sink: Arc<dyn AlertSink>,
    classifier: SwapClassifier,
    chains: Vec<String>,
    exclusions: Vec<String>,
    fetch_limit: u32,
    worker_pool_size: usize,
    window_ms: i64,
    weights_state_path: String,
}

impl WalletMonitor {
    pub fn new(
        db: Arc<Mutex<Database>>,
        registry: Arc<AdapterRegistry>,
        prices: Arc<PriceEnricher>,
        detector: Arc<ConfluenceDetector>,
        sink: Arc<dyn AlertSink>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            registry,
            prices,
            detector,
            sink,
            classifier: SwapClassifier::new(config.discovery.pool_send_threshold),
            chains: config.chains.enabled.clone(),
            exclusions: config.safety.stablecoin_exclusions.clone(),
            fetch_limit: config.discovery.transfer_fetch_limit,
            worker_pool_size: config.discovery.worker_pool_size,
            window_ms: config.confluence.window_secs() * 1000,
            weights_state_path: config.watchlist.weights_state_path.clone(),
        }
    }

    pub async fn run_tick(&self, now: i64) -> Result<MonitorOutcome> {
        let store_down = Arc::new(AtomicBool::new(false));
        let mut total = MonitorOutcome::default();

        for chain_id in &self.chains {
            let wallets = self.watched_wallets(chain_id)?;
            if wallets.is_empty() {
                continue;
            }
            debug!("👁  Monitoring {} wallets on {}", wallets.len(), chain_id);

            let outcomes = stream::iter(wallets)
                .map(|wallet_address| {
                    let store_down = store_down.clone();
                    async move {
                        match self
                            .check_wallet(chain_id, &wallet_address, now, &store_down)
                            .await
                        {
                            Ok(outcome) => outcome,
                            Err(e) => {
                                // One wallet failing never blocks the rest.
                                warn!(
                                    "Monitor failed for {} on {}: {:#}",
                                    short_addr(&wallet_address),
                                    chain_id,
                                    e
                                );
                                MonitorOutcome::default()
                            }
                        }
                    }
                })
                .buffer_unordered(self.worker_pool_size)
                .collect::<Vec<_>>()
                .await;

            for o in outcomes {
                total.wallets_checked += o.wallets_checked;
                total.trades_recorded += o.trades_recorded;
                total.alerts_emitted += o.alerts_emitted;
            }
        }

        total.store_degraded = store_down.load(Ordering::Relaxed);
        if total.store_degraded {
            metrics::incr(&metrics::WINDOW_STORE_FAILURES);
            warn!("⚠️  Window store unreachable; confluence disabled this tick");
        }

        info!(
            "👁  Monitor tick: {} wallets, {} new trades, {} alerts",
            total.wallets_checked, total.trades_recorded, total.alerts_emitted
        );
        Ok(total)
    }

    /// Active watchlist plus the user-curated always-watch set.
    fn watched_wallets(&self, chain_id: &str) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut wallets: BTreeSet<String> = db
            .active_watchlist(chain_id)?
            .into_iter()
            .map(|e| e.wallet_address)
            .collect();
        wallets.extend(db.active_custom_watchlist(chain_id)?);
        Ok(wallets.into_iter().collect())
    }

    async fn check_wallet(
        &self,
        chain_id: &str,
        wallet_address: &str,
        now: i64,
        store_down: &AtomicBool,
    ) -> Result<MonitorOutcome> {
        let mut outcome = MonitorOutcome { wallets_checked: 1, ..Default::default() };

        let Some(source) = self.registry.transfers_for(chain_id) else {
            return Ok(outcome);
        };

        // Buys and sells are separate upstream queries.
        let incoming = source
            .fetch_wallet_transfers(chain_id, wallet_address, TransferDirection::In, None, self.fetch_limit)
            .await?;
        let outgoing = source
            .fetch_wallet_transfers(chain_id, wallet_address, TransferDirection::Out, None, self.fetch_limit)
            .await?;

        let mut transfers = incoming;
        transfers.extend(outgoing);
        if transfers.is_empty() {
            return Ok(outcome);
        }

        // Cursor short-circuit: nothing newer than last tick.
        let newest = transfers
            .iter()
            .max_by_key(|t| (t.ts, t.tx_hash.clone()))
            .map(|t| t.tx_hash.clone());
        {
            let db = self.db.lock().unwrap();
            if newest.is_some() && db.get_cursor(chain_id, wallet_address)? == newest {
                return Ok(outcome);
            }
        }

        let swaps = self.classifier.classify_for_wallet(wallet_address, &transfers);

        for swap in &swaps {
            let token_address = &swap.transfer.token_address;
            let price = self
                .prices
                .price_of(chain_id, token_address)
                .await
                .unwrap_or(0.0);
            let trade = swap_to_trade(swap, chain_id, price);

            let inserted = {
                let mut db = self.db.lock().unwrap();
                db.upsert_wallet(chain_id, wallet_address, now)?;
                db.insert_trade(&trade)?
            };

            match inserted {
                TradeInsert::Inserted => {
                    metrics::incr(&metrics::TRADES_INSERTED);
                    outcome.trades_recorded += 1;
                }
                TradeInsert::Duplicate => continue,
                TradeInsert::Conflicting => {
                    metrics::incr(&metrics::TRADES_QUARANTINED);
                    error!("Quarantined conflicting trade body for tx {}", trade.tx_hash);
                    continue;
                }
            }

            // Stablecoins and wrapped natives never alert.
            if self.exclusions.iter().any(|a| a == token_address) {
                continue;
            }

            if store_down.load(Ordering::Relaxed) {
                continue;
            }
            match self
                .detector
                .record_and_check(chain_id, swap.side, token_address, wallet_address, trade.ts, now)
                .await
            {
                Ok(Some(hit)) => {
                    outcome.alerts_emitted += self
                        .emit_alert(chain_id, swap.side, token_address, &hit, now)
                        .await?;
                }
                Ok(None) => {}
                Err(UpstreamError::StoreUnavailable(e)) => {
                    debug!("Window store error: {}", e);
                    store_down.store(true, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("Confluence record failed: {}", e);
                }
            }
        }

        if let Some(newest) = newest {
            let mut db = self.db.lock().unwrap();
            db.set_cursor(chain_id, wallet_address, &newest)?;
        }

        Ok(outcome)
    }

    /// Ledger-dedup then emit. Returns 1 when an alert actually went out.
    async fn emit_alert(
        &self,
        chain_id: &str,
        side: TradeSide,
        token_address: &str,
        hit: &confluence::ConfluenceHit,
        now: i64,
    ) -> Result<usize> {
        let kind = match side {
            TradeSide::Buy => "buy_confluence",
            TradeSide::Sell => "sell_confluence",
        };

        let price = self.prices.price_of(chain_id, token_address).await;
        let weights_json = self.current_weights().to_json();

        let (inserted, token, briefs) = {
            let mut db = self.db.lock().unwrap();
            let inserted = db.insert_alert(
                now,
                kind,
                chain_id,
                token_address,
                &hit.wallets,
                &hit.dedup_key,
                self.window_ms,
                price,
                Some(weights_json.as_str()),
                None,
            )?;
            let token = db.get_token(chain_id, token_address)?;
            let briefs: Vec<WalletBrief> = hit
                .wallets
                .iter()
                .map(|w| {
                    let stats = db.get_stats(chain_id, w).ok().flatten();
                    WalletBrief {
                        address: w.clone(),
                        realized_pnl_usd: stats.as_ref().map(|s| s.realized_pnl_usd).unwrap_or(0.0),
                        best_trade_multiple: stats.as_ref().and_then(|s| s.best_trade_multiple),
                        earlyscore_median: stats.as_ref().and_then(|s| s.earlyscore_median),
                        trades_count: stats.as_ref().map(|s| s.trades_count).unwrap_or(0),
                    }
                })
                .collect();
            (inserted, token, briefs)
        };

        if !inserted {
            metrics::incr(&metrics::ALERTS_DEDUPED);
            debug!("Alert suppressed by dedup key {}", &hit.dedup_key[..16]);
            return Ok(0);
        }

        let alert = ConfluenceAlert {
            kind,
            chain_id: chain_id.to_string(),
            token_address: token_address.to_string(),
            symbol: token.and_then(|t| t.symbol),
            side,
            wallets: briefs,
            window_ms: hit.window_span_ms,
            price_usd: price,
        };

        match self.sink.emit(&alert).await {
            AlertOutcome::Ok => {
                metrics::incr(&metrics::ALERTS_EMITTED);
                info!(
                    "🚨 {} on {}: {} wallets bought {}",
                    kind,
                    chain_id,
                    alert.wallets.len(),
                    short_addr(token_address)
                );
                Ok(1)
            }
            AlertOutcome::Transient => {
                // Ledger row stays; the confluence was real even if the
                // transport hiccuped.
                warn!("Alert transport transient failure for {}", short_addr(token_address));
                Ok(0)
            }
            AlertOutcome::Permanent => {
                error!("Alert transport permanent failure for {}", short_addr(token_address));
                Ok(0)
            }
        }
    }

    fn current_weights(&self) -> Weights {
        WeightsState::load_or_default(&self.weights_state_path, Weights::default()).weights
    }
}
