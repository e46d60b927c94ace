//! Wallet discovery from seed-token transfer streams.
//!
//! Selects seeds whose latest trending snapshot is inside the lookback
//! window, pulls each token's recent transfers, runs the pool heuristic,
//! and records the resulting wallets and trades. Trades carry a USD price
//! at observe time from the price enricher; duplicates are silently
//! ignored (`tx_hash` idempotence).

use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use super::swap_classifier::{swap_to_trade, SwapClassifier};
use crate::adapters::AdapterRegistry;
use crate::config::Config;
use crate::db::{Database, TradeInsert};
use crate::metrics;
use crate::price::PriceEnricher;
use crate::types::short_addr;

pub struct WalletDiscovery {
    db: Arc<Mutex<Database>>,
    registry: Arc<AdapterRegistry>,
    prices: Arc<PriceEnricher>,
    classifier: SwapClassifier,
    lookback_hours: i64,
    transfer_fetch_limit: u32,
    worker_pool_size: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiscoveryOutcome {
    pub tokens_scanned: usize,
    pub wallets_new: usize,
    pub trades_inserted: usize,
}

impl WalletDiscovery {
    pub fn new(
        db: Arc<Mutex<Database>>,
        registry: Arc<AdapterRegistry>,
        prices: Arc<PriceEnricher>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            registry,
            prices,
            classifier: SwapClassifier::new(config.discovery.pool_send_threshold),
            lookback_hours: config.discovery.lookback_hours,
            transfer_fetch_limit: config.discovery.transfer_fetch_limit,
            worker_pool_size: config.discovery.worker_pool_size,
        }
    }

    pub async fn discover_from_seed_tokens(&self, now: i64) -> Result<DiscoveryOutcome> {
        let since = now - self.lookback_hours * 3_600;
        let targets = {
            let db = self.db.lock().unwrap();
            db.recent_seed_targets(since)?
        };

        info!("🔍 Discovery: {} seed tokens in {}h lookback", targets.len(), self.lookback_hours);

        let outcomes = stream::iter(targets)
            .map(|(chain_id, token_address)| async move {
                match self.discover_token(&chain_id, &token_address, now).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        // One token failing must not sink the rest.
                        warn!(
                            "Discovery failed for {} on {}: {:#}",
                            short_addr(&token_address),
                            chain_id,
                            e
                        );
                        DiscoveryOutcome::default()
                    }
                }
            })
            .buffer_unordered(self.worker_pool_size)
            .collect::<Vec<_>>()
            .await;

        let total = outcomes.iter().fold(DiscoveryOutcome::default(), |mut acc, o| {
            acc.tokens_scanned += o.tokens_scanned;
            acc.wallets_new += o.wallets_new;
            acc.trades_inserted += o.trades_inserted;
            acc
        });

        info!(
            "🔍 Discovery complete: {} tokens, {} new wallets, {} trades",
            total.tokens_scanned, total.wallets_new, total.trades_inserted
        );
        Ok(total)
    }

    async fn discover_token(
        &self,
        chain_id: &str,
        token_address: &str,
        now: i64,
    ) -> Result<DiscoveryOutcome> {
        let Some(source) = self.registry.transfers_for(chain_id) else {
            debug!("No transfer source for chain {}", chain_id);
            return Ok(DiscoveryOutcome::default());
        };

        let transfers = source
            .fetch_token_transfers(chain_id, token_address, None, None, self.transfer_fetch_limit)
            .await?;

        let classification = self.classifier.classify(&transfers);
        metrics::add(&metrics::POLICY_REJECTS, classification.discarded as u64);

        if classification.swaps.is_empty() {
            return Ok(DiscoveryOutcome { tokens_scanned: 1, ..Default::default() });
        }

        // Price-at-observe for the whole batch; historical trades keep this
        // price, live price only supersedes it for unrealized PnL.
        let price = self
            .prices
            .price_of(chain_id, token_address)
            .await
            .unwrap_or(0.0);

        let mut outcome = DiscoveryOutcome { tokens_scanned: 1, ..Default::default() };

        let mut db = self.db.lock().unwrap();
        for swap in &classification.swaps {
            if db.upsert_wallet(chain_id, &swap.wallet_address, now)? {
                outcome.wallets_new += 1;
            }

            let trade = swap_to_trade(swap, chain_id, price);
            match db.insert_trade(&trade)? {
                TradeInsert::Inserted => {
                    metrics::incr(&metrics::TRADES_INSERTED);
                    outcome.trades_inserted += 1;
                }
                TradeInsert::Duplicate => {}
                TradeInsert::Conflicting => {
                    metrics::incr(&metrics::TRADES_QUARANTINED);
                    error!(
                        "Quarantined conflicting trade body for tx {} ({})",
                        trade.tx_hash, chain_id
                    );
                }
            }
        }

        debug!(
            "🔍 {} on {}: {} swaps, {} new wallets",
            short_addr(token_address),
            chain_id,
            classification.swaps.len(),
            outcome.wallets_new
        );
        Ok(outcome)
    }
}
