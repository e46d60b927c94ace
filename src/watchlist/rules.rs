//! Watchlist add/remove rules and the daily maintenance pass.
//!
//! Add: composite score inside the chain's top-N, at least `min_trades`
//! trades, best realized multiple at or above `min_best_multiple`, and not
//! bot-flagged. Remove: any of the deactivation conditions below. Removed
//! wallets stay evaluable and can re-enter on a later run. A wallet that
//! traded inside the live confluence window is never removed mid-window;
//! its removal is deferred to the next run.

use anyhow::Result;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::scoring::{self, Weights, WeightsState};
use crate::analytics::pnl;
use crate::config::{Config, WatchlistConfig};
use crate::db::Database;
use crate::types::{short_addr, Trade, WalletStats30D, WatchStatus, WatchlistEntry};

const EARLY_MEDIAN_FLOOR: f64 = 20.0;
const KEEP_MULTIPLE: f64 = 2.0;
const RECENT_DAYS: i64 = 7;
const PRIOR_DAYS: i64 = 23;

/// Why a wallet was deactivated; log-only.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoveReason {
    NegativePnl(f64),
    Inactive,
    LowEarlyMedian(f64),
    LowMultiple(f64),
    FadingPnl { recent_daily: f64, prior_daily: f64 },
}

impl std::fmt::Display for RemoveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoveReason::NegativePnl(p) => write!(f, "unrealized pnl ${:.0}", p),
            RemoveReason::Inactive => write!(f, "no trades in 30d"),
            RemoveReason::LowEarlyMedian(m) => write!(f, "early median {:.0}", m),
            RemoveReason::LowMultiple(m) => write!(f, "best multiple {:.1}x", m),
            RemoveReason::FadingPnl { recent_daily, prior_daily } => {
                write!(f, "7d daily pnl ${:.0} vs prior ${:.0}", recent_daily, prior_daily)
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MaintenanceOutcome {
    pub added: usize,
    pub removed: usize,
    pub deferred: usize,
}

pub struct WatchlistMaintainer {
    db: Arc<Mutex<Database>>,
    chains: Vec<String>,
    settings: WatchlistConfig,
    confluence_window_secs: i64,
}

impl WatchlistMaintainer {
    pub fn new(db: Arc<Mutex<Database>>, config: &Config) -> Self {
        Self {
            db,
            chains: config.chains.enabled.clone(),
            settings: config.watchlist.clone(),
            confluence_window_secs: config.confluence.window_secs(),
        }
    }

    /// Daily pass over every chain. Returns totals for logging.
    pub async fn run_maintenance(&self, now: i64) -> Result<MaintenanceOutcome> {
        info!("🧹 Watchlist maintenance starting");

        let weights = self.current_weights(now)?;
        let mut total = MaintenanceOutcome::default();

        for chain_id in &self.chains {
            let outcome = self.maintain_chain(chain_id, weights, now)?;
            info!(
                "🧹 {}: added={} removed={} deferred={}",
                chain_id, outcome.added, outcome.removed, outcome.deferred
            );
            total.added += outcome.added;
            total.removed += outcome.removed;
            total.deferred += outcome.deferred;
        }

        info!(
            "🧹 Watchlist maintenance complete: added={} removed={}",
            total.added, total.removed
        );
        Ok(total)
    }

    /// Weights for this evaluation, adaptively nudged when enabled.
    pub fn current_weights(&self, now: i64) -> Result<Weights> {
        let defaults = Weights::new(
            self.settings.weight_pnl,
            self.settings.weight_activity,
            self.settings.weight_early,
        );

        if !self.settings.adaptive_weights {
            return Ok(defaults);
        }

        let mut state = WeightsState::load_or_default(&self.settings.weights_state_path, defaults);
        let weights = {
            let db = self.db.lock().unwrap();
            scoring::adaptive_step(&db, &mut state, now)?
        };
        state.save(&self.settings.weights_state_path)?;
        Ok(weights)
    }

    fn maintain_chain(&self, chain_id: &str, weights: Weights, now: i64) -> Result<MaintenanceOutcome> {
        let mut outcome = MaintenanceOutcome::default();
        let db = self.db.clone();

        let (stats, actives) = {
            let guard = db.lock().unwrap();
            (guard.stats_for_chain(chain_id)?, guard.active_watchlist(chain_id)?)
        };

        let scores = scoring::composite_scores(&stats, weights);
        let mut removed_this_run: Vec<String> = Vec::new();

        // Pass 1: re-evaluate current actives against the remove rules.
        for entry in &actives {
            let wallet_stats = stats.iter().find(|s| s.wallet_address == entry.wallet_address);
            let Some(reason) = self.should_remove(chain_id, &entry.wallet_address, wallet_stats, now)? else {
                continue;
            };

            // Mid-confluence wallets keep their slot until the next run.
            let in_window = {
                let guard = db.lock().unwrap();
                guard.wallet_has_trade_since(
                    chain_id,
                    &entry.wallet_address,
                    now - self.confluence_window_secs,
                )?
            };
            if in_window {
                debug!(
                    "Deferring removal of {} (active confluence window)",
                    short_addr(&entry.wallet_address)
                );
                outcome.deferred += 1;
                continue;
            }

            info!("➖ Watchlist remove {}: {}", short_addr(&entry.wallet_address), reason);
            let mut guard = db.lock().unwrap();
            guard.upsert_watchlist_entry(&WatchlistEntry {
                wallet_address: entry.wallet_address.clone(),
                chain_id: chain_id.to_string(),
                composite_score: scores.get(&entry.wallet_address).copied().unwrap_or(0.0),
                added_at: entry.added_at,
                last_evaluated_at: now,
                status: WatchStatus::Removed,
            })?;
            removed_this_run.push(entry.wallet_address.clone());
            outcome.removed += 1;
        }

        // Pass 2: fill free slots from the ranked candidates.
        let mut ranked: Vec<(&WalletStats30D, f64)> = stats
            .iter()
            .map(|s| (s, scores.get(&s.wallet_address).copied().unwrap_or(0.0)))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.wallet_address.cmp(&b.0.wallet_address))
        });

        let mut active_count = {
            let guard = db.lock().unwrap();
            guard.active_watchlist_count(chain_id)?
        };

        for (wallet_stats, score) in ranked.into_iter().take(self.settings.top_n) {
            if active_count >= self.settings.top_n {
                break;
            }
            if !self.meets_add_criteria(chain_id, wallet_stats)? {
                continue;
            }
            // Removed wallets re-enter on a future run, not the one that
            // dropped them.
            if removed_this_run.contains(&wallet_stats.wallet_address) {
                continue;
            }

            let existing = {
                let guard = db.lock().unwrap();
                guard.get_watchlist_entry(chain_id, &wallet_stats.wallet_address)?
            };
            if existing.as_ref().map(|e| e.status) == Some(WatchStatus::Active) {
                // Already watched; refresh its score.
                let mut guard = db.lock().unwrap();
                guard.upsert_watchlist_entry(&WatchlistEntry {
                    wallet_address: wallet_stats.wallet_address.clone(),
                    chain_id: chain_id.to_string(),
                    composite_score: score,
                    added_at: existing.map(|e| e.added_at).unwrap_or(now),
                    last_evaluated_at: now,
                    status: WatchStatus::Active,
                })?;
                continue;
            }

            info!(
                "➕ Watchlist add {} (score {:.1}, pnl ${:.0})",
                short_addr(&wallet_stats.wallet_address),
                score,
                wallet_stats.total_pnl_usd()
            );
            let mut guard = db.lock().unwrap();
            guard.upsert_watchlist_entry(&WatchlistEntry {
                wallet_address: wallet_stats.wallet_address.clone(),
                chain_id: chain_id.to_string(),
                composite_score: score,
                added_at: now,
                last_evaluated_at: now,
                status: WatchStatus::Active,
            })?;
            active_count += 1;
            outcome.added += 1;
        }

        Ok(outcome)
    }

    fn meets_add_criteria(&self, chain_id: &str, stats: &WalletStats30D) -> Result<bool> {
        if stats.trades_count < self.settings.min_trades {
            return Ok(false);
        }
        if stats.best_trade_multiple.unwrap_or(0.0) < self.settings.min_best_multiple {
            return Ok(false);
        }

        let is_bot = {
            let db = self.db.lock().unwrap();
            db.get_wallet(chain_id, &stats.wallet_address)?
                .map(|w| w.is_bot())
                .unwrap_or(false)
        };
        Ok(!is_bot)
    }

    fn should_remove(
        &self,
        chain_id: &str,
        wallet_address: &str,
        stats: Option<&WalletStats30D>,
        now: i64,
    ) -> Result<Option<RemoveReason>> {
        let Some(stats) = stats else {
            // No stats at all: treat as inactive.
            return Ok(Some(RemoveReason::Inactive));
        };

        if stats.unrealized_pnl_usd < self.settings.neg_pnl_threshold_usd {
            return Ok(Some(RemoveReason::NegativePnl(stats.unrealized_pnl_usd)));
        }
        if stats.trades_count == 0 {
            return Ok(Some(RemoveReason::Inactive));
        }
        if stats.earlyscore_median.unwrap_or(0.0) < EARLY_MEDIAN_FLOOR {
            return Ok(Some(RemoveReason::LowEarlyMedian(
                stats.earlyscore_median.unwrap_or(0.0),
            )));
        }
        if stats.best_trade_multiple.unwrap_or(0.0) < KEEP_MULTIPLE {
            return Ok(Some(RemoveReason::LowMultiple(
                stats.best_trade_multiple.unwrap_or(0.0),
            )));
        }

        // Fading performance: the last week's realized pace fell under half
        // of the prior 23 days' daily average.
        let (recent_daily, prior_daily) = self.realized_daily_pace(chain_id, wallet_address, now)?;
        if prior_daily > 0.0 && recent_daily < 0.5 * prior_daily {
            return Ok(Some(RemoveReason::FadingPnl { recent_daily, prior_daily }));
        }

        Ok(None)
    }

    /// Realized PnL per day over the last 7 days vs the 23 days before.
    fn realized_daily_pace(
        &self,
        chain_id: &str,
        wallet_address: &str,
        now: i64,
    ) -> Result<(f64, f64)> {
        let split = now - RECENT_DAYS * 86_400;
        let start = now - (RECENT_DAYS + PRIOR_DAYS) * 86_400;

        let (recent, prior) = {
            let db = self.db.lock().unwrap();
            (
                db.trades_for_wallet(chain_id, wallet_address, split, now)?,
                db.trades_for_wallet(chain_id, wallet_address, start, split)?,
            )
        };

        let recent_daily = realized_pnl(&recent) / RECENT_DAYS as f64;
        let prior_daily = realized_pnl(&prior) / PRIOR_DAYS as f64;
        Ok((recent_daily, prior_daily))
    }
}

fn realized_pnl(trades: &[Trade]) -> f64 {
    use std::collections::HashMap;
    let mut by_token: HashMap<&str, Vec<Trade>> = HashMap::new();
    for trade in trades {
        by_token.entry(trade.token_address.as_str()).or_default().push(trade.clone());
    }
    by_token.values().map(|trades| pnl::fifo(trades).realized_pnl_usd).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeSide;

    fn stats(wallet: &str, pnl: f64, trades: u32, early: Option<f64>, multiple: Option<f64>) -> WalletStats30D {
        WalletStats30D {
            wallet_address: wallet.to_string(),
            chain_id: "eth".to_string(),
            trades_count: trades,
            realized_pnl_usd: pnl,
            unrealized_pnl_usd: pnl.max(0.0),
            best_trade_multiple: multiple,
            earlyscore_median: early,
            max_drawdown_pct: None,
            last_update: 0,
        }
    }

    fn maintainer(db: Arc<Mutex<Database>>) -> WatchlistMaintainer {
        let mut config = Config::default();
        config.chains.enabled = vec!["eth".to_string()];
        config.watchlist.top_n = 2;
        WatchlistMaintainer::new(db, &config)
    }

    fn seed_wallet(db: &Arc<Mutex<Database>>, wallet: &str, s: &WalletStats30D) {
        let mut guard = db.lock().unwrap();
        guard.upsert_wallet("eth", wallet, 0).unwrap();
        guard.upsert_stats(s).unwrap();
    }

    #[tokio::test]
    async fn test_top_n_cap_enforced() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        for (i, pnl) in [50_000.0, 40_000.0, 30_000.0, 20_000.0].iter().enumerate() {
            let wallet = format!("0xw{}", i);
            seed_wallet(&db, &wallet, &stats(&wallet, *pnl, 10, Some(60.0), Some(3.0)));
        }

        let maintainer = maintainer(db.clone());
        let outcome = maintainer.run_maintenance(1_000_000).await.unwrap();
        assert_eq!(outcome.added, 2);

        let guard = db.lock().unwrap();
        assert_eq!(guard.active_watchlist_count("eth").unwrap(), 2);
        let active = guard.active_watchlist("eth").unwrap();
        let wallets: Vec<&str> = active.iter().map(|e| e.wallet_address.as_str()).collect();
        assert!(wallets.contains(&"0xw0"));
        assert!(wallets.contains(&"0xw1"));
    }

    #[tokio::test]
    async fn test_bot_wallets_never_added() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        seed_wallet(&db, "0xbot", &stats("0xbot", 99_000.0, 10, Some(90.0), Some(5.0)));
        seed_wallet(&db, "0xhuman", &stats("0xhuman", 10_000.0, 10, Some(60.0), Some(3.0)));
        {
            let mut guard = db.lock().unwrap();
            guard.add_wallet_label("eth", "0xbot", "bot").unwrap();
        }

        let maintainer = maintainer(db.clone());
        maintainer.run_maintenance(1_000_000).await.unwrap();

        let guard = db.lock().unwrap();
        let active = guard.active_watchlist("eth").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].wallet_address, "0xhuman");
    }

    #[tokio::test]
    async fn test_remove_rules_fire() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let now = 1_000_000i64;

        // Active wallet whose stats have gone stale-bad.
        seed_wallet(&db, "0xfading", &stats("0xfading", 5_000.0, 10, Some(10.0), Some(5.0)));
        {
            let mut guard = db.lock().unwrap();
            guard
                .upsert_watchlist_entry(&WatchlistEntry {
                    wallet_address: "0xfading".to_string(),
                    chain_id: "eth".to_string(),
                    composite_score: 80.0,
                    added_at: now - 86_400,
                    last_evaluated_at: now - 86_400,
                    status: WatchStatus::Active,
                })
                .unwrap();
        }

        let maintainer = maintainer(db.clone());
        let outcome = maintainer.run_maintenance(now).await.unwrap();
        // Removed for low early median; nothing qualifies for add.
        assert_eq!(outcome.removed, 1);

        let guard = db.lock().unwrap();
        let entry = guard.get_watchlist_entry("eth", "0xfading").unwrap().unwrap();
        assert_eq!(entry.status, WatchStatus::Removed);
    }

    #[tokio::test]
    async fn test_removal_deferred_during_confluence_window() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let now = 1_000_000i64;

        seed_wallet(&db, "0xbusy", &stats("0xbusy", 5_000.0, 10, Some(10.0), Some(5.0)));
        {
            let mut guard = db.lock().unwrap();
            guard
                .upsert_watchlist_entry(&WatchlistEntry {
                    wallet_address: "0xbusy".to_string(),
                    chain_id: "eth".to_string(),
                    composite_score: 80.0,
                    added_at: now - 86_400,
                    last_evaluated_at: now - 86_400,
                    status: WatchStatus::Active,
                })
                .unwrap();
            // A trade 5 minutes ago, inside the 30-minute window.
            guard
                .insert_trade(&Trade {
                    tx_hash: "0xrecent".to_string(),
                    ts: now - 300,
                    chain_id: "eth".to_string(),
                    wallet_address: "0xbusy".to_string(),
                    token_address: "0xt".to_string(),
                    side: TradeSide::Buy,
                    qty_token: 1.0,
                    price_usd: 1.0,
                    usd_value: 1.0,
                    venue: None,
                })
                .unwrap();
        }

        let maintainer = maintainer(db.clone());
        let outcome = maintainer.run_maintenance(now).await.unwrap();
        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.deferred, 1);

        let guard = db.lock().unwrap();
        let entry = guard.get_watchlist_entry("eth", "0xbusy").unwrap().unwrap();
        assert_eq!(entry.status, WatchStatus::Active);
    }

    #[tokio::test]
    async fn test_removed_wallet_can_reenter() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let now = 1_000_000i64;
        seed_wallet(&db, "0xback", &stats("0xback", 50_000.0, 10, Some(70.0), Some(4.0)));
        {
            let mut guard = db.lock().unwrap();
            guard
                .upsert_watchlist_entry(&WatchlistEntry {
                    wallet_address: "0xback".to_string(),
                    chain_id: "eth".to_string(),
                    composite_score: 10.0,
                    added_at: now - 10 * 86_400,
                    last_evaluated_at: now - 86_400,
                    status: WatchStatus::Removed,
                })
                .unwrap();
        }

        let maintainer = maintainer(db.clone());
        let outcome = maintainer.run_maintenance(now).await.unwrap();
        assert_eq!(outcome.added, 1);

        let guard = db.lock().unwrap();
        let entry = guard.get_watchlist_entry("eth", "0xback").unwrap().unwrap();
        assert_eq!(entry.status, WatchStatus::Active);
    }
}
