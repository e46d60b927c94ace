//! Rolling 30-day stats recompute.
//!
//! Full recomputation per wallet, never incremental, so derived state
//! cannot drift from the trade history. Positions are rebuilt as a side
//! effect, with a watermark recording the trade range they derive from.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::botfilter::BotFilter;
use super::early::{self, BuyContext};
use super::pnl;
use crate::db::Database;
use crate::price::PriceEnricher;
use crate::types::{short_addr, Trade, TradeSide, WalletStats30D};

const WINDOW_DAYS: i64 = 30;
const WINDOW_SECS: i64 = WINDOW_DAYS * 86_400;

pub struct StatsRoller {
    db: Arc<Mutex<Database>>,
    prices: Arc<PriceEnricher>,
    bot_filter: BotFilter,
    worker_pool_size: usize,
}

impl StatsRoller {
    pub fn new(
        db: Arc<Mutex<Database>>,
        prices: Arc<PriceEnricher>,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            db,
            prices,
            bot_filter: BotFilter::new(WINDOW_DAYS as f64),
            worker_pool_size,
        }
    }

    /// Recompute stats for every wallet observed in the last 30 days.
    /// `now` is passed in so a rerun over unchanged trades is bit-identical.
    pub async fn roll_all(&self, now: i64) -> Result<usize> {
        let wallets = {
            let db = self.db.lock().unwrap();
            db.wallets_traded_since(now - WINDOW_SECS)?
        };

        info!("📈 Stats roll: {} wallets in window", wallets.len());

        let rolled = stream::iter(wallets)
            .map(|(chain_id, wallet_address)| async move {
                match self.roll_wallet(&chain_id, &wallet_address, now).await {
                    Ok(()) => 1usize,
                    Err(e) => {
                        warn!(
                            "Stats roll failed for {} on {}: {:#}",
                            short_addr(&wallet_address),
                            chain_id,
                            e
                        );
                        0
                    }
                }
            })
            .buffer_unordered(self.worker_pool_size)
            .fold(0usize, |acc, n| async move { acc + n })
            .await;

        info!("📈 Stats roll complete: {} wallets updated", rolled);
        Ok(rolled)
    }

    pub async fn roll_wallet(&self, chain_id: &str, wallet_address: &str, now: i64) -> Result<()> {
        let since = now - WINDOW_SECS;
        let trades = {
            let db = self.db.lock().unwrap();
            db.trades_for_wallet(chain_id, wallet_address, since, now)?
        };

        let mut by_token: HashMap<String, Vec<Trade>> = HashMap::new();
        for trade in &trades {
            by_token
                .entry(trade.token_address.clone())
                .or_default()
                .push(trade.clone());
        }

        let mut realized = 0.0f64;
        let mut unrealized = 0.0f64;
        let mut best_multiple: Option<f64> = None;
        let mut all_closed = Vec::new();
        let mut early_scores = Vec::new();

        // Deterministic token order keeps reruns identical.
        let mut tokens: Vec<&String> = by_token.keys().collect();
        tokens.sort();

        for token_address in tokens {
            let token_trades = &by_token[token_address.as_str()];
            let outcome = pnl::fifo(token_trades);

            let current_price = if outcome.open_lots.is_empty() {
                None
            } else {
                self.prices.price_of(chain_id, token_address).await
            };

            realized += outcome.realized_pnl_usd;
            unrealized += outcome.unrealized_pnl_usd(current_price);
            if let Some(m) = outcome.best_multiple() {
                best_multiple = Some(best_multiple.map_or(m, |b: f64| b.max(m)));
            }
            all_closed.extend(outcome.closed.iter().cloned());

            early_scores.extend(self.score_buys(chain_id, wallet_address, token_address, token_trades)?);

            let watermark = token_trades.last().map(|t| t.ts).unwrap_or(since);
            let mut db = self.db.lock().unwrap();
            db.upsert_position(
                chain_id,
                wallet_address,
                token_address,
                &outcome.open_lots,
                outcome.realized_pnl_usd,
                outcome.unrealized_pnl_usd(current_price),
                current_price,
                watermark,
                now,
            )?;
        }

        let stats = WalletStats30D {
            wallet_address: wallet_address.to_string(),
            chain_id: chain_id.to_string(),
            trades_count: trades.len() as u32,
            realized_pnl_usd: realized,
            unrealized_pnl_usd: unrealized,
            best_trade_multiple: best_multiple,
            earlyscore_median: early::median_score(early_scores),
            max_drawdown_pct: pnl::max_drawdown_pct(&all_closed),
            last_update: now,
        };

        let is_bot = self.bot_filter.is_bot(wallet_address, &trades);

        {
            let mut db = self.db.lock().unwrap();
            db.upsert_stats(&stats)?;
            if is_bot {
                db.add_wallet_label(chain_id, wallet_address, "bot")?;
            }
        }

        debug!(
            "Stats: {} trades={} realized=${:.0} unrealized=${:.0} early={:?}",
            short_addr(wallet_address),
            stats.trades_count,
            stats.realized_pnl_usd,
            stats.unrealized_pnl_usd,
            stats.earlyscore_median,
        );

        Ok(())
    }

    /// Being-Early inputs for each of the wallet's buys on one token.
    fn score_buys(
        &self,
        chain_id: &str,
        wallet_address: &str,
        token_address: &str,
        token_trades: &[Trade],
    ) -> Result<Vec<f64>> {
        let buys: Vec<&Trade> = token_trades
            .iter()
            .filter(|t| t.side == TradeSide::Buy)
            .collect();
        if buys.is_empty() {
            return Ok(Vec::new());
        }

        let (buyer_ranks, token) = {
            let db = self.db.lock().unwrap();
            (
                db.token_buyer_first_ts(chain_id, token_address)?,
                db.get_token(chain_id, token_address)?,
            )
        };

        let total_buyers = buyer_ranks.len().max(1);
        let buyer_rank = buyer_ranks
            .iter()
            .position(|(w, _)| w == wallet_address)
            .unwrap_or(total_buyers - 1);

        let mcap = early::mcap_from_liquidity(token.as_ref().and_then(|t| t.liquidity_usd));
        let vol_24h = token.as_ref().and_then(|t| t.vol_24h_usd);

        Ok(buys
            .iter()
            .map(|buy| {
                early::score_buy(&BuyContext {
                    buyer_rank,
                    total_buyers,
                    mcap_at_buy_usd: mcap,
                    buy_value_usd: buy.usd_value,
                    vol_24h_usd: vol_24h,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterRegistry;
    use crate::types::Token;
    use std::time::Duration;

    fn trade(tx: &str, wallet: &str, token: &str, ts: i64, side: TradeSide, qty: f64, price: f64) -> Trade {
        Trade {
            tx_hash: tx.to_string(),
            ts,
            chain_id: "eth".to_string(),
            wallet_address: wallet.to_string(),
            token_address: token.to_string(),
            side,
            qty_token: qty,
            price_usd: price,
            usd_value: qty * price,
            venue: None,
        }
    }

    fn roller(db: Arc<Mutex<Database>>) -> StatsRoller {
        // No live price sources: unrealized falls back to last trade price.
        let registry = Arc::new(AdapterRegistry::with_adapters(vec![], vec![], vec![], vec![]));
        let prices = Arc::new(PriceEnricher::new(registry, db.clone(), Duration::from_secs(60)));
        StatsRoller::new(db, prices, 4)
    }

    #[tokio::test]
    async fn test_roll_wallet_realized_and_open() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let now = 1_000_000i64;
        {
            let mut guard = db.lock().unwrap();
            guard.upsert_wallet("eth", "0xw1", now - 100).unwrap();
            guard
                .upsert_token(&Token {
                    chain_id: "eth".to_string(),
                    token_address: "0xt1".to_string(),
                    symbol: Some("T1".to_string()),
                    name: None,
                    last_price_usd: Some(3.0),
                    liquidity_usd: Some(100_000.0),
                    vol_24h_usd: Some(500_000.0),
                    buy_tax_pct: None,
                    sell_tax_pct: None,
                    is_honeypot: None,
                    first_seen_at: now - 100,
                })
                .unwrap();
            guard.insert_trade(&trade("0x01", "0xw1", "0xt1", now - 300, TradeSide::Buy, 100.0, 1.0)).unwrap();
            guard.insert_trade(&trade("0x02", "0xw1", "0xt1", now - 200, TradeSide::Buy, 50.0, 2.0)).unwrap();
            guard.insert_trade(&trade("0x03", "0xw1", "0xt1", now - 100, TradeSide::Sell, 120.0, 3.0)).unwrap();
        }

        let roller = roller(db.clone());
        roller.roll_wallet("eth", "0xw1", now).await.unwrap();

        let stats = {
            let guard = db.lock().unwrap();
            guard.get_stats("eth", "0xw1").unwrap().unwrap()
        };
        assert_eq!(stats.trades_count, 3);
        assert!((stats.realized_pnl_usd - 220.0).abs() < 1e-6);
        // Open lot 30 @ $2, last trade price $3 -> +30 unrealized.
        assert!((stats.unrealized_pnl_usd - 30.0).abs() < 1e-6);
        assert_eq!(stats.best_trade_multiple, Some(3.0));
        assert!(stats.earlyscore_median.is_some());

        let lots = {
            let guard = db.lock().unwrap();
            guard.get_position_lots("eth", "0xw1", "0xt1").unwrap().unwrap()
        };
        assert_eq!(lots.len(), 1);
        assert!((lots[0].qty_remaining - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_roll_all_idempotent_with_fixed_now() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let now = 2_000_000i64;
        {
            let mut guard = db.lock().unwrap();
            guard.upsert_wallet("eth", "0xw1", now - 100).unwrap();
            guard.insert_trade(&trade("0x01", "0xw1", "0xt1", now - 300, TradeSide::Buy, 10.0, 1.0)).unwrap();
            guard.insert_trade(&trade("0x02", "0xw1", "0xt1", now - 100, TradeSide::Sell, 10.0, 2.0)).unwrap();
        }

        let roller = roller(db.clone());
        roller.roll_all(now).await.unwrap();
        let first = {
            let guard = db.lock().unwrap();
            guard.get_stats("eth", "0xw1").unwrap().unwrap()
        };

        roller.roll_all(now).await.unwrap();
        let second = {
            let guard = db.lock().unwrap();
            guard.get_stats("eth", "0xw1").unwrap().unwrap()
        };

        assert_eq!(first.trades_count, second.trades_count);
        assert_eq!(first.realized_pnl_usd, second.realized_pnl_usd);
        assert_eq!(first.unrealized_pnl_usd, second.unrealized_pnl_usd);
        assert_eq!(first.best_trade_multiple, second.best_trade_multiple);
        assert_eq!(first.earlyscore_median, second.earlyscore_median);
        assert_eq!(first.last_update, second.last_update);
    }

    #[tokio::test]
    async fn test_bot_wallet_gets_labeled() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let now = 3_000_000i64;
        {
            let mut guard = db.lock().unwrap();
            guard.upsert_wallet("eth", "0xbot", now - 1000).unwrap();
            // Single-block round-trips on every token.
            guard.insert_trade(&trade("0x01", "0xbot", "0xt1", now - 500, TradeSide::Buy, 1.0, 1.0)).unwrap();
            guard.insert_trade(&trade("0x02", "0xbot", "0xt1", now - 495, TradeSide::Sell, 1.0, 1.1)).unwrap();
        }

        let roller = roller(db.clone());
        roller.roll_wallet("eth", "0xbot", now).await.unwrap();

        let wallet = {
            let guard = db.lock().unwrap();
            guard.get_wallet("eth", "0xbot").unwrap().unwrap()
        };
        assert!(wallet.is_bot());
    }
}
