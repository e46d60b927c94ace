//! Bot detection heuristics over a wallet's 30-day trade history.
//!
//! A wallet is flagged when any of:
//! (a) it averages more than 100 trades/day over the window;
//! (b) a buy and sell of the same token under 60 s apart accounts for more
//!     than 30% of its trades;
//! (c) every position it touched is a single buy/sell round-trip landing in
//!     the same block.
//!
//! Flagged wallets are excluded from the watchlist but stay in the store.

use std::collections::HashMap;
use tracing::debug;

use crate::types::{short_addr, Trade, TradeSide};

const MAX_TRADES_PER_DAY: f64 = 100.0;
const FAST_FLIP_SECS: i64 = 60;
const FAST_FLIP_RATIO: f64 = 0.30;
/// Trades this close together are treated as same-block; transfer feeds
/// carry timestamps, not block numbers.
const SAME_BLOCK_SECS: i64 = 15;

pub struct BotFilter {
    window_days: f64,
}

impl BotFilter {
    pub fn new(window_days: f64) -> Self {
        Self { window_days }
    }

    /// True when the wallet's history looks automated. Trades must cover a
    /// single wallet, any number of tokens.
    pub fn is_bot(&self, wallet_address: &str, trades: &[Trade]) -> bool {
        if trades.is_empty() {
            return false;
        }

        let rate = trades.len() as f64 / self.window_days.max(1.0);
        if rate > MAX_TRADES_PER_DAY {
            debug!(
                "🤖 {} flagged: {:.0} trades/day",
                short_addr(wallet_address),
                rate
            );
            return true;
        }

        let flip_ratio = fast_flip_ratio(trades);
        if flip_ratio > FAST_FLIP_RATIO {
            debug!(
                "🤖 {} flagged: {:.0}% fast flips",
                short_addr(wallet_address),
                flip_ratio * 100.0
            );
            return true;
        }

        if all_single_block_roundtrips(trades) {
            debug!(
                "🤖 {} flagged: every position is a same-block round-trip",
                short_addr(wallet_address)
            );
            return true;
        }

        false
    }
}

/// Share of trades that participate in a buy→sell pair on the same token
/// under `FAST_FLIP_SECS` apart.
fn fast_flip_ratio(trades: &[Trade]) -> f64 {
    let by_token = group_by_token(trades);
    let mut flip_trades = 0usize;

    for token_trades in by_token.values() {
        let buys: Vec<&Trade> = token_trades.iter().filter(|t| t.side == TradeSide::Buy).copied().collect();
        let sells: Vec<&Trade> = token_trades.iter().filter(|t| t.side == TradeSide::Sell).copied().collect();

        for buy in &buys {
            if sells
                .iter()
                .any(|s| s.ts >= buy.ts && s.ts - buy.ts < FAST_FLIP_SECS)
            {
                // Both legs of the flip count toward the ratio.
                flip_trades += 2;
            }
        }
    }

    flip_trades.min(trades.len()) as f64 / trades.len() as f64
}

/// True when the wallet has at least one position and every token it
/// touched is exactly one buy and one sell inside the same block.
fn all_single_block_roundtrips(trades: &[Trade]) -> bool {
    let by_token = group_by_token(trades);
    if by_token.is_empty() {
        return false;
    }

    by_token.values().all(|token_trades| {
        let buys: Vec<&Trade> = token_trades.iter().filter(|t| t.side == TradeSide::Buy).copied().collect();
        let sells: Vec<&Trade> = token_trades.iter().filter(|t| t.side == TradeSide::Sell).copied().collect();
        buys.len() == 1
            && sells.len() == 1
            && (sells[0].ts - buys[0].ts).abs() <= SAME_BLOCK_SECS
    })
}

fn group_by_token<'a>(trades: &'a [Trade]) -> HashMap<&'a str, Vec<&'a Trade>> {
    let mut map: HashMap<&str, Vec<&Trade>> = HashMap::new();
    for trade in trades {
        map.entry(trade.token_address.as_str()).or_default().push(trade);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(tx: &str, token: &str, ts: i64, side: TradeSide) -> Trade {
        Trade {
            tx_hash: tx.to_string(),
            ts,
            chain_id: "eth".to_string(),
            wallet_address: "0xw".to_string(),
            token_address: token.to_string(),
            side,
            qty_token: 1.0,
            price_usd: 1.0,
            usd_value: 1.0,
            venue: None,
        }
    }

    #[test]
    fn test_high_rate_flags() {
        let filter = BotFilter::new(1.0);
        let trades: Vec<Trade> = (0..150)
            .map(|i| trade(&format!("0x{:03x}", i), "0xt", i as i64 * 600, TradeSide::Buy))
            .collect();
        assert!(filter.is_bot("0xw", &trades));
    }

    #[test]
    fn test_fast_flips_flag() {
        let filter = BotFilter::new(30.0);
        // Three fast flips (6 trades) + 4 slow trades => 60% fast flips.
        let mut trades = Vec::new();
        for i in 0..3 {
            let base = i as i64 * 100_000;
            trades.push(trade(&format!("0xb{}", i), &format!("0xt{}", i), base, TradeSide::Buy));
            trades.push(trade(&format!("0xs{}", i), &format!("0xt{}", i), base + 20, TradeSide::Sell));
        }
        for i in 0..4 {
            trades.push(trade(&format!("0xslow{}", i), "0xother", 1_000_000 + i as i64 * 86_400, TradeSide::Buy));
        }
        assert!(filter.is_bot("0xw", &trades));
    }

    #[test]
    fn test_same_block_roundtrips_flag() {
        let filter = BotFilter::new(30.0);
        let trades = vec![
            trade("0x01", "0xt1", 100, TradeSide::Buy),
            trade("0x02", "0xt1", 105, TradeSide::Sell),
            trade("0x03", "0xt2", 500, TradeSide::Buy),
            trade("0x04", "0xt2", 510, TradeSide::Sell),
        ];
        assert!(filter.is_bot("0xw", &trades));
    }

    #[test]
    fn test_organic_trader_passes() {
        let filter = BotFilter::new(30.0);
        let day = 86_400i64;
        let trades = vec![
            trade("0x01", "0xt1", 0, TradeSide::Buy),
            trade("0x02", "0xt1", 2 * day, TradeSide::Sell),
            trade("0x03", "0xt2", 3 * day, TradeSide::Buy),
            trade("0x04", "0xt2", 3 * day + 7_200, TradeSide::Sell),
            trade("0x05", "0xt3", 5 * day, TradeSide::Buy),
        ];
        assert!(!filter.is_bot("0xw", &trades));
    }

    #[test]
    fn test_empty_history_passes() {
        let filter = BotFilter::new(30.0);
        assert!(!filter.is_bot("0xw", &[]));
    }
}
