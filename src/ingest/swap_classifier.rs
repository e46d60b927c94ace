//! DEX-swap recognition over raw transfer streams.
//!
//! The raw stream mixes swaps with routing hops, internal transfers and
//! airdrops. Liquidity pools are spotted by fan-out: an address sending the
//! token to more than `pool_send_threshold` distinct transfers inside the
//! window is treated as a pool. A transfer *from* a pool is a buy (the `to`
//! side is the buyer); a transfer from a non-pool *to* a pool is a sell.
//! Everything else is discarded.
//!
//! Concentrated-liquidity routers that split one swap across many pools can
//! defeat the fan-out count; no router allowlist is applied here.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::types::{Trade, TradeSide, Transfer};

#[derive(Debug, Clone)]
pub struct ClassifiedSwap {
    pub transfer: Transfer,
    pub side: TradeSide,
    /// The trading wallet: `to` for buys, `from` for sells.
    pub wallet_address: String,
}

#[derive(Debug, Default)]
pub struct Classification {
    pub pools: HashSet<String>,
    pub swaps: Vec<ClassifiedSwap>,
    pub discarded: usize,
}

pub struct SwapClassifier {
    pool_send_threshold: u32,
}

impl SwapClassifier {
    pub fn new(pool_send_threshold: u32) -> Self {
        Self { pool_send_threshold }
    }

    /// Classify a token-centric transfer window.
    pub fn classify(&self, transfers: &[Transfer]) -> Classification {
        let pools = self.detect_pools(transfers);
        let mut result = Classification {
            pools: pools.clone(),
            ..Default::default()
        };

        for transfer in transfers {
            let from_is_pool = pools.contains(&transfer.from_address);
            let to_is_pool = pools.contains(&transfer.to_address);

            if from_is_pool && !to_is_pool {
                result.swaps.push(ClassifiedSwap {
                    wallet_address: transfer.to_address.clone(),
                    side: TradeSide::Buy,
                    transfer: transfer.clone(),
                });
            } else if to_is_pool && !from_is_pool {
                result.swaps.push(ClassifiedSwap {
                    wallet_address: transfer.from_address.clone(),
                    side: TradeSide::Sell,
                    transfer: transfer.clone(),
                });
            } else {
                // Pool-to-pool rebalances and plain wallet-to-wallet
                // transfers are not swaps.
                result.discarded += 1;
            }
        }

        debug!(
            "Swap classification: {} pools, {} swaps, {} discarded of {}",
            result.pools.len(),
            result.swaps.len(),
            result.discarded,
            transfers.len()
        );
        result
    }

    /// Classify transfers fetched for a specific wallet. The pool tally
    /// comes from the same window; the wallet itself is never a pool.
    pub fn classify_for_wallet(&self, wallet_address: &str, transfers: &[Transfer]) -> Vec<ClassifiedSwap> {
        let mut pools = self.detect_pools(transfers);
        pools.remove(wallet_address);

        transfers
            .iter()
            .filter_map(|transfer| {
                if transfer.to_address == wallet_address
                    && pools.contains(&transfer.from_address)
                {
                    Some(ClassifiedSwap {
                        wallet_address: wallet_address.to_string(),
                        side: TradeSide::Buy,
                        transfer: transfer.clone(),
                    })
                } else if transfer.from_address == wallet_address
                    && pools.contains(&transfer.to_address)
                {
                    Some(ClassifiedSwap {
                        wallet_address: wallet_address.to_string(),
                        side: TradeSide::Sell,
                        transfer: transfer.clone(),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Addresses sending a given token more than the threshold number of
    /// times inside the window. Tallied per token so a busy multi-token
    /// window cannot cross-contaminate counts.
    fn detect_pools(&self, transfers: &[Transfer]) -> HashSet<String> {
        let mut send_counts: HashMap<(&str, &str), u32> = HashMap::new();
        for transfer in transfers {
            *send_counts
                .entry((transfer.token_address.as_str(), transfer.from_address.as_str()))
                .or_insert(0) += 1;
        }

        send_counts
            .into_iter()
            .filter(|(_, count)| *count > self.pool_send_threshold)
            .map(|((_, sender), _)| sender.to_string())
            .collect()
    }
}

/// Build a Trade row from a classified swap plus a price-at-observe.
pub fn swap_to_trade(swap: &ClassifiedSwap, chain_id: &str, price_usd: f64) -> Trade {
    Trade {
        tx_hash: swap.transfer.tx_hash.clone(),
        ts: swap.transfer.ts,
        chain_id: chain_id.to_string(),
        wallet_address: swap.wallet_address.clone(),
        token_address: swap.transfer.token_address.clone(),
        side: swap.side,
        qty_token: swap.transfer.qty,
        price_usd,
        usd_value: swap.transfer.qty * price_usd,
        venue: Some("dex_pool".to_string()),
    }
}
