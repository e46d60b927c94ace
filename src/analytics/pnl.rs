//! FIFO profit-and-loss accounting.
//!
//! Pure functions over a wallet's trades on a single token, sorted by
//! `(ts, tx_hash)` before processing. A buy pushes a lot; a sell pops from
//! the head until satisfied. Sell quantity beyond the open lots is matched
//! at zero cost (real sells can precede observed buys when history is
//! partial) and reported in the outcome so callers can log it.

use tracing::warn;

use crate::types::{Lot, Trade, TradeSide};

/// One sell-against-buy match produced while draining the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedMatch {
    pub qty: f64,
    pub buy_price_usd: f64,
    pub sell_price_usd: f64,
    pub buy_ts: i64,
    pub sell_ts: i64,
}

impl ClosedMatch {
    /// Realized multiple for this match; zero-cost fallback matches have no
    /// meaningful multiple.
    pub fn multiple(&self) -> Option<f64> {
        if self.buy_price_usd > 0.0 {
            Some(self.sell_price_usd / self.buy_price_usd)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FifoOutcome {
    pub realized_pnl_usd: f64,
    pub open_lots: Vec<Lot>,
    pub closed: Vec<ClosedMatch>,
    /// Sell quantity that had no open lot and was matched at zero cost.
    pub clamped_qty: f64,
}

impl FifoOutcome {
    /// Unrealized PnL of the open lots at the given price. `None` means
    /// price-unknown: contribution is zero, never fabricated.
    pub fn unrealized_pnl_usd(&self, current_price_usd: Option<f64>) -> f64 {
        let Some(price) = current_price_usd else {
            return 0.0;
        };
        self.open_lots
            .iter()
            .map(|lot| lot.qty_remaining * (price - lot.unit_cost_usd))
            .sum()
    }

    /// Best realized trade multiple across closed lots.
    pub fn best_multiple(&self) -> Option<f64> {
        self.closed
            .iter()
            .filter_map(ClosedMatch::multiple)
            .fold(None, |best, m| Some(best.map_or(m, |b: f64| b.max(m))))
    }
}

/// Deterministic trade ordering for FIFO processing.
pub fn sort_for_fifo(trades: &mut [Trade]) {
    trades.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.tx_hash.cmp(&b.tx_hash)));
}

/// Run FIFO matching over one wallet's trades on one token.
/// Trades must already be sorted via [`sort_for_fifo`].
pub fn fifo(trades: &[Trade]) -> FifoOutcome {
    let mut outcome = FifoOutcome::default();
    let mut queue: Vec<Lot> = Vec::new();

    for trade in trades {
        match trade.side {
            TradeSide::Buy => {
                queue.push(Lot {
                    qty_remaining: trade.qty_token,
                    unit_cost_usd: trade.price_usd,
                    acquired_ts: trade.ts,
                });
            }
            TradeSide::Sell => {
                let mut remaining = trade.qty_token;

                while remaining > 0.0 && !queue.is_empty() {
                    let lot = &mut queue[0];
                    let matched = remaining.min(lot.qty_remaining);

                    outcome.realized_pnl_usd += matched * (trade.price_usd - lot.unit_cost_usd);
                    outcome.closed.push(ClosedMatch {
                        qty: matched,
                        buy_price_usd: lot.unit_cost_usd,
                        sell_price_usd: trade.price_usd,
                        buy_ts: lot.acquired_ts,
                        sell_ts: trade.ts,
                    });

                    lot.qty_remaining -= matched;
                    remaining -= matched;
                    if lot.qty_remaining <= 1e-12 {
                        queue.remove(0);
                    }
                }

                if remaining > 1e-12 {
                    // Partial history: sell without an observed buy. Zero
                    // cost basis, flagged for the caller.
                    warn!(
                        "FIFO clamp: sell {} of {} exceeds open lots by {:.6} (wallet {})",
                        trade.tx_hash, trade.token_address, remaining, trade.wallet_address
                    );
                    outcome.realized_pnl_usd += remaining * trade.price_usd;
                    outcome.closed.push(ClosedMatch {
                        qty: remaining,
                        buy_price_usd: 0.0,
                        sell_price_usd: trade.price_usd,
                        buy_ts: trade.ts,
                        sell_ts: trade.ts,
                    });
                    outcome.clamped_qty += remaining;
                }
            }
        }
    }

    outcome.open_lots = queue;
    outcome
}

/// Peak-to-trough drawdown of the cumulative realized PnL series, as a
/// percentage of the peak. Only meaningful once some profit has accrued.
pub fn max_drawdown_pct(closed: &[ClosedMatch]) -> Option<f64> {
    if closed.is_empty() {
        return None;
    }

    let mut ordered: Vec<&ClosedMatch> = closed.iter().collect();
    ordered.sort_by_key(|m| m.sell_ts);

    let mut cumulative = 0.0f64;
    let mut peak = 0.0f64;
    let mut worst = 0.0f64;

    for m in ordered {
        cumulative += m.qty * (m.sell_price_usd - m.buy_price_usd);
        if cumulative > peak {
            peak = cumulative;
        } else if peak > 0.0 {
            let drawdown = (peak - cumulative) / peak * 100.0;
            if drawdown > worst {
                worst = drawdown;
            }
        }
    }

    Some(worst)
}
