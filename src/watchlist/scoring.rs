//! Composite wallet scoring.
//!
//! ```text
//! S = w_pnl·P(unrealized_pnl) + w_act·P(trade_count) + w_early·P(early_median)
//! ```
//!
//! `P(x)` is the empirical percentile rank among all wallets on the same
//! chain, scaled to [0, 100], so S is also bounded to [0, 100].
//!
//! Weight adaptation from alert outcomes is optional and bounded: at most
//! 0.05 movement per weight per daily evaluation, weights always renormalized
//! to sum 1, and the weights in force are snapshotted into every alert row
//! for later attribution.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::db::{AlertRow, Database};
use crate::types::WalletStats30D;

const MAX_DAILY_SHIFT: f64 = 0.05;
const WEIGHT_FLOOR: f64 = 0.10;
const WEIGHT_CEIL: f64 = 0.60;
/// A token must be up this much over its alert price for the alert to
/// count as a win.
const WIN_THRESHOLD_MULTIPLE: f64 = 1.10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub pnl: f64,
    pub activity: f64,
    pub early: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self { pnl: 0.30, activity: 0.30, early: 0.40 }
    }
}

impl Weights {
    pub fn new(pnl: f64, activity: f64, early: f64) -> Self {
        Self { pnl, activity, early }.normalized()
    }

    fn normalized(mut self) -> Self {
        let sum = self.pnl + self.activity + self.early;
        if sum > 0.0 {
            self.pnl /= sum;
            self.activity /= sum;
            self.early /= sum;
        }
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Persisted weight state, saved alongside the database so restarts keep
/// learned weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsState {
    pub weights: Weights,
    pub last_adjusted: i64,
}

impl WeightsState {
    pub fn load_or_default<P: AsRef<Path>>(path: P, defaults: Weights) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or(Self {
                weights: defaults,
                last_adjusted: 0,
            }),
            Err(_) => Self { weights: defaults, last_adjusted: 0 },
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create weights directory")?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize weights")?;
        let temp = path.as_ref().with_extension("tmp");
        fs::write(&temp, contents).context("Failed to write temp weights file")?;
        fs::rename(&temp, &path).context("Failed to rename weights file")?;
        Ok(())
    }
}

/// Percentile rank of `x` among `values`, scaled to [0, 100]. Ties share a
/// rank; a single value ranks 100.
pub fn percentile_rank(values: &[f64], x: f64) -> f64 {
    if values.len() <= 1 {
        return 100.0;
    }
    let below = values.iter().filter(|v| **v < x).count();
    below as f64 / (values.len() - 1) as f64 * 100.0
}

/// Composite score per wallet for one chain's stats population.
/// The PnL term ranks unrealized PnL, not realized+unrealized.
pub fn composite_scores(stats: &[WalletStats30D], weights: Weights) -> HashMap<String, f64> {
    let pnls: Vec<f64> = stats.iter().map(|s| s.unrealized_pnl_usd).collect();
    let counts: Vec<f64> = stats.iter().map(|s| s.trades_count as f64).collect();
    let earlies: Vec<f64> = stats.iter().map(|s| s.earlyscore_median.unwrap_or(0.0)).collect();

    stats
        .iter()
        .map(|s| {
            let score = weights.pnl * percentile_rank(&pnls, s.unrealized_pnl_usd)
                + weights.activity * percentile_rank(&counts, s.trades_count as f64)
                + weights.early * percentile_rank(&earlies, s.earlyscore_median.unwrap_or(0.0));
            (s.wallet_address.clone(), score.clamp(0.0, 100.0))
        })
        .collect()
}

/// Win rate of recent alerts: the alerted token trades above the alert
/// price by the win threshold. `None` when there were no priced alerts.
pub fn alert_win_rate(db: &Database, alerts: &[AlertRow]) -> Option<f64> {
    let mut wins = 0usize;
    let mut judged = 0usize;

    for alert in alerts {
        let Some(alert_price) = alert.price_usd.filter(|p| *p > 0.0) else {
            continue;
        };
        let current = db
            .get_token(&alert.chain_id, &alert.token_address)
            .ok()
            .flatten()
            .and_then(|t| t.last_price_usd);
        let Some(current) = current else {
            continue;
        };

        judged += 1;
        if current >= alert_price * WIN_THRESHOLD_MULTIPLE {
            wins += 1;
        }
    }

    if judged == 0 {
        None
    } else {
        Some(wins as f64 / judged as f64)
    }
}

/// One bounded adjustment step from the observed win rate.
///
/// A weak week (win rate < 40%) shifts weight out of raw PnL toward the
/// Being-Early component; a strong week (> 60%) shifts it back. Each
/// weight moves at most `MAX_DAILY_SHIFT`, stays inside
/// `[WEIGHT_FLOOR, WEIGHT_CEIL]`, and the result is renormalized.
pub fn adjust_weights(current: Weights, win_rate: f64) -> Weights {
    let mut next = current;

    if win_rate < 0.40 {
        let shift = MAX_DAILY_SHIFT.min(next.pnl - WEIGHT_FLOOR);
        next.pnl -= shift;
        next.early = (next.early + shift).min(WEIGHT_CEIL);
        debug!("Weights: weak win rate {:.0}%, shifting {:.2} pnl→early", win_rate * 100.0, shift);
    } else if win_rate > 0.60 {
        let shift = MAX_DAILY_SHIFT.min(next.early - WEIGHT_FLOOR);
        next.early -= shift;
        next.pnl = (next.pnl + shift).min(WEIGHT_CEIL);
        debug!("Weights: strong win rate {:.0}%, shifting {:.2} early→pnl", win_rate * 100.0, shift);
    }

    next.normalized()
}

/// Daily adaptive step: evaluate the past week's alerts and nudge weights.
/// Returns the weights to use for this evaluation.
pub fn adaptive_step(
    db: &Database,
    state: &mut WeightsState,
    now: i64,
) -> Result<Weights> {
    let alerts = db.alerts_since(now - 7 * 86_400)?;
    if let Some(win_rate) = alert_win_rate(db, &alerts) {
        let before = state.weights;
        state.weights = adjust_weights(state.weights, win_rate);
        state.last_adjusted = now;
        if state.weights != before {
            info!(
                "⚖️  Adaptive weights: win_rate={:.0}% → pnl={:.2} act={:.2} early={:.2}",
                win_rate * 100.0,
                state.weights.pnl,
                state.weights.activity,
                state.weights.early
            );
        }
    }
    Ok(state.weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(wallet: &str, unrealized: f64, trades: u32, early: Option<f64>) -> WalletStats30D {
        WalletStats30D {
            wallet_address: wallet.to_string(),
            chain_id: "eth".to_string(),
            trades_count: trades,
            realized_pnl_usd: 0.0,
            unrealized_pnl_usd: unrealized,
            best_trade_multiple: None,
            earlyscore_median: early,
            max_drawdown_pct: None,
            last_update: 0,
        }
    }

    #[test]
    fn test_percentile_rank_bounds() {
        let values = vec![10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile_rank(&values, 10.0), 0.0);
        assert_eq!(percentile_rank(&values, 40.0), 100.0);
        assert!((percentile_rank(&values, 30.0) - 66.666).abs() < 0.01);
        assert_eq!(percentile_rank(&[5.0], 5.0), 100.0);
    }

    #[test]
    fn test_composite_scores_bounded_and_ordered() {
        let population = vec![
            stats("0xbest", 100_000.0, 50, Some(80.0)),
            stats("0xmid", 10_000.0, 20, Some(40.0)),
            stats("0xworst", -5_000.0, 1, None),
        ];
        let scores = composite_scores(&population, Weights::default());

        for score in scores.values() {
            assert!(*score >= 0.0 && *score <= 100.0);
        }
        assert!(scores["0xbest"] > scores["0xmid"]);
        assert!(scores["0xmid"] > scores["0xworst"]);
        assert_eq!(scores["0xbest"], 100.0);
    }

    #[test]
    fn test_composite_pnl_term_is_unrealized_only() {
        // Huge realized profit must not outrank a live unrealized position.
        let mut cashed_out = stats("0xa", 0.0, 10, Some(50.0));
        cashed_out.realized_pnl_usd = 1_000_000.0;
        let holder = stats("0xb", 10_000.0, 10, Some(50.0));

        let scores = composite_scores(&[cashed_out, holder], Weights::default());
        assert!(scores["0xb"] > scores["0xa"]);
    }

    #[test]
    fn test_adjust_weights_bounded_and_normalized() {
        let defaults = Weights::default();

        let weakened = adjust_weights(defaults, 0.20);
        assert!((weakened.pnl - 0.25).abs() < 1e-9);
        assert!((weakened.early - 0.45).abs() < 1e-9);
        assert!((weakened.pnl + weakened.activity + weakened.early - 1.0).abs() < 1e-9);

        let strengthened = adjust_weights(defaults, 0.80);
        assert!((strengthened.pnl - 0.35).abs() < 1e-9);
        assert!((strengthened.early - 0.35).abs() < 1e-9);

        let unchanged = adjust_weights(defaults, 0.50);
        assert_eq!(unchanged, defaults);
    }

    #[test]
    fn test_adjust_weights_respects_floor() {
        let near_floor = Weights::new(0.12, 0.30, 0.58);
        let mut w = near_floor;
        for _ in 0..10 {
            w = adjust_weights(w, 0.10);
        }
        assert!(w.pnl >= WEIGHT_FLOOR - 1e-9);
        assert!(w.early <= WEIGHT_CEIL + 1e-9);
    }

    #[test]
    fn test_weights_state_roundtrip() {
        let dir = std::env::temp_dir().join("wallet-scout-test-weights");
        let path = dir.join("weights.json");
        let _ = std::fs::remove_file(&path);

        let loaded = WeightsState::load_or_default(&path, Weights::default());
        assert_eq!(loaded.weights, Weights::default());

        let state = WeightsState {
            weights: Weights::new(0.25, 0.30, 0.45),
            last_adjusted: 123,
        };
        state.save(&path).unwrap();

        let reloaded = WeightsState::load_or_default(&path, Weights::default());
        assert_eq!(reloaded.weights, state.weights);
        assert_eq!(reloaded.last_adjusted, 123);

        let _ = std::fs::remove_file(&path);
    }
}
