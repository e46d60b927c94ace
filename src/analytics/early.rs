//! Being-Early score: a 0-100 metric favoring wallets that buy early among
//! all observed buyers of a token, at low market cap, with meaningful size.
//!
//! ```text
//! score = 40·(1 − rank_pct)
//!       + 40·clip((1e6 − mcap_at_buy) / 1e6, 0, 1)
//!       + 20·clip(volume_participation, 0, 1)
//! ```
//!
//! Per wallet, the reported figure is the median over its buys in the
//! 30-day window.

const TARGET_MCAP_USD: f64 = 1_000_000.0;
/// Market cap proxy when no explicit figure is available.
const MCAP_LIQUIDITY_MULTIPLE: f64 = 3.0;

/// Inputs for one buy's score.
#[derive(Debug, Clone)]
pub struct BuyContext {
    /// 0-based rank of this wallet among all observed buyers of the token,
    /// by first-buy time.
    pub buyer_rank: usize,
    /// Total distinct observed buyers of the token.
    pub total_buyers: usize,
    /// Market cap estimate at buy time, if known.
    pub mcap_at_buy_usd: Option<f64>,
    /// USD value of this buy.
    pub buy_value_usd: f64,
    /// Token 24h USD volume.
    pub vol_24h_usd: Option<f64>,
}

/// Estimate market cap from liquidity when no explicit cap is known.
pub fn mcap_from_liquidity(liquidity_usd: Option<f64>) -> Option<f64> {
    liquidity_usd.map(|l| l * MCAP_LIQUIDITY_MULTIPLE)
}

pub fn score_buy(ctx: &BuyContext) -> f64 {
    let rank_score = {
        let total = ctx.total_buyers.max(1) as f64;
        let rank_pct = ctx.buyer_rank as f64 / total;
        40.0 * (1.0 - rank_pct)
    };

    // Unknown market cap earns the neutral midpoint rather than either
    // extreme.
    let mc_score = match ctx.mcap_at_buy_usd {
        Some(mcap) => {
            let proportion = ((TARGET_MCAP_USD - mcap) / TARGET_MCAP_USD).clamp(0.0, 1.0);
            40.0 * proportion
        }
        None => 20.0,
    };

    let vol_score = match ctx.vol_24h_usd {
        Some(vol) if vol > 0.0 => {
            let participation = (ctx.buy_value_usd / vol).clamp(0.0, 1.0);
            20.0 * participation
        }
        _ => 0.0,
    };

    (rank_score + mc_score + vol_score).clamp(0.0, 100.0)
}

/// Median of per-buy scores; `None` for a wallet with no buys.
pub fn median_score(mut scores: Vec<f64>) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = scores.len() / 2;
    if scores.len() % 2 == 1 {
        Some(scores[mid])
    } else {
        Some((scores[mid - 1] + scores[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> BuyContext {
        BuyContext {
            buyer_rank: 0,
            total_buyers: 10,
            mcap_at_buy_usd: Some(100_000.0),
            buy_value_usd: 5_000.0,
            vol_24h_usd: Some(100_000.0),
        }
    }

    #[test]
    fn test_first_buyer_low_mcap() {
        // rank: 40·(1-0) = 40; mc: 40·0.9 = 36; vol: 20·0.05 = 1
        let score = score_buy(&ctx());
        assert!((score - 77.0).abs() < 1e-9);
    }

    #[test]
    fn test_last_buyer_high_mcap_scores_low() {
        let mut c = ctx();
        c.buyer_rank = 9;
        c.mcap_at_buy_usd = Some(5_000_000.0);
        c.buy_value_usd = 0.0;
        // rank: 40·(1-0.9)=4; mc: 0; vol: 0
        let score = score_buy(&c);
        assert!((score - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_bounds() {
        // Whale buy bigger than the whole 24h volume clamps at 1.0.
        let mut c = ctx();
        c.buy_value_usd = 10_000_000.0;
        c.mcap_at_buy_usd = Some(0.0);
        let score = score_buy(&c);
        assert!(score <= 100.0);
        assert!((score - 100.0).abs() < 1e-9);

        let mut worst = ctx();
        worst.buyer_rank = 100;
        worst.total_buyers = 100;
        worst.mcap_at_buy_usd = Some(f64::MAX);
        worst.vol_24h_usd = None;
        assert!(score_buy(&worst) >= 0.0);
    }

    #[test]
    fn test_unknown_mcap_is_neutral() {
        let mut c = ctx();
        c.mcap_at_buy_usd = None;
        c.buy_value_usd = 0.0;
        // rank 40 + neutral 20
        assert!((score_buy(&c) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_mcap_proxy() {
        assert_eq!(mcap_from_liquidity(Some(100_000.0)), Some(300_000.0));
        assert_eq!(mcap_from_liquidity(None), None);
    }

    #[test]
    fn test_median() {
        assert_eq!(median_score(vec![]), None);
        assert_eq!(median_score(vec![10.0]), Some(10.0));
        assert_eq!(median_score(vec![10.0, 20.0]), Some(15.0));
        assert_eq!(median_score(vec![30.0, 10.0, 20.0]), Some(20.0));
    }
}
