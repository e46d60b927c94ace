use serde::{Deserialize, Serialize};

/// Token identity and metadata as tracked in the store.
/// Identity is `(chain_id, token_address)`; addresses are normalized via
/// [`normalize_address`] before they reach this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub chain_id: String,
    pub token_address: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub last_price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub vol_24h_usd: Option<f64>,
    pub buy_tax_pct: Option<f64>,
    pub sell_tax_pct: Option<f64>,
    pub is_honeypot: Option<bool>,
    pub first_seen_at: i64,
}

/// One trending-list appearance of a token. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedToken {
    pub chain_id: String,
    pub token_address: String,
    pub source: String,
    pub snapshot_ts: i64,
    pub rank: Option<u32>,
    pub vol_24h_usd: Option<f64>,
}

/// Normalized trending-feed entry as returned by a `TrendingSource`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub address: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub vol_24h_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub chain_id: String,
    pub address: String,
    pub first_seen_at: i64,
    pub labels: Vec<String>,
}

impl Wallet {
    pub fn is_bot(&self) -> bool {
        self.labels.iter().any(|l| l == "bot")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(TradeSide::Buy),
            "sell" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// One observed DEX trade. Immutable after insert; `tx_hash` is unique
/// within a chain and ingest is idempotent on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub tx_hash: String,
    pub ts: i64,
    pub chain_id: String,
    pub wallet_address: String,
    pub token_address: String,
    pub side: TradeSide,
    pub qty_token: f64,
    pub price_usd: f64,
    pub usd_value: f64,
    pub venue: Option<String>,
}

/// Raw token transfer as returned by a `TransferSource`, before DEX-swap
/// classification. `qty` is in whole-token units.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub tx_hash: String,
    pub ts: i64,
    pub from_address: String,
    pub to_address: String,
    pub token_address: String,
    pub qty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Token flowing toward the wallet (buy side).
    In,
    /// Token flowing away from the wallet (sell side).
    Out,
}

/// One open FIFO lot inside a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub qty_remaining: f64,
    pub unit_cost_usd: f64,
    pub acquired_ts: i64,
}

/// Rolling 30-day aggregates for one wallet on one chain.
/// Recomputed in full by the stats roller; readers tolerate staleness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletStats30D {
    pub wallet_address: String,
    pub chain_id: String,
    pub trades_count: u32,
    pub realized_pnl_usd: f64,
    pub unrealized_pnl_usd: f64,
    pub best_trade_multiple: Option<f64>,
    pub earlyscore_median: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub last_update: i64,
}

impl WalletStats30D {
    pub fn total_pnl_usd(&self) -> f64 {
        self.realized_pnl_usd + self.unrealized_pnl_usd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchStatus {
    Active,
    Removed,
    Pending,
}

impl WatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::Active => "active",
            WatchStatus::Removed => "removed",
            WatchStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(WatchStatus::Active),
            "removed" => Some(WatchStatus::Removed),
            "pending" => Some(WatchStatus::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub wallet_address: String,
    pub chain_id: String,
    pub composite_score: f64,
    pub added_at: i64,
    pub last_evaluated_at: i64,
    pub status: WatchStatus,
}

/// Result of a `SafetySource` check on a token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyReport {
    pub buy_tax_pct: f64,
    pub sell_tax_pct: f64,
    pub is_honeypot: bool,
}

/// True for chains whose addresses are case-insensitive hex (lowercased on
/// ingest). Solana addresses are base58 and case-significant.
pub fn is_evm_chain(chain_id: &str) -> bool {
    chain_id != "solana"
}

/// Canonical address form: lowercase for EVM chains, untouched for Solana.
pub fn normalize_address(chain_id: &str, address: &str) -> String {
    if is_evm_chain(chain_id) {
        address.to_ascii_lowercase()
    } else {
        address.to_string()
    }
}

/// Short form for log lines.
pub fn short_addr(address: &str) -> &str {
    &address[..10.min(address.len())]
}
