//! Outbound alert contract and transports.
//!
//! The pipeline talks to one logical operation: emit a confluence alert,
//! get back ok / transient / permanent. Telegram is the shipped transport;
//! a log-only sink stands in when no bot credentials are configured.

pub mod telegram;

use async_trait::async_trait;
use tracing::info;

use crate::types::TradeSide;

/// Per-wallet 30-day stats snapshot carried in the alert payload.
#[derive(Debug, Clone)]
pub struct WalletBrief {
    pub address: String,
    pub realized_pnl_usd: f64,
    pub best_trade_multiple: Option<f64>,
    pub earlyscore_median: Option<f64>,
    pub trades_count: u32,
}

#[derive(Debug, Clone)]
pub struct ConfluenceAlert {
    pub kind: &'static str,
    pub chain_id: String,
    pub token_address: String,
    pub symbol: Option<String>,
    pub side: TradeSide,
    pub wallets: Vec<WalletBrief>,
    pub window_ms: i64,
    pub price_usd: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Ok,
    /// Transport hiccup; the alert may be retried by a future confluence.
    Transient,
    /// Misconfiguration or rejection; retrying is pointless.
    Permanent,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, alert: &ConfluenceAlert) -> AlertOutcome;
}

/// Log-only sink for deployments without a chat transport configured.
pub struct NullSink;

#[async_trait]
impl AlertSink for NullSink {
    async fn emit(&self, alert: &ConfluenceAlert) -> AlertOutcome {
        info!(
            "🔔 (no transport) {} {} {} wallets={}",
            alert.kind,
            alert.chain_id,
            alert.symbol.as_deref().unwrap_or(&alert.token_address),
            alert.wallets.len()
        );
        AlertOutcome::Ok
    }
}

/// Captures alerts in memory; test support.
#[cfg(test)]
pub struct RecordingSink {
    alerts: std::sync::Mutex<Vec<ConfluenceAlert>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self { alerts: std::sync::Mutex::new(Vec::new()) }
    }

    pub fn alerts(&self) -> Vec<ConfluenceAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl AlertSink for RecordingSink {
    async fn emit(&self, alert: &ConfluenceAlert) -> AlertOutcome {
        self.alerts.lock().unwrap().push(alert.clone());
        AlertOutcome::Ok
    }
}

/// Block-explorer link for an address, per chain.
pub fn explorer_token_link(chain_id: &str, token_address: &str) -> String {
    match chain_id {
        "eth" => format!("https://etherscan.io/token/{}", token_address),
        "base" => format!("https://basescan.org/token/{}", token_address),
        "arbitrum" => format!("https://arbiscan.io/token/{}", token_address),
        "solana" => format!("https://solscan.io/token/{}", token_address),
        _ => format!("https://etherscan.io/token/{}", token_address),
    }
}
