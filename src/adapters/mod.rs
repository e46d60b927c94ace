//! Upstream adapters.
//!
//! The only place provider quirks live. Everything else in the pipeline
//! sees four capability traits: trending feeds, transfer history, prices,
//! and token safety checks. Concrete adapters are registered per chain in
//! an [`AdapterRegistry`] built once at startup; fallback order is the
//! registration order, never implicit type lookup.

pub mod alchemy;
pub mod birdeye;
pub mod dexscreener;
pub mod geckoterminal;
pub mod helius;
pub mod honeypot;
pub mod http;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, Secrets};
use crate::types::{SafetyReport, TokenSnapshot, Transfer, TransferDirection};

/// Error kinds surfaced by adapter calls. Workers hand these (plus
/// context) to their job supervisor; none of them is fatal to a job.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Timeouts, connection failures, 5xx, rate-limit responses. Retried
    /// locally with backoff; after max attempts surfaced as a per-call miss.
    #[error("transient upstream failure from {provider}: {detail}")]
    Transient { provider: &'static str, detail: String },

    /// Payload arrived but did not have the expected shape.
    #[error("malformed payload from {provider}: {detail}")]
    Schema { provider: &'static str, detail: String },

    /// Window store (Redis) or DB unreachable.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl UpstreamError {
    pub fn transient(provider: &'static str, detail: impl Into<String>) -> Self {
        Self::Transient { provider, detail: detail.into() }
    }

    pub fn schema(provider: &'static str, detail: impl Into<String>) -> Self {
        Self::Schema { provider, detail: detail.into() }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// A trending-token feed for one or more chains.
#[async_trait]
pub trait TrendingSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports_chain(&self, chain_id: &str) -> bool;
    async fn fetch_trending(&self, chain_id: &str) -> Result<Vec<TokenSnapshot>, UpstreamError>;
}

/// Token / wallet transfer history.
///
/// Direction on the wallet call is required so buys (token flowing toward
/// the wallet) and sells (token flowing away) can be requested separately.
/// `from_block`/`to_block` of `None` mean "adapter-chosen recent range"
/// (the configured per-chain block window ending at the latest block).
#[async_trait]
pub trait TransferSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports_chain(&self, chain_id: &str) -> bool;

    async fn fetch_token_transfers(
        &self,
        chain_id: &str,
        token_address: &str,
        from_block: Option<u64>,
        to_block: Option<u64>,
        limit: u32,
    ) -> Result<Vec<Transfer>, UpstreamError>;

    async fn fetch_wallet_transfers(
        &self,
        chain_id: &str,
        wallet_address: &str,
        direction: TransferDirection,
        from_block: Option<u64>,
        limit: u32,
    ) -> Result<Vec<Transfer>, UpstreamError>;
}

/// Current USD price of a token. `Ok(None)` is a clean miss, not an error.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports_chain(&self, chain_id: &str) -> bool;
    async fn price_of(
        &self,
        chain_id: &str,
        token_address: &str,
    ) -> Result<Option<f64>, UpstreamError>;
}

/// Honeypot / transfer-tax checks.
#[async_trait]
pub trait SafetySource: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports_chain(&self, chain_id: &str) -> bool;
    async fn safety_check(
        &self,
        chain_id: &str,
        token_address: &str,
    ) -> Result<SafetyReport, UpstreamError>;
}

/// All registered adapters, grouped by capability. Built once at startup;
/// never mutated afterwards.
pub struct AdapterRegistry {
    trending: Vec<Arc<dyn TrendingSource>>,
    transfers: Vec<Arc<dyn TransferSource>>,
    prices: Vec<Arc<dyn PriceSource>>,
    safety: Vec<Arc<dyn SafetySource>>,
}

impl AdapterRegistry {
    /// Wire up every adapter we have credentials/config for.
    ///
    /// Price fallback order is DexScreener → Birdeye → GeckoTerminal;
    /// declared here, relied on by the price enricher.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Self {
        let http_cfg = &config.http;

        let dexscreener = Arc::new(dexscreener::DexScreenerAdapter::new(http_cfg));
        let geckoterminal = Arc::new(geckoterminal::GeckoTerminalAdapter::new(http_cfg));

        let mut trending: Vec<Arc<dyn TrendingSource>> =
            vec![dexscreener.clone(), geckoterminal.clone()];
        let mut prices: Vec<Arc<dyn PriceSource>> = vec![dexscreener.clone()];
        let mut transfers: Vec<Arc<dyn TransferSource>> = Vec::new();
        let mut safety: Vec<Arc<dyn SafetySource>> = Vec::new();

        if let Some(key) = &secrets.birdeye_api_key {
            let adapter = Arc::new(birdeye::BirdeyeAdapter::new(http_cfg, key.clone()));
            trending.push(adapter.clone());
            prices.push(adapter);
            info!("✅ Birdeye adapter registered (solana trending + price)");
        }
        prices.push(geckoterminal.clone());

        if let Some(key) = &secrets.alchemy_api_key {
            transfers.push(Arc::new(alchemy::AlchemyAdapter::new(
                http_cfg,
                key.clone(),
                &config.discovery,
            )));
            info!("✅ Alchemy adapter registered (EVM transfers)");
        }
        if let Some(key) = &secrets.helius_api_key {
            transfers.push(Arc::new(helius::HeliusAdapter::new(http_cfg, key.clone())));
            info!("✅ Helius adapter registered (solana transfers)");
        }

        safety.push(Arc::new(honeypot::HoneypotAdapter::new(http_cfg)));

        info!(
            "🔌 Adapter registry: {} trending, {} transfer, {} price, {} safety",
            trending.len(),
            transfers.len(),
            prices.len(),
            safety.len()
        );

        Self { trending, transfers, prices, safety }
    }

    /// Registry with explicit adapter sets; used by tests.
    pub fn with_adapters(
        trending: Vec<Arc<dyn TrendingSource>>,
        transfers: Vec<Arc<dyn TransferSource>>,
        prices: Vec<Arc<dyn PriceSource>>,
        safety: Vec<Arc<dyn SafetySource>>,
    ) -> Self {
        Self { trending, transfers, prices, safety }
    }

    pub fn trending_for(&self, chain_id: &str) -> Vec<Arc<dyn TrendingSource>> {
        self.trending
            .iter()
            .filter(|a| a.supports_chain(chain_id))
            .cloned()
            .collect()
    }

    /// First registered transfer source that serves the chain.
    pub fn transfers_for(&self, chain_id: &str) -> Option<Arc<dyn TransferSource>> {
        self.transfers
            .iter()
            .find(|a| a.supports_chain(chain_id))
            .cloned()
    }

    /// Price sources serving the chain, in declared fallback order.
    pub fn prices_for(&self, chain_id: &str) -> Vec<Arc<dyn PriceSource>> {
        self.prices
            .iter()
            .filter(|a| a.supports_chain(chain_id))
            .cloned()
            .collect()
    }

    pub fn safety_for(&self, chain_id: &str) -> Option<Arc<dyn SafetySource>> {
        self.safety
            .iter()
            .find(|a| a.supports_chain(chain_id))
            .cloned()
    }
}
