//! Trending-token ingestion (runner seeds).
//!
//! Every tick: query all enabled trending sources per chain, union the
//! results, normalize addresses, upsert tokens, and append one seed row per
//! `(source, token)` that clears the safety gate. Rejections are expected
//! traffic and logged at debug.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::adapters::AdapterRegistry;
use crate::config::{Config, SafetyConfig};
use crate::db::Database;
use crate::metrics;
use crate::types::{normalize_address, short_addr, SeedToken, Token, TokenSnapshot};

/// Why a trending token was not seeded.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    LowLiquidity(f64),
    LowVolume(f64),
    Excluded,
    HighTax { buy: f64, sell: f64 },
    Honeypot,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::LowLiquidity(liq) => write!(f, "liquidity ${:.0}", liq),
            RejectReason::LowVolume(vol) => write!(f, "24h volume ${:.0}", vol),
            RejectReason::Excluded => write!(f, "stablecoin/wrapped-native exclusion"),
            RejectReason::HighTax { buy, sell } => write!(f, "tax {:.1}%/{:.1}%", buy, sell),
            RejectReason::Honeypot => write!(f, "honeypot"),
        }
    }
}

pub struct RunnerIngestion {
    db: Arc<Mutex<Database>>,
    registry: Arc<AdapterRegistry>,
    chains: Vec<String>,
    safety: SafetyConfig,
}

impl RunnerIngestion {
    pub fn new(db: Arc<Mutex<Database>>, registry: Arc<AdapterRegistry>, config: &Config) -> Self {
        Self {
            db,
            registry,
            chains: config.chains.enabled.clone(),
            safety: config.safety.clone(),
        }
    }

    /// One full ingestion pass over every chain and source.
    pub async fn run_all_sources(&self, now: i64) -> Result<usize> {
        let mut total = 0usize;

        for chain_id in &self.chains {
            for source in self.registry.trending_for(chain_id) {
                match self.ingest_source(chain_id, source.as_ref(), now).await {
                    Ok(count) => {
                        info!("🌱 Ingested {} seeds from {} for {}", count, source.name(), chain_id);
                        total += count;
                    }
                    Err(e) => {
                        warn!("Trending ingest failed ({} / {}): {:#}", source.name(), chain_id, e);
                    }
                }
            }
        }

        info!("🌱 Seed ingestion complete: {} seeds", total);
        Ok(total)
    }

    async fn ingest_source(
        &self,
        chain_id: &str,
        source: &dyn crate::adapters::TrendingSource,
        now: i64,
    ) -> Result<usize> {
        let source_name = source.name();
        let snapshots = source.fetch_trending(chain_id).await?;

        // One source can list the same token in several pools.
        let mut seen: HashSet<String> = HashSet::new();
        let mut seeded = 0usize;

        for (idx, snapshot) in snapshots.iter().enumerate() {
            let address = normalize_address(chain_id, &snapshot.address);
            if !seen.insert(address.clone()) {
                continue;
            }

            // The token row is kept fresh whether or not the seed passes
            // the gate; rejects are still price-tracked.
            {
                let mut db = self.db.lock().unwrap();
                db.upsert_token(&snapshot_to_token(chain_id, &address, snapshot, now))?;
            }

            if let Some(reason) = self.gate(chain_id, &address, snapshot).await? {
                metrics::incr(&metrics::POLICY_REJECTS);
                debug!(
                    "🚫 Rejected {} on {} from {}: {}",
                    short_addr(&address),
                    chain_id,
                    source_name,
                    reason
                );
                continue;
            }

            let mut db = self.db.lock().unwrap();
            db.insert_seed_token(&SeedToken {
                chain_id: chain_id.to_string(),
                token_address: address,
                source: source_name.to_string(),
                snapshot_ts: now,
                rank: Some(idx as u32 + 1),
                vol_24h_usd: snapshot.vol_24h_usd,
            })?;
            seeded += 1;
        }

        Ok(seeded)
    }

    /// Safety gate. Returns the reject reason, or `None` for a pass.
    async fn gate(
        &self,
        chain_id: &str,
        address: &str,
        snapshot: &TokenSnapshot,
    ) -> Result<Option<RejectReason>> {
        if self.safety.is_excluded(address) {
            return Ok(Some(RejectReason::Excluded));
        }

        let liquidity = snapshot.liquidity_usd.unwrap_or(0.0);
        if liquidity < self.safety.min_liquidity_usd {
            return Ok(Some(RejectReason::LowLiquidity(liquidity)));
        }

        let volume = snapshot.vol_24h_usd.unwrap_or(0.0);
        if volume < self.safety.min_volume_24h_usd {
            return Ok(Some(RejectReason::LowVolume(volume)));
        }

        // Honeypot/tax simulation, where a checker exists for this chain.
        // A checker outage never blocks seeding; it only skips the check.
        if let Some(safety_source) = self.registry.safety_for(chain_id) {
            match safety_source.safety_check(chain_id, address).await {
                Ok(report) => {
                    {
                        let mut db = self.db.lock().unwrap();
                        db.update_token_safety(
                            chain_id,
                            address,
                            report.buy_tax_pct,
                            report.sell_tax_pct,
                            report.is_honeypot,
                        )?;
                    }
                    if report.is_honeypot {
                        return Ok(Some(RejectReason::Honeypot));
                    }
                    if report.buy_tax_pct > self.safety.max_tax_pct
                        || report.sell_tax_pct > self.safety.max_tax_pct
                    {
                        return Ok(Some(RejectReason::HighTax {
                            buy: report.buy_tax_pct,
                            sell: report.sell_tax_pct,
                        }));
                    }
                }
                Err(e) => {
                    debug!("Safety check unavailable for {}: {}", short_addr(address), e);
                }
            }
        }

        Ok(None)
    }
}

fn snapshot_to_token(chain_id: &str, address: &str, snapshot: &TokenSnapshot, now: i64) -> Token {
    Token {
        chain_id: chain_id.to_string(),
        token_address: address.to_string(),
        symbol: snapshot.symbol.clone(),
        name: snapshot.name.clone(),
        last_price_usd: snapshot.price_usd,
        liquidity_usd: snapshot.liquidity_usd,
        vol_24h_usd: snapshot.vol_24h_usd,
        buy_tax_pct: None,
        sell_tax_pct: None,
        is_honeypot: None,
        first_seen_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{TrendingSource, UpstreamError};
    use async_trait::async_trait;

    struct FixedTrending {
        snapshots: Vec<TokenSnapshot>,
    }

    #[async_trait]
    impl TrendingSource for FixedTrending {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn supports_chain(&self, _chain_id: &str) -> bool {
            true
        }
        async fn fetch_trending(&self, _chain_id: &str) -> Result<Vec<TokenSnapshot>, UpstreamError> {
            Ok(self.snapshots.clone())
        }
    }

    fn snapshot(address: &str, liquidity: f64, volume: f64) -> TokenSnapshot {
        TokenSnapshot {
            address: address.to_string(),
            symbol: Some("TST".to_string()),
            name: None,
            price_usd: Some(1.0),
            liquidity_usd: Some(liquidity),
            vol_24h_usd: Some(volume),
        }
    }

    fn ingestion_with(snapshots: Vec<TokenSnapshot>, db: Arc<Mutex<Database>>) -> RunnerIngestion {
        let registry = Arc::new(AdapterRegistry::with_adapters(
            vec![Arc::new(FixedTrending { snapshots })],
            vec![],
            vec![],
            vec![],
        ));
        let mut config = Config::default();
        config.chains.enabled = vec!["eth".to_string()];
        RunnerIngestion::new(db, registry, &config)
    }

    #[tokio::test]
    async fn test_gate_passes_and_rejects() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let snapshots = vec![
            snapshot("0xGOOD", 100_000.0, 200_000.0),
            snapshot("0xTHIN", 1_000.0, 200_000.0),
            snapshot("0xQUIET", 100_000.0, 1_000.0),
            // USDT: excluded regardless of depth.
            snapshot("0xdAC17F958D2ee523a2206206994597C13D831ec7", 9e9, 9e9),
        ];

        let ingestion = ingestion_with(snapshots, db.clone());
        let seeded = ingestion.run_all_sources(1_000).await.unwrap();
        assert_eq!(seeded, 1);

        let guard = db.lock().unwrap();
        let targets = guard.recent_seed_targets(0).unwrap();
        assert_eq!(targets, vec![("eth".to_string(), "0xgood".to_string())]);
        // Rejected tokens still got a token row (lowercased).
        assert!(guard.get_token("eth", "0xthin").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_listings_seed_once_per_source() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let snapshots = vec![
            snapshot("0xAAA", 100_000.0, 200_000.0),
            snapshot("0xaaa", 100_000.0, 200_000.0),
        ];

        let ingestion = ingestion_with(snapshots, db.clone());
        let seeded = ingestion.run_all_sources(1_000).await.unwrap();
        assert_eq!(seeded, 1);
    }
}
