//! Price enricher: current USD price per (chain, token).
//!
//! Sources are tried in the registry's declared fallback order; hits are
//! cached for a short TTL in a process-local concurrent map. On a full
//! miss the most recent observed trade price is used; if none exists the
//! result is `None` and downstream code treats the affected lots as
//! price-unknown (unrealized PnL contribution = 0), never as profit.

use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::adapters::AdapterRegistry;
use crate::db::Database;
use crate::metrics;
use crate::types::short_addr;

#[derive(Clone)]
struct CachedPrice {
    price_usd: f64,
    fetched_at: Instant,
}

pub struct PriceEnricher {
    registry: Arc<AdapterRegistry>,
    db: Arc<Mutex<Database>>,
    cache: DashMap<(String, String), CachedPrice>,
    ttl: Duration,
}

impl PriceEnricher {
    pub fn new(registry: Arc<AdapterRegistry>, db: Arc<Mutex<Database>>, ttl: Duration) -> Self {
        Self {
            registry,
            db,
            cache: DashMap::new(),
            ttl,
        }
    }

    /// Current USD price, or `None` when every source missed.
    pub async fn price_of(&self, chain_id: &str, token_address: &str) -> Option<f64> {
        let key = (chain_id.to_string(), token_address.to_string());

        if let Some(cached) = self.cache.get(&key) {
            if cached.fetched_at.elapsed() < self.ttl {
                return Some(cached.price_usd);
            }
        }

        for source in self.registry.prices_for(chain_id) {
            match source.price_of(chain_id, token_address).await {
                Ok(Some(price)) if price > 0.0 => {
                    debug!(
                        "💰 Price from {}: {} = ${:.8}",
                        source.name(),
                        short_addr(token_address),
                        price
                    );
                    self.cache.insert(
                        key,
                        CachedPrice { price_usd: price, fetched_at: Instant::now() },
                    );
                    return Some(price);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("price source {} failed for {}: {}", source.name(), short_addr(token_address), e);
                }
            }
        }

        // Last resort: most recent observed trade price. Not cached, so a
        // live source takes over as soon as one recovers.
        let fallback = {
            let db = self.db.lock().unwrap();
            db.latest_trade_price(chain_id, token_address).ok().flatten()
        };

        if fallback.is_none() {
            metrics::incr(&metrics::PRICE_MISSES);
            debug!("❌ No price for {} on {}", short_addr(token_address), chain_id);
        }
        fallback
    }

    /// Drop everything cached; tests and the daily maintenance use this.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{PriceSource, UpstreamError};
    use crate::types::{Trade, TradeSide};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedPrice {
        price: Option<f64>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PriceSource for FixedPrice {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn supports_chain(&self, _chain_id: &str) -> bool {
            true
        }
        async fn price_of(
            &self,
            _chain_id: &str,
            _token_address: &str,
        ) -> Result<Option<f64>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.price)
        }
    }

    fn enricher_with(
        sources: Vec<Arc<dyn PriceSource>>,
        db: Arc<Mutex<Database>>,
    ) -> PriceEnricher {
        let registry = AdapterRegistry::with_adapters(vec![], vec![], sources, vec![]);
        PriceEnricher::new(Arc::new(registry), db, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_fallback_order_and_cache() {
        let miss = Arc::new(FixedPrice { price: None, calls: AtomicU32::new(0) });
        let hit = Arc::new(FixedPrice { price: Some(2.5), calls: AtomicU32::new(0) });
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));

        let enricher = enricher_with(vec![miss.clone(), hit.clone()], db);

        assert_eq!(enricher.price_of("eth", "0xt1").await, Some(2.5));
        assert_eq!(miss.calls.load(Ordering::SeqCst), 1);
        assert_eq!(hit.calls.load(Ordering::SeqCst), 1);

        // Second lookup is served from cache; no new upstream calls.
        assert_eq!(enricher.price_of("eth", "0xt1").await, Some(2.5));
        assert_eq!(hit.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_trade_fallback_then_total_miss() {
        let miss = Arc::new(FixedPrice { price: None, calls: AtomicU32::new(0) });
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        {
            let mut guard = db.lock().unwrap();
            guard
                .insert_trade(&Trade {
                    tx_hash: "0x01".to_string(),
                    ts: 100,
                    chain_id: "eth".to_string(),
                    wallet_address: "0xw".to_string(),
                    token_address: "0xt1".to_string(),
                    side: TradeSide::Buy,
                    qty_token: 1.0,
                    price_usd: 3.25,
                    usd_value: 3.25,
                    venue: None,
                })
                .unwrap();
        }

        let enricher = enricher_with(vec![miss], db);

        // Token with history: last trade price.
        assert_eq!(enricher.price_of("eth", "0xt1").await, Some(3.25));
        // Token without history: clean miss.
        assert_eq!(enricher.price_of("eth", "0xnone").await, None);
    }
}
