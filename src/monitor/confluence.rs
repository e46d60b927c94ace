//! Time-windowed confluence detection.
//!
//! One sorted-set key per `(chain, side, token)`: score = event timestamp,
//! member = wallet address. Membership uses a true sliding window (evict
//! below `now − window`); alert dedup uses a coarse bucket
//! (`floor(now / window)`) hashed together with the sorted wallet set, so
//! a growing wallet set in the same bucket yields at most one extra alert
//! and a straddling confluence can fire once per bucket with differing
//! sets. The two windows are deliberately not the same thing.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::adapters::UpstreamError;
use crate::types::TradeSide;

/// Sorted-set semantics over the external time-window store. Confluence
/// state lives solely here; nothing else reads these keys.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Add (member, score). Re-adding a member refreshes its score.
    async fn record(&self, key: &str, member: &str, ts: i64) -> Result<(), UpstreamError>;
    /// Drop members with score strictly below the cutoff.
    async fn evict_below(&self, key: &str, cutoff: i64) -> Result<(), UpstreamError>;
    /// All members with scores, unordered.
    async fn members(&self, key: &str) -> Result<Vec<(String, i64)>, UpstreamError>;
    /// Bound key lifetime.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), UpstreamError>;
}

/// Redis implementation over a reconnecting connection manager.
pub struct RedisWindowStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisWindowStore {
    pub async fn connect(url: &str) -> Result<Self, UpstreamError> {
        let client = redis::Client::open(url)
            .map_err(|e| UpstreamError::StoreUnavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| UpstreamError::StoreUnavailable(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn record(&self, key: &str, member: &str, ts: i64) -> Result<(), UpstreamError> {
        let mut conn = self.conn.clone();
        redis::cmd("ZADD")
            .arg(key)
            .arg(ts)
            .arg(member)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| UpstreamError::StoreUnavailable(e.to_string()))
    }

    async fn evict_below(&self, key: &str, cutoff: i64) -> Result<(), UpstreamError> {
        let mut conn = self.conn.clone();
        redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(format!("({}", cutoff))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| UpstreamError::StoreUnavailable(e.to_string()))
    }

    async fn members(&self, key: &str) -> Result<Vec<(String, i64)>, UpstreamError> {
        let mut conn = self.conn.clone();
        redis::cmd("ZRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async::<_, Vec<(String, i64)>>(&mut conn)
            .await
            .map_err(|e| UpstreamError::StoreUnavailable(e.to_string()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), UpstreamError> {
        let mut conn = self.conn.clone();
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs() as i64)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| UpstreamError::StoreUnavailable(e.to_string()))
    }
}

/// In-memory store with the same semantics; tests and single-node runs.
#[derive(Default)]
pub struct MemoryWindowStore {
    sets: Mutex<HashMap<String, HashMap<String, i64>>>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn record(&self, key: &str, member: &str, ts: i64) -> Result<(), UpstreamError> {
        let mut sets = self.sets.lock().await;
        sets.entry(key.to_string())
            .or_default()
            .insert(member.to_string(), ts);
        Ok(())
    }

    async fn evict_below(&self, key: &str, cutoff: i64) -> Result<(), UpstreamError> {
        let mut sets = self.sets.lock().await;
        if let Some(set) = sets.get_mut(key) {
            set.retain(|_, ts| *ts >= cutoff);
        }
        Ok(())
    }

    async fn members(&self, key: &str) -> Result<Vec<(String, i64)>, UpstreamError> {
        let sets = self.sets.lock().await;
        Ok(sets
            .get(key)
            .map(|set| set.iter().map(|(m, ts)| (m.clone(), *ts)).collect())
            .unwrap_or_default())
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), UpstreamError> {
        // TTL is redundant here; eviction already bounds memory.
        Ok(())
    }
}

/// Observable state of one confluence key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Empty,
    /// At least one member, below the confluence threshold.
    Partial,
    /// Threshold reached; the dedup ledger decides Armed vs Fired.
    Armed,
}

/// A threshold crossing reported to the caller. Whether it actually fires
/// an alert is decided by the dedup key against the alert ledger.
#[derive(Debug, Clone)]
pub struct ConfluenceHit {
    pub chain_id: String,
    pub side: TradeSide,
    pub token_address: String,
    /// Sorted distinct wallets currently in the window.
    pub wallets: Vec<String>,
    /// Oldest-to-newest span of the member timestamps, ms.
    pub window_span_ms: i64,
    pub bucket: i64,
    pub dedup_key: String,
}

pub struct ConfluenceDetector {
    store: std::sync::Arc<dyn WindowStore>,
    window_secs: i64,
    min_confluence: usize,
}

impl ConfluenceDetector {
    pub fn new(store: std::sync::Arc<dyn WindowStore>, window_secs: i64, min_confluence: usize) -> Self {
        Self { store, window_secs, min_confluence }
    }

    fn key(chain_id: &str, side: TradeSide, token_address: &str) -> String {
        format!("confluence:{}:{}:{}", chain_id, side.as_str(), token_address)
    }

    /// Record one trade event and evaluate the window.
    pub async fn record_and_check(
        &self,
        chain_id: &str,
        side: TradeSide,
        token_address: &str,
        wallet_address: &str,
        event_ts: i64,
        now: i64,
    ) -> Result<Option<ConfluenceHit>, UpstreamError> {
        let key = Self::key(chain_id, side, token_address);

        self.store.record(&key, wallet_address, event_ts).await?;
        self.store.evict_below(&key, now - self.window_secs).await?;
        self.store
            .expire(&key, Duration::from_secs(self.window_secs as u64))
            .await?;

        let members = self.store.members(&key).await?;

        // Distinct wallets only; a wallet re-buying refreshes its timestamp
        // but never counts twice.
        let wallets: BTreeSet<&str> = members.iter().map(|(m, _)| m.as_str()).collect();
        if wallets.len() < self.min_confluence {
            debug!(
                "Confluence {}: {}/{} wallets",
                key,
                wallets.len(),
                self.min_confluence
            );
            return Ok(None);
        }

        let oldest = members.iter().map(|(_, ts)| *ts).min().unwrap_or(now);
        let newest = members.iter().map(|(_, ts)| *ts).max().unwrap_or(now);
        let bucket = now.div_euclid(self.window_secs);
        let wallets: Vec<String> = wallets.into_iter().map(str::to_string).collect();
        let dedup_key = dedup_key(chain_id, side, token_address, &wallets, bucket);

        Ok(Some(ConfluenceHit {
            chain_id: chain_id.to_string(),
            side,
            token_address: token_address.to_string(),
            wallets,
            window_span_ms: (newest - oldest) * 1000,
            bucket,
            dedup_key,
        }))
    }

    /// Current state of a key; diagnostics only.
    pub async fn state(
        &self,
        chain_id: &str,
        side: TradeSide,
        token_address: &str,
        now: i64,
    ) -> Result<WindowState, UpstreamError> {
        let key = Self::key(chain_id, side, token_address);
        self.store.evict_below(&key, now - self.window_secs).await?;
        let members = self.store.members(&key).await?;
        let distinct: BTreeSet<&str> = members.iter().map(|(m, _)| m.as_str()).collect();

        Ok(if distinct.is_empty() {
            WindowState::Empty
        } else if distinct.len() < self.min_confluence {
            WindowState::Partial
        } else {
            WindowState::Armed
        })
    }
}

/// Content hash identifying one confluence emission:
/// `(chain, side, token, sorted wallet set, window bucket)`.
pub fn dedup_key(
    chain_id: &str,
    side: TradeSide,
    token_address: &str,
    sorted_wallets: &[String],
    bucket: i64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chain_id.as_bytes());
    hasher.update(b"|");
    hasher.update(side.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(token_address.as_bytes());
    hasher.update(b"|");
    for wallet in sorted_wallets {
        hasher.update(wallet.as_bytes());
        hasher.update(b",");
    }
    hasher.update(bucket.to_le_bytes());

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(window_secs: i64, min: usize) -> ConfluenceDetector {
        ConfluenceDetector::new(std::sync::Arc::new(MemoryWindowStore::new()), window_secs, min)
    }

    #[tokio::test]
    async fn test_two_wallets_in_window_hit() {
        let d = detector(1800, 2);

        let first = d
            .record_and_check("eth", TradeSide::Buy, "0xT", "0xW1", 0, 0)
            .await
            .unwrap();
        assert!(first.is_none());
        assert_eq!(
            d.state("eth", TradeSide::Buy, "0xT", 0).await.unwrap(),
            WindowState::Partial
        );

        let second = d
            .record_and_check("eth", TradeSide::Buy, "0xT", "0xW2", 120, 120)
            .await
            .unwrap()
            .expect("confluence expected");
        assert_eq!(second.wallets, vec!["0xW1".to_string(), "0xW2".to_string()]);
        assert_eq!(second.window_span_ms, 120_000);
        assert_eq!(
            d.state("eth", TradeSide::Buy, "0xT", 120).await.unwrap(),
            WindowState::Armed
        );
    }

    #[tokio::test]
    async fn test_below_threshold_no_hit() {
        let d = detector(1800, 2);
        // Same wallet twice is one member.
        d.record_and_check("eth", TradeSide::Buy, "0xT", "0xW1", 0, 0)
            .await
            .unwrap();
        let hit = d
            .record_and_check("eth", TradeSide::Buy, "0xT", "0xW1", 100, 100)
            .await
            .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_window_edge_eviction() {
        let window = 1800i64;
        let d = detector(window, 2);

        // Buy at the inside edge still counts...
        d.record_and_check("eth", TradeSide::Buy, "0xT", "0xW1", 1, window)
            .await
            .unwrap();
        let hit = d
            .record_and_check("eth", TradeSide::Buy, "0xT", "0xW2", window, window)
            .await
            .unwrap();
        assert!(hit.is_some());

        // ...but one past the edge is evicted before evaluation.
        let d2 = detector(window, 2);
        d2.record_and_check("eth", TradeSide::Buy, "0xT", "0xW1", 0, 0)
            .await
            .unwrap();
        let late = d2
            .record_and_check("eth", TradeSide::Buy, "0xT", "0xW2", window + 1, window + 1)
            .await
            .unwrap();
        assert!(late.is_none());
    }

    #[tokio::test]
    async fn test_sides_and_tokens_are_independent_keys() {
        let d = detector(1800, 2);
        d.record_and_check("eth", TradeSide::Buy, "0xT", "0xW1", 0, 0)
            .await
            .unwrap();
        // A sell of the same token does not combine with the buy.
        let hit = d
            .record_and_check("eth", TradeSide::Sell, "0xT", "0xW2", 10, 10)
            .await
            .unwrap();
        assert!(hit.is_none());
        // Nor does a buy of a different token.
        let hit = d
            .record_and_check("eth", TradeSide::Buy, "0xOther", "0xW2", 10, 10)
            .await
            .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_dedup_key_stable_within_bucket() {
        let d = detector(1800, 2);
        d.record_and_check("eth", TradeSide::Buy, "0xT", "0xW1", 0, 0)
            .await
            .unwrap();
        let a = d
            .record_and_check("eth", TradeSide::Buy, "0xT", "0xW2", 100, 100)
            .await
            .unwrap()
            .unwrap();
        // Replay: same wallets, same bucket, same key.
        let b = d
            .record_and_check("eth", TradeSide::Buy, "0xT", "0xW2", 100, 100)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.dedup_key, b.dedup_key);

        // A third wallet enlarges the set and changes the key.
        let c = d
            .record_and_check("eth", TradeSide::Buy, "0xT", "0xW3", 200, 200)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(a.dedup_key, c.dedup_key);
        assert_eq!(c.wallets.len(), 3);
    }

    #[tokio::test]
    async fn test_bucket_rollover_changes_key() {
        let wallets = vec!["0xW1".to_string(), "0xW2".to_string()];
        let k0 = dedup_key("eth", TradeSide::Buy, "0xT", &wallets, 0);
        let k1 = dedup_key("eth", TradeSide::Buy, "0xT", &wallets, 1);
        assert_ne!(k0, k1);
    }

    #[tokio::test]
    async fn test_wallet_order_does_not_change_key() {
        // Detector sorts wallets before hashing; equal sets hash equal.
        let a = dedup_key(
            "eth",
            TradeSide::Buy,
            "0xT",
            &["0xA".to_string(), "0xB".to_string()],
            7,
        );
        let b = dedup_key(
            "eth",
            TradeSide::Buy,
            "0xT",
            &["0xA".to_string(), "0xB".to_string()],
            7,
        );
        assert_eq!(a, b);
    }
}
