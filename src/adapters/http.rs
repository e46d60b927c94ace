//! Shared HTTP plumbing for adapters: retrying JSON client, per-provider
//! call spacing, and a small TTL cache.
//!
//! Every request carries the configured deadline; transport failures and
//! non-2xx statuses come back as `UpstreamError::Transient` and are retried
//! with capped exponential backoff plus jitter, three attempts total.
//! Malformed bodies come back as `UpstreamError::Schema` and are not retried.

use dashmap::DashMap;
use rand::Rng;
use reqwest::Client;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::UpstreamError;
use crate::config::HttpConfig;
use crate::metrics;

/// Minimum spacing between calls to one provider. Callers that would
/// violate the gap wait; work is never dropped.
pub struct Throttle {
    min_gap: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_gap: Duration) -> Self {
        Self { min_gap, last_call: Mutex::new(None) }
    }

    /// Wait until the provider gap has elapsed, then claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_gap {
                tokio::time::sleep(self.min_gap - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Retrying JSON client bound to one provider.
pub struct HttpClient {
    client: Client,
    provider: &'static str,
    throttle: Throttle,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(provider: &'static str, config: &HttpConfig, min_gap: Duration) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            provider,
            throttle: Throttle::new(min_gap),
            max_retries: config.max_retries,
        }
    }

    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<serde_json::Value, UpstreamError> {
        self.request_json(|client| {
            let mut req = client.get(url).query(query);
            for (k, v) in headers {
                req = req.header(*k, *v);
            }
            req
        })
        .await
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, UpstreamError> {
        let body = body.clone();
        self.request_json(move |client| client.post(url).json(&body)).await
    }

    async fn request_json<F>(&self, build: F) -> Result<serde_json::Value, UpstreamError>
    where
        F: Fn(&Client) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            self.throttle.acquire().await;

            match self.execute_once(&build).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_retries => {
                    attempt += 1;
                    metrics::incr(&metrics::UPSTREAM_TRANSIENT_ERRORS);
                    let delay = backoff_delay(attempt);
                    debug!(
                        "{}: transient error ({}), retry {}/{} in {:?}",
                        self.provider, e, attempt, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    match &e {
                        UpstreamError::Transient { .. } => {
                            metrics::incr(&metrics::UPSTREAM_TRANSIENT_ERRORS);
                            warn!("{}: giving up after {} attempts: {}", self.provider, attempt + 1, e);
                        }
                        UpstreamError::Schema { .. } => {
                            metrics::incr(&metrics::UPSTREAM_SCHEMA_ERRORS);
                        }
                        UpstreamError::StoreUnavailable(_) => {}
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn execute_once<F>(&self, build: &F) -> Result<serde_json::Value, UpstreamError>
    where
        F: Fn(&Client) -> reqwest::RequestBuilder,
    {
        let response = build(&self.client)
            .send()
            .await
            .map_err(|e| UpstreamError::transient(self.provider, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::transient(
                self.provider,
                format!("HTTP {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::transient(self.provider, e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| {
            // Keep a sample of the offending payload for diagnostics.
            let sample: String = body.chars().take(200).collect();
            UpstreamError::schema(self.provider, format!("{} (body: {})", e, sample))
        })
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 500u64.saturating_mul(1u64 << attempt.min(4));
    let jitter_ms = rand::thread_rng().gen_range(0..base_ms / 2 + 1);
    Duration::from_millis((base_ms + jitter_ms).min(8_000))
}

/// Process-level TTL cache for adapter metadata lookups.
pub struct TtlCache<K, V> {
    entries: DashMap<K, (V, Instant)>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        let (value, stored_at) = entry.value();
        if stored_at.elapsed() < self.ttl {
            Some(value.clone())
        } else {
            drop(entry);
            self.entries.remove(key);
            None
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        for attempt in 1..=6 {
            let delay = backoff_delay(attempt);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_secs(8));
        }
    }

    #[test]
    fn test_ttl_cache_hit_and_expiry() {
        let cache: TtlCache<String, f64> = TtlCache::new(Duration::from_secs(60));
        cache.insert("k".to_string(), 1.5);
        assert_eq!(cache.get(&"k".to_string()), Some(1.5));

        let expired: TtlCache<String, f64> = TtlCache::new(Duration::from_millis(0));
        expired.insert("k".to_string(), 1.5);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(expired.get(&"k".to_string()), None);
    }

    #[tokio::test]
    async fn test_throttle_enforces_gap() {
        let throttle = Throttle::new(Duration::from_millis(30));
        let start = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
