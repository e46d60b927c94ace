//! DexScreener adapter: trending feed + primary price source.
//!
//! Free API, no key, but rate limited; calls are spaced and token info is
//! cached for the configured TTL so repeated price lookups inside one job
//! tick do not hammer the endpoint.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::http::{HttpClient, TtlCache};
use super::{PriceSource, TrendingSource, UpstreamError};
use crate::config::HttpConfig;
use crate::types::{short_addr, TokenSnapshot};

const BASE_URL: &str = "https://api.dexscreener.com";
const PROVIDER: &'static str = "dexscreener";

/// Token-level info extracted from the best pair.
#[derive(Debug, Clone)]
pub struct PairInfo {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub vol_24h_usd: Option<f64>,
}

pub struct DexScreenerAdapter {
    http: HttpClient,
    info_cache: TtlCache<(String, String), PairInfo>,
    trending_limit: usize,
}

impl DexScreenerAdapter {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            http: HttpClient::new(PROVIDER, config, Duration::from_millis(2_500)),
            info_cache: TtlCache::new(Duration::from_secs(config.info_cache_ttl_secs)),
            trending_limit: 20,
        }
    }

    fn api_chain(chain_id: &str) -> &str {
        match chain_id {
            "eth" => "ethereum",
            other => other,
        }
    }

    /// Best-pair token info, cached.
    pub async fn token_info(
        &self,
        chain_id: &str,
        token_address: &str,
    ) -> Result<PairInfo, UpstreamError> {
        let key = (chain_id.to_string(), token_address.to_string());
        if let Some(info) = self.info_cache.get(&key) {
            return Ok(info);
        }

        let url = format!("{}/latest/dex/tokens/{}", BASE_URL, token_address);
        let body = self.http.get_json(&url, &[], &[]).await?;
        let info = parse_token_info(&body, Self::api_chain(chain_id))?;

        self.info_cache.insert(key, info.clone());
        Ok(info)
    }
}

#[async_trait]
impl TrendingSource for DexScreenerAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports_chain(&self, _chain_id: &str) -> bool {
        true
    }

    async fn fetch_trending(&self, chain_id: &str) -> Result<Vec<TokenSnapshot>, UpstreamError> {
        let url = format!("{}/token-boosts/top/v1", BASE_URL);
        let body = self.http.get_json(&url, &[], &[]).await?;

        let entries = body
            .as_array()
            .ok_or_else(|| UpstreamError::schema(PROVIDER, "top boosts: expected array"))?;

        let api_chain = Self::api_chain(chain_id);
        let mut snapshots = Vec::new();

        for entry in entries {
            if entry.get("chainId").and_then(Value::as_str) != Some(api_chain) {
                continue;
            }
            let Some(address) = entry.get("tokenAddress").and_then(Value::as_str) else {
                continue;
            };

            // The boosts list carries no market data; enrich from the
            // (cached) token endpoint.
            match self.token_info(chain_id, address).await {
                Ok(info) => snapshots.push(TokenSnapshot {
                    address: address.to_string(),
                    symbol: info.symbol,
                    name: info.name,
                    price_usd: info.price_usd,
                    liquidity_usd: info.liquidity_usd,
                    vol_24h_usd: info.vol_24h_usd,
                }),
                Err(e) => {
                    debug!("dexscreener: skipping {}: {}", short_addr(address), e);
                }
            }

            if snapshots.len() >= self.trending_limit {
                break;
            }
        }

        Ok(snapshots)
    }
}

#[async_trait]
impl PriceSource for DexScreenerAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports_chain(&self, _chain_id: &str) -> bool {
        true
    }

    async fn price_of(
        &self,
        chain_id: &str,
        token_address: &str,
    ) -> Result<Option<f64>, UpstreamError> {
        let info = self.token_info(chain_id, token_address).await?;
        Ok(info.price_usd)
    }
}

/// Pick the deepest pair on the requested chain out of a
/// `/latest/dex/tokens/{addr}` response.
fn parse_token_info(body: &Value, api_chain: &str) -> Result<PairInfo, UpstreamError> {
    let pairs = body
        .get("pairs")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::schema(PROVIDER, "token info: missing pairs"))?;

    let mut best: Option<(f64, PairInfo)> = None;

    for pair in pairs {
        if pair.get("chainId").and_then(Value::as_str) != Some(api_chain) {
            continue;
        }
        let liquidity = pair
            .pointer("/liquidity/usd")
            .and_then(Value::as_f64);
        let info = PairInfo {
            symbol: pair
                .pointer("/baseToken/symbol")
                .and_then(Value::as_str)
                .map(str::to_string),
            name: pair
                .pointer("/baseToken/name")
                .and_then(Value::as_str)
                .map(str::to_string),
            price_usd: pair
                .get("priceUsd")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<f64>().ok()),
            liquidity_usd: liquidity,
            vol_24h_usd: pair.pointer("/volume/h24").and_then(Value::as_f64),
        };
        let depth = liquidity.unwrap_or(0.0);
        if best.as_ref().map_or(true, |(d, _)| depth > *d) {
            best = Some((depth, info));
        }
    }

    best.map(|(_, info)| info).ok_or_else(|| {
        UpstreamError::schema(PROVIDER, format!("no pairs on chain {}", api_chain))
    })
}
