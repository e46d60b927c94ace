//! Birdeye adapter: Solana trending feed + price fallback. Keyed API.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::http::HttpClient;
use super::{PriceSource, TrendingSource, UpstreamError};
use crate::config::HttpConfig;
use crate::types::TokenSnapshot;

const BASE_URL: &str = "https://public-api.birdeye.so";
const PROVIDER: &str = "birdeye";

pub struct BirdeyeAdapter {
    http: HttpClient,
    api_key: String,
}

impl BirdeyeAdapter {
    pub fn new(config: &HttpConfig, api_key: String) -> Self {
        Self {
            http: HttpClient::new(PROVIDER, config, Duration::from_millis(1_200)),
            api_key,
        }
    }

    fn headers(&self) -> [(&str, &str); 2] {
        [("X-API-KEY", self.api_key.as_str()), ("x-chain", "solana")]
    }
}

#[async_trait]
impl TrendingSource for BirdeyeAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports_chain(&self, chain_id: &str) -> bool {
        chain_id == "solana"
    }

    async fn fetch_trending(&self, _chain_id: &str) -> Result<Vec<TokenSnapshot>, UpstreamError> {
        let url = format!("{}/defi/token_trending", BASE_URL);
        let body = self
            .http
            .get_json(
                &url,
                &[("sort_by", "rank"), ("sort_type", "asc"), ("limit", "20")],
                &self.headers(),
            )
            .await?;
        parse_trending(&body)
    }
}

#[async_trait]
impl PriceSource for BirdeyeAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports_chain(&self, chain_id: &str) -> bool {
        chain_id == "solana"
    }

    async fn price_of(
        &self,
        _chain_id: &str,
        token_address: &str,
    ) -> Result<Option<f64>, UpstreamError> {
        let url = format!("{}/defi/price", BASE_URL);
        let body = self
            .http
            .get_json(&url, &[("address", token_address)], &self.headers())
            .await?;

        Ok(body.pointer("/data/value").and_then(Value::as_f64))
    }
}

fn parse_trending(body: &Value) -> Result<Vec<TokenSnapshot>, UpstreamError> {
    let tokens = body
        .pointer("/data/tokens")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::schema(PROVIDER, "token_trending: missing data.tokens"))?;

    let mut snapshots = Vec::new();
    for token in tokens {
        let Some(address) = token.get("address").and_then(Value::as_str) else {
            continue;
        };
        snapshots.push(TokenSnapshot {
            address: address.to_string(),
            symbol: token.get("symbol").and_then(Value::as_str).map(str::to_string),
            name: token.get("name").and_then(Value::as_str).map(str::to_string),
            price_usd: token.get("price").and_then(Value::as_f64),
            liquidity_usd: token.get("liquidity").and_then(Value::as_f64),
            vol_24h_usd: token.get("volume24hUSD").and_then(Value::as_f64),
        });
    }
    Ok(snapshots)
}
