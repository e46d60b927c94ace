//! GeckoTerminal adapter: trending pools + last-resort price source.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::http::HttpClient;
use super::{PriceSource, TrendingSource, UpstreamError};
use crate::config::HttpConfig;
use crate::types::TokenSnapshot;

const BASE_URL: &str = "https://api.geckoterminal.com/api/v2";
const PROVIDER: &str = "geckoterminal";

pub struct GeckoTerminalAdapter {
    http: HttpClient,
}

impl GeckoTerminalAdapter {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            // GeckoTerminal free tier allows ~30 calls/min.
            http: HttpClient::new(PROVIDER, config, Duration::from_millis(2_000)),
        }
    }

    fn network(chain_id: &str) -> &str {
        match chain_id {
            "arbitrum" => "arbitrum",
            other => other,
        }
    }
}

#[async_trait]
impl TrendingSource for GeckoTerminalAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports_chain(&self, _chain_id: &str) -> bool {
        true
    }

    async fn fetch_trending(&self, chain_id: &str) -> Result<Vec<TokenSnapshot>, UpstreamError> {
        let url = format!(
            "{}/networks/{}/trending_pools",
            BASE_URL,
            Self::network(chain_id)
        );
        let body = self.http.get_json(&url, &[("page", "1")], &[]).await?;
        parse_trending_pools(&body)
    }
}

#[async_trait]
impl PriceSource for GeckoTerminalAdapter {
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
        let url = format!(
            "{}/simple/networks/{}/token_price/{}",
            BASE_URL,
            Self::network(chain_id),
            token_address
        );
        let body = self.http.get_json(&url, &[], &[]).await?;

        let prices = body
            .pointer("/data/attributes/token_prices")
            .and_then(Value::as_object)
            .ok_or_else(|| UpstreamError::schema(PROVIDER, "token_price: missing prices map"))?;

        // Keys come back lowercased regardless of input casing.
        let price = prices
            .get(token_address)
            .or_else(|| prices.get(&token_address.to_ascii_lowercase()))
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok());

        Ok(price)
    }
}

fn parse_trending_pools(body: &Value) -> Result<Vec<TokenSnapshot>, UpstreamError> {
    let pools = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::schema(PROVIDER, "trending_pools: missing data"))?;

    let mut snapshots = Vec::new();
    for pool in pools {
        // base_token id looks like "eth_0xabc..."; the part after the first
        // underscore is the token address.
        let Some(token_id) = pool
            .pointer("/relationships/base_token/data/id")
            .and_then(Value::as_str)
        else {
            continue;
        };
        let Some((_, address)) = token_id.split_once('_') else {
            continue;
        };

        let attrs = &pool["attributes"];
        snapshots.push(TokenSnapshot {
            address: address.to_string(),
            symbol: parse_pool_symbol(attrs.get("name").and_then(Value::as_str)),
            name: None,
            price_usd: str_number(attrs.get("base_token_price_usd")),
            liquidity_usd: str_number(attrs.get("reserve_in_usd")),
            vol_24h_usd: str_number(attrs.pointer("/volume_usd/h24")),
        });
    }
    Ok(snapshots)
}

/// Pool names look like "PEPE / WETH"; the base symbol is the first part.
fn parse_pool_symbol(name: Option<&str>) -> Option<String> {
    name.and_then(|n| n.split('/').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn str_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_trending_pools() {
        let body = json!({
            "data": [{
                "attributes": {
                    "name": "WOJAK / WETH",
                    "base_token_price_usd": "0.00042",
                    "reserve_in_usd": "120000.5",
                    "volume_usd": {"h24": "340000.1"}
                },
                "relationships": {
                    "base_token": {"data": {"id": "eth_0xAbC123"}}
                }
            }]
        });

        let snapshots = parse_trending_pools(&body).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].address, "0xAbC123");
        assert_eq!(snapshots[0].symbol.as_deref(), Some("WOJAK"));
        assert_eq!(snapshots[0].price_usd, Some(0.00042));
        assert_eq!(snapshots[0].liquidity_usd, Some(120000.5));
        assert_eq!(snapshots[0].vol_24h_usd, Some(340000.1));
    }

    #[test]
    fn test_parse_trending_pools_missing_data() {
        let err = parse_trending_pools(&json!({})).unwrap_err();
        assert!(matches!(err, UpstreamError::Schema { .. }));
    }

    #[test]
    fn test_pool_symbol_extraction() {
        assert_eq!(parse_pool_symbol(Some("PEPE / WETH")), Some("PEPE".to_string()));
        assert_eq!(parse_pool_symbol(Some("SOLO")), Some("SOLO".to_string()));
        assert_eq!(parse_pool_symbol(None), None);
    }
}
