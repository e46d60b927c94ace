//! Alchemy JSON-RPC adapter: ERC-20 transfer history for EVM chains.
//!
//! Uses `alchemy_getAssetTransfers` over a recent block window. The window
//! size is configured per chain; when the caller passes no explicit range
//! the adapter resolves `latest - window .. latest` itself.

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::http::HttpClient;
use super::{TransferSource, UpstreamError};
use crate::config::{DiscoveryConfig, HttpConfig};
use crate::types::{Transfer, TransferDirection};

const PROVIDER: &str = "alchemy";

pub struct AlchemyAdapter {
    http: HttpClient,
    api_key: String,
    block_ranges: HashMap<String, u64>,
    default_block_range: u64,
}

impl AlchemyAdapter {
    pub fn new(config: &HttpConfig, api_key: String, discovery: &DiscoveryConfig) -> Self {
        Self {
            http: HttpClient::new(PROVIDER, config, Duration::from_millis(300)),
            api_key,
            block_ranges: discovery.transfer_block_range.clone(),
            default_block_range: discovery.default_block_range,
        }
    }

    fn endpoint(&self, chain_id: &str) -> Option<String> {
        let subdomain = match chain_id {
            "eth" => "eth-mainnet",
            "base" => "base-mainnet",
            "arbitrum" => "arb-mainnet",
            _ => return None,
        };
        Some(format!("https://{}.g.alchemy.com/v2/{}", subdomain, self.api_key))
    }

    fn block_range(&self, chain_id: &str) -> u64 {
        self.block_ranges
            .get(chain_id)
            .copied()
            .unwrap_or(self.default_block_range)
    }

    async fn latest_block(&self, endpoint: &str) -> Result<u64, UpstreamError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_blockNumber",
            "params": []
        });
        let body = self.http.post_json(endpoint, &payload).await?;
        let hex = body
            .get("result")
            .and_then(Value::as_str)
            .ok_or_else(|| UpstreamError::schema(PROVIDER, "eth_blockNumber: missing result"))?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| UpstreamError::schema(PROVIDER, format!("bad block number {}: {}", hex, e)))
    }

    async fn get_asset_transfers(
        &self,
        endpoint: &str,
        filter: Value,
    ) -> Result<Vec<Transfer>, UpstreamError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "alchemy_getAssetTransfers",
            "params": [filter]
        });
        let body = self.http.post_json(endpoint, &payload).await?;

        if let Some(error) = body.get("error") {
            return Err(UpstreamError::transient(PROVIDER, error.to_string()));
        }

        let raw = body
            .pointer("/result/transfers")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                UpstreamError::schema(PROVIDER, "getAssetTransfers: missing result.transfers")
            })?;

        Ok(raw.iter().filter_map(parse_transfer).collect())
    }

    async fn resolve_range(
        &self,
        endpoint: &str,
        chain_id: &str,
        from_block: Option<u64>,
        to_block: Option<u64>,
    ) -> Result<(u64, Option<u64>), UpstreamError> {
        match from_block {
            Some(from) => Ok((from, to_block)),
            None => {
                let latest = self.latest_block(endpoint).await?;
                let from = latest.saturating_sub(self.block_range(chain_id));
                Ok((from, to_block))
            }
        }
    }
}

#[async_trait]
impl TransferSource for AlchemyAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports_chain(&self, chain_id: &str) -> bool {
        matches!(chain_id, "eth" | "base" | "arbitrum")
    }

    async fn fetch_token_transfers(
        &self,
        chain_id: &str,
        token_address: &str,
        from_block: Option<u64>,
        to_block: Option<u64>,
        limit: u32,
    ) -> Result<Vec<Transfer>, UpstreamError> {
        let endpoint = self
            .endpoint(chain_id)
            .ok_or_else(|| UpstreamError::schema(PROVIDER, format!("unsupported chain {}", chain_id)))?;
        let (from, to) = self
            .resolve_range(&endpoint, chain_id, from_block, to_block)
            .await?;

        let filter = json!({
            "fromBlock": format!("0x{:x}", from),
            "toBlock": to.map(|b| format!("0x{:x}", b)).unwrap_or_else(|| "latest".to_string()),
            "contractAddresses": [token_address],
            "category": ["erc20"],
            "withMetadata": true,
            "maxCount": format!("0x{:x}", limit.min(1000)),
            "order": "desc"
        });

        self.get_asset_transfers(&endpoint, filter).await
    }

    async fn fetch_wallet_transfers(
        &self,
        chain_id: &str,
        wallet_address: &str,
        direction: TransferDirection,
        from_block: Option<u64>,
        limit: u32,
    ) -> Result<Vec<Transfer>, UpstreamError> {
        let endpoint = self
            .endpoint(chain_id)
            .ok_or_else(|| UpstreamError::schema(PROVIDER, format!("unsupported chain {}", chain_id)))?;
        let (from, _) = self
            .resolve_range(&endpoint, chain_id, from_block, None)
            .await?;

        let mut filter = json!({
            "fromBlock": format!("0x{:x}", from),
            "toBlock": "latest",
            "category": ["erc20"],
            "withMetadata": true,
            "maxCount": format!("0x{:x}", limit.min(1000)),
            "order": "desc"
        });
        match direction {
            TransferDirection::In => filter["toAddress"] = json!(wallet_address),
            TransferDirection::Out => filter["fromAddress"] = json!(wallet_address),
        }

        self.get_asset_transfers(&endpoint, filter).await
    }
}

fn parse_transfer(raw: &Value) -> Option<Transfer> {
    let tx_hash = raw.get("hash")?.as_str()?.to_string();
    let from = raw.get("from")?.as_str()?.to_ascii_lowercase();
    let to = raw.get("to").and_then(Value::as_str)?.to_ascii_lowercase();
    let token = raw
        .pointer("/rawContract/address")
        .and_then(Value::as_str)?
        .to_ascii_lowercase();
    let qty = raw.get("value").and_then(Value::as_f64)?;

    let ts = raw
        .pointer("/metadata/blockTimestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())?;

    Some(Transfer {
        tx_hash,
        ts,
        from_address: from,
        to_address: to,
        token_address: token,
        qty,
    })
}
