//! Helius adapter: enhanced transaction history for Solana.
//!
//! The address-history endpoint accepts any address (wallet or mint), so
//! both capability calls are served by the same route with different
//! client-side filtering. Block-range parameters do not apply on Solana
//! and are ignored.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::http::HttpClient;
use super::{TransferSource, UpstreamError};
use crate::config::HttpConfig;
use crate::types::{Transfer, TransferDirection};

const BASE_URL: &str = "https://api.helius.xyz/v0";
const PROVIDER: &str = "helius";

pub struct HeliusAdapter {
    http: HttpClient,
    api_key: String,
}

impl HeliusAdapter {
    pub fn new(config: &HttpConfig, api_key: String) -> Self {
        Self {
            http: HttpClient::new(PROVIDER, config, Duration::from_millis(500)),
            api_key,
        }
    }

    async fn address_transactions(
        &self,
        address: &str,
        limit: u32,
    ) -> Result<Vec<Value>, UpstreamError> {
        let url = format!("{}/addresses/{}/transactions", BASE_URL, address);
        let limit_str = limit.min(100).to_string();
        let body = self
            .http
            .get_json(
                &url,
                &[("api-key", self.api_key.as_str()), ("limit", limit_str.as_str())],
                &[],
            )
            .await?;

        body.as_array()
            .cloned()
            .ok_or_else(|| UpstreamError::schema(PROVIDER, "transactions: expected array"))
    }
}

#[async_trait]
impl TransferSource for HeliusAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports_chain(&self, chain_id: &str) -> bool {
        chain_id == "solana"
    }

    async fn fetch_token_transfers(
        &self,
        _chain_id: &str,
        token_address: &str,
        _from_block: Option<u64>,
        _to_block: Option<u64>,
        limit: u32,
    ) -> Result<Vec<Transfer>, UpstreamError> {
        let txs = self.address_transactions(token_address, limit).await?;
        Ok(extract_transfers(&txs, |t| t.token_address == token_address))
    }

    async fn fetch_wallet_transfers(
        &self,
        _chain_id: &str,
        wallet_address: &str,
        direction: TransferDirection,
        _from_block: Option<u64>,
        limit: u32,
    ) -> Result<Vec<Transfer>, UpstreamError> {
        let txs = self.address_transactions(wallet_address, limit).await?;
        Ok(extract_transfers(&txs, |t| match direction {
            TransferDirection::In => t.to_address == wallet_address,
            TransferDirection::Out => t.from_address == wallet_address,
        }))
    }
}

fn extract_transfers<F>(txs: &[Value], keep: F) -> Vec<Transfer>
where
    F: Fn(&Transfer) -> bool,
{
    let mut out = Vec::new();
    for tx in txs {
        let Some(signature) = tx.get("signature").and_then(Value::as_str) else {
            continue;
        };
        let Some(ts) = tx.get("timestamp").and_then(Value::as_i64) else {
            continue;
        };
        let Some(token_transfers) = tx.get("tokenTransfers").and_then(Value::as_array) else {
            continue;
        };

        for tt in token_transfers {
            let Some(transfer) = parse_token_transfer(tt, signature, ts) else {
                continue;
            };
            if keep(&transfer) {
                out.push(transfer);
            }
        }
    }
    out
}

fn parse_token_transfer(tt: &Value, signature: &str, ts: i64) -> Option<Transfer> {
    Some(Transfer {
        tx_hash: signature.to_string(),
        ts,
        from_address: tt.get("fromUserAccount")?.as_str()?.to_string(),
        to_address: tt.get("toUserAccount")?.as_str()?.to_string(),
        token_address: tt.get("mint")?.as_str()?.to_string(),
        qty: tt.get("tokenAmount").and_then(Value::as_f64)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_txs() -> Vec<Value> {
        vec![json!({
            "signature": "sig1",
            "timestamp": 1750000000,
            "tokenTransfers": [
                {
                    "fromUserAccount": "PoolAddr",
                    "toUserAccount": "WalletA",
                    "mint": "MintX",
                    "tokenAmount": 100.0
                },
                {
                    "fromUserAccount": "WalletA",
                    "toUserAccount": "PoolAddr",
                    "mint": "MintY",
                    "tokenAmount": 5.0
                }
            ]
        })]
    }

    #[test]
    fn test_extract_token_transfers_filters_by_mint() {
        let txs = sample_txs();
        let transfers = extract_transfers(&txs, |t| t.token_address == "MintX");
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].to_address, "WalletA");
        assert_eq!(transfers[0].qty, 100.0);
    }

    #[test]
    fn test_extract_wallet_transfers_by_direction() {
        let txs = sample_txs();
        let incoming = extract_transfers(&txs, |t| t.to_address == "WalletA");
        let outgoing = extract_transfers(&txs, |t| t.from_address == "WalletA");
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].token_address, "MintX");
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].token_address, "MintY");
    }
}
