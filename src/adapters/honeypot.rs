//! honeypot.is adapter: buy/sell tax simulation + honeypot bit, EVM only.
//! Solana tokens skip this gate (no safety source registered for them).

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::http::HttpClient;
use super::{SafetySource, UpstreamError};
use crate::config::HttpConfig;
use crate::types::SafetyReport;

const BASE_URL: &str = "https://api.honeypot.is/v2";
const PROVIDER: &str = "honeypot";

pub struct HoneypotAdapter {
    http: HttpClient,
}

impl HoneypotAdapter {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            http: HttpClient::new(PROVIDER, config, Duration::from_millis(1_000)),
        }
    }

    fn chain_numeric_id(chain_id: &str) -> Option<&'static str> {
        match chain_id {
            "eth" => Some("1"),
            "base" => Some("8453"),
            "arbitrum" => Some("42161"),
            _ => None,
        }
    }
}

#[async_trait]
impl SafetySource for HoneypotAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports_chain(&self, chain_id: &str) -> bool {
        Self::chain_numeric_id(chain_id).is_some()
    }

    async fn safety_check(
        &self,
        chain_id: &str,
        token_address: &str,
    ) -> Result<SafetyReport, UpstreamError> {
        let numeric_id = Self::chain_numeric_id(chain_id).ok_or_else(|| {
            UpstreamError::schema(PROVIDER, format!("unsupported chain {}", chain_id))
        })?;

        let url = format!("{}/IsHoneypot", BASE_URL);
        let body = self
            .http
            .get_json(&url, &[("address", token_address), ("chainID", numeric_id)], &[])
            .await?;

        parse_report(&body)
    }
}

fn parse_report(body: &Value) -> Result<SafetyReport, UpstreamError> {
    let is_honeypot = body
        .pointer("/honeypotResult/isHoneypot")
        .and_then(Value::as_bool)
        .ok_or_else(|| UpstreamError::schema(PROVIDER, "missing honeypotResult.isHoneypot"))?;

    // Taxes come back as percentages already; absent simulation means the
    // simulation failed, which we treat as zero tax rather than a reject.
    let buy_tax = body
        .pointer("/simulationResult/buyTax")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let sell_tax = body
        .pointer("/simulationResult/sellTax")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    Ok(SafetyReport {
        buy_tax_pct: buy_tax,
        sell_tax_pct: sell_tax,
        is_honeypot,
    })
}
