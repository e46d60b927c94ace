//! 📱 Telegram alert transport.
//!
//! Sends confluence alerts to the configured chat. Messages are spaced to
//! respect Telegram's per-chat rate limit.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::{explorer_token_link, AlertOutcome, AlertSink, ConfluenceAlert};
use crate::adapters::http::Throttle;
use crate::types::short_addr;

const MAX_WALLETS_SHOWN: usize = 5;
/// Telegram allows ~1 msg/s per chat; stay under it.
const SEND_GAP: Duration = Duration::from_millis(1_100);

pub struct TelegramClient {
    http: Client,
    send_url: String,
    chat_id: String,
    throttle: Throttle,
}

impl TelegramClient {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client"),
            send_url: format!("https://api.telegram.org/bot{}/sendMessage", bot_token),
            chat_id,
            throttle: Throttle::new(SEND_GAP),
        }
    }

    pub async fn send_message(&self, text: &str) -> AlertOutcome {
        self.throttle.acquire().await;

        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true
        });

        let response = match self.http.post(&self.send_url).json(&payload).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Telegram send failed: {}", e);
                return AlertOutcome::Transient;
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("Telegram message delivered");
            AlertOutcome::Ok
        } else if status.is_server_error() || status.as_u16() == 429 {
            warn!("Telegram API transient error: HTTP {}", status);
            AlertOutcome::Transient
        } else {
            warn!("Telegram API rejected message: HTTP {}", status);
            AlertOutcome::Permanent
        }
    }
}

#[async_trait]
impl AlertSink for TelegramClient {
    async fn emit(&self, alert: &ConfluenceAlert) -> AlertOutcome {
        self.send_message(&format_confluence(alert)).await
    }
}

fn format_confluence(alert: &ConfluenceAlert) -> String {
    let action = match alert.kind {
        "sell_confluence" => "SELLING",
        _ => "BUYING",
    };
    let symbol = alert.symbol.as_deref().unwrap_or("???");
    let price = alert
        .price_usd
        .map(|p| format!("${:.8}", p))
        .unwrap_or_else(|| "n/a".to_string());

    let mut message = format!(
        "🚨 <b>CONFLUENCE: {} wallets {}</b> 🚨\n\n\
        Token: <b>{}</b> ({})\n\
        Chain: {}\n\
        Window: {:.0} min\n\n\
        Wallets:\n",
        alert.wallets.len(),
        action,
        symbol,
        price,
        alert.chain_id,
        alert.window_ms as f64 / 60_000.0,
    );

    for brief in alert.wallets.iter().take(MAX_WALLETS_SHOWN) {
        message.push_str(&format!(
            "• <code>{}</code> | 30D: ${:.0} | Best: {} | Early: {}\n",
            short_addr(&brief.address),
            brief.realized_pnl_usd,
            brief
                .best_trade_multiple
                .map(|m| format!("{:.1}x", m))
                .unwrap_or_else(|| "-".to_string()),
            brief
                .earlyscore_median
                .map(|e| format!("{:.0}", e))
                .unwrap_or_else(|| "-".to_string()),
        ));
    }
    if alert.wallets.len() > MAX_WALLETS_SHOWN {
        message.push_str(&format!("… and {} more\n", alert.wallets.len() - MAX_WALLETS_SHOWN));
    }

    message.push_str(&format!(
        "\n{}",
        explorer_token_link(&alert.chain_id, &alert.token_address)
    ));
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::WalletBrief;
    use crate::types::TradeSide;

    fn alert() -> ConfluenceAlert {
        ConfluenceAlert {
            kind: "buy_confluence",
            chain_id: "eth".to_string(),
            token_address: "0xaaa111".to_string(),
            symbol: Some("PEPE".to_string()),
            side: TradeSide::Buy,
            wallets: vec![
                WalletBrief {
                    address: "0xw1w1w1w1w1w1".to_string(),
                    realized_pnl_usd: 52_000.0,
                    best_trade_multiple: Some(4.2),
                    earlyscore_median: Some(71.0),
                    trades_count: 12,
                },
                WalletBrief {
                    address: "0xw2w2w2w2w2w2".to_string(),
                    realized_pnl_usd: 18_000.0,
                    best_trade_multiple: None,
                    earlyscore_median: None,
                    trades_count: 3,
                },
            ],
            window_ms: 120_000,
            price_usd: Some(0.0000012),
        }
    }

    #[test]
    fn test_format_confluence_message() {
        let message = format_confluence(&alert());
        assert!(message.contains("2 wallets BUYING"));
        assert!(message.contains("PEPE"));
        assert!(message.contains("0xw1w1w1w1"));
        assert!(message.contains("4.2x"));
        assert!(message.contains("etherscan.io/token/0xaaa111"));
        assert!(message.contains("Window: 2 min"));
    }

    #[test]
    fn test_format_sell_side() {
        let mut a = alert();
        a.kind = "sell_confluence";
        a.side = TradeSide::Sell;
        assert!(format_confluence(&a).contains("SELLING"));
    }

    #[test]
    fn test_wallet_list_truncated() {
        let mut a = alert();
        a.wallets = (0..8)
            .map(|i| WalletBrief {
                address: format!("0xwallet{}", i),
                realized_pnl_usd: 0.0,
                best_trade_multiple: None,
                earlyscore_median: None,
                trades_count: 0,
            })
            .collect();
        let message = format_confluence(&a);
        assert!(message.contains("and 3 more"));
    }
}
