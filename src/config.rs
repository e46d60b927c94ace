use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;

/// Complete configuration for the wallet-scout service.
///
/// Operational parameters live in `config.toml`; secrets (API keys, bot
/// token, connection URLs) come from the environment via `.env`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub chains: ChainsConfig,
    pub jobs: JobsConfig,
    pub discovery: DiscoveryConfig,
    pub safety: SafetyConfig,
    pub confluence: ConfluenceConfig,
    pub watchlist: WatchlistConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainsConfig {
    /// Enabled chain identifiers.
    pub enabled: Vec<String>,
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            enabled: vec![
                "eth".to_string(),
                "base".to_string(),
                "arbitrum".to_string(),
                "solana".to_string(),
            ],
        }
    }
}

/// Job intervals. Each scheduled run carries a deadline of twice its
/// interval; see `scheduler`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    pub ingest_interval_min: u64,
    pub discover_interval_min: u64,
    pub stats_interval_min: u64,
    pub monitor_interval_secs: u64,
    /// Wall-clock UTC hour for the daily watchlist maintenance run.
    pub maintenance_hour_utc: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ingest_interval_min: 5,
            discover_interval_min: 10,
            stats_interval_min: 15,
            monitor_interval_secs: 120,
            maintenance_hour_utc: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Only seed tokens whose latest snapshot is younger than this are
    /// discovery targets.
    pub lookback_hours: i64,
    /// Per-chain transfer window, in blocks. Chains missing from the map
    /// fall back to `default_block_range`.
    pub transfer_block_range: HashMap<String, u64>,
    pub default_block_range: u64,
    /// Addresses sending a token more than this many times inside the
    /// window are classified as liquidity pools.
    pub pool_send_threshold: u32,
    /// Max transfers requested per token / per wallet-direction call.
    pub transfer_fetch_limit: u32,
    /// Bounded fan-out for per-token and per-wallet work.
    pub worker_pool_size: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let mut ranges = HashMap::new();
        ranges.insert("eth".to_string(), 1000);
        ranges.insert("base".to_string(), 5000);
        ranges.insert("arbitrum".to_string(), 5000);
        Self {
            lookback_hours: 3,
            transfer_block_range: ranges,
            default_block_range: 1000,
            pool_send_threshold: 2,
            transfer_fetch_limit: 100,
            worker_pool_size: 8,
        }
    }
}

impl DiscoveryConfig {
    pub fn block_range_for(&self, chain_id: &str) -> u64 {
        self.transfer_block_range
            .get(chain_id)
            .copied()
            .unwrap_or(self.default_block_range)
    }
}

/// Safety gate thresholds applied before a trending token becomes a seed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SafetyConfig {
    pub min_liquidity_usd: f64,
    pub min_volume_24h_usd: f64,
    pub max_tax_pct: f64,
    /// Token addresses (normalized) never seeded and never alerted on:
    /// stablecoins and wrapped natives.
    pub stablecoin_exclusions: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            min_liquidity_usd: 50_000.0,
            min_volume_24h_usd: 50_000.0,
            max_tax_pct: 10.0,
            stablecoin_exclusions: vec![
                // USDC / USDT / DAI / WETH on mainnet
                "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string(),
                "0xdac17f958d2ee523a2206206994597c13d831ec7".to_string(),
                "0x6b175474e89094c44da98b954eedeac495271d0f".to_string(),
                "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2".to_string(),
                // USDC / wSOL on Solana
                "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
                "So11111111111111111111111111111111111111112".to_string(),
            ],
        }
    }
}

impl SafetyConfig {
    pub fn is_excluded(&self, token_address: &str) -> bool {
        self.stablecoin_exclusions
            .iter()
            .any(|a| a == token_address)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfluenceConfig {
    pub window_min: i64,
    pub min_confluence: usize,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            window_min: 30,
            min_confluence: 2,
        }
    }
}

impl ConfluenceConfig {
    pub fn window_secs(&self) -> i64 {
        self.window_min * 60
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchlistConfig {
    /// Active watchlist cap per chain.
    pub top_n: usize,
    pub weight_pnl: f64,
    pub weight_activity: f64,
    pub weight_early: f64,
    pub min_trades: u32,
    pub min_best_multiple: f64,
    /// Deactivate when unrealized PnL falls below this.
    pub neg_pnl_threshold_usd: f64,
    /// Enable outcome-driven weight adjustment (bounded, see watchlist::scoring).
    pub adaptive_weights: bool,
    pub weights_state_path: String,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            top_n: 30,
            weight_pnl: 0.30,
            weight_activity: 0.30,
            weight_early: 0.40,
            min_trades: 1,
            min_best_multiple: 1.0,
            neg_pnl_threshold_usd: 0.0,
            adaptive_weights: false,
            weights_state_path: "data/weights.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub wal_mode: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/wallet_scout.db".to_string(),
            wal_mode: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Price info cache TTL inside the enricher.
    pub price_cache_ttl_secs: u64,
    /// Adapter-level metadata cache TTL.
    pub info_cache_ttl_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            price_cache_ttl_secs: 60,
            info_cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    /// Interval for the periodic counters summary line.
    pub metrics_log_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_log_interval_secs: 300,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chains: ChainsConfig::default(),
            jobs: JobsConfig::default(),
            discovery: DiscoveryConfig::default(),
            safety: SafetyConfig::default(),
            confluence: ConfluenceConfig::default(),
            watchlist: WatchlistConfig::default(),
            database: DatabaseConfig::default(),
            http: HttpConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Try config.toml first, then config.example.toml, then built-in defaults.
    pub fn load_or_default() -> Result<Self> {
        match Self::load("config.toml").or_else(|_| Self::load("config.example.toml")) {
            Ok(config) => Ok(config),
            Err(_) => {
                let config = Config::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.chains.enabled.is_empty(), "No chains enabled");
        anyhow::ensure!(self.confluence.min_confluence >= 1, "min_confluence must be >= 1");
        anyhow::ensure!(self.watchlist.top_n >= 1, "watchlist top_n must be >= 1");
        let wsum = self.watchlist.weight_pnl
            + self.watchlist.weight_activity
            + self.watchlist.weight_early;
        anyhow::ensure!(
            (wsum - 1.0).abs() < 1e-6,
            "watchlist weights must sum to 1.0, got {}",
            wsum
        );
        anyhow::ensure!(
            self.jobs.maintenance_hour_utc < 24,
            "maintenance_hour_utc must be 0-23"
        );
        Ok(())
    }
}

/// Secrets and connection strings, loaded from the environment.
/// Any of the API keys may be absent; the matching adapter is then skipped.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub alchemy_api_key: Option<String>,
    pub helius_api_key: Option<String>,
    pub birdeye_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub redis_url: String,
    pub database_path_override: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            alchemy_api_key: env_nonempty("ALCHEMY_API_KEY"),
            helius_api_key: env_nonempty("HELIUS_API_KEY"),
            birdeye_api_key: env_nonempty("BIRDEYE_API_KEY"),
            telegram_bot_token: env_nonempty("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: env_nonempty("TELEGRAM_CHAT_ID"),
            redis_url: env_nonempty("REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1:6379/0".to_string()),
            database_path_override: env_nonempty("DATABASE_PATH"),
        }
    }

    pub fn telegram_enabled(&self) -> bool {
        self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some()
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
