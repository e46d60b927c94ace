// Wallet Scout - trending-token wallet discovery and confluence alerting
// Single service: ingest trending tokens, discover profitable wallets,
// rank them, monitor the top set, alert on confluence.

pub mod adapters;
pub mod alerts;
pub mod analytics;
pub mod config;
pub mod db;
pub mod ingest;
pub mod metrics;
pub mod monitor;
pub mod price;
pub mod scheduler;
pub mod types;
pub mod watchlist;

pub use config::{Config, Secrets};
pub use db::Database;
