//! Token ingestion and wallet discovery: trending feeds in, wallets and
//! trades out.

pub mod discovery;
pub mod runner_seed;
pub mod swap_classifier;

pub use discovery::WalletDiscovery;
pub use runner_seed::RunnerIngestion;
pub use swap_classifier::SwapClassifier;
