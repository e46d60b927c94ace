//! Watchlist ranking and maintenance: percentile-blended composite scores
//! and the daily top-N add/remove pass.

pub mod rules;
pub mod scoring;

pub use rules::WatchlistMaintainer;
pub use scoring::{composite_scores, Weights, WeightsState};
