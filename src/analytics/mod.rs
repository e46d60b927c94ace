//! Analytics over trade histories: FIFO PnL, Being-Early scoring, bot
//! heuristics, and the rolling 30-day stats recompute.

pub mod botfilter;
pub mod early;
pub mod pnl;
pub mod stats;

pub use botfilter::BotFilter;
pub use pnl::{fifo, FifoOutcome};
pub use stats::StatsRoller;
