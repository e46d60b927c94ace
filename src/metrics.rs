//! Process-local operational counters.
//!
//! Job supervisors only log, count, and (past a failure-rate threshold)
//! mark a component degraded; these atomics are the counting half of that.
//! A background task prints a summary line periodically so a scrape-less
//! deployment still leaves a trail in the logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

pub static JOBS_RUN: AtomicU64 = AtomicU64::new(0);
pub static JOB_DEADLINE_EXCEEDED: AtomicU64 = AtomicU64::new(0);
pub static UPSTREAM_TRANSIENT_ERRORS: AtomicU64 = AtomicU64::new(0);
pub static UPSTREAM_SCHEMA_ERRORS: AtomicU64 = AtomicU64::new(0);
pub static PRICE_MISSES: AtomicU64 = AtomicU64::new(0);
pub static POLICY_REJECTS: AtomicU64 = AtomicU64::new(0);
pub static TRADES_INSERTED: AtomicU64 = AtomicU64::new(0);
pub static TRADES_QUARANTINED: AtomicU64 = AtomicU64::new(0);
pub static WINDOW_STORE_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static ALERTS_EMITTED: AtomicU64 = AtomicU64::new(0);
pub static ALERTS_DEDUPED: AtomicU64 = AtomicU64::new(0);

pub fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

/// Spawn the periodic summary logger.
pub fn spawn_reporter(interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; skip it.
        tick.tick().await;
        loop {
            tick.tick().await;
            log_summary();
        }
    })
}

fn log_summary() {
    let transient = UPSTREAM_TRANSIENT_ERRORS.load(Ordering::Relaxed);
    let schema = UPSTREAM_SCHEMA_ERRORS.load(Ordering::Relaxed);
    let store_failures = WINDOW_STORE_FAILURES.load(Ordering::Relaxed);

    info!(
        "📊 Counters: jobs={} trades={} alerts={} (deduped={}) price_misses={} rejects={}",
        JOBS_RUN.load(Ordering::Relaxed),
        TRADES_INSERTED.load(Ordering::Relaxed),
        ALERTS_EMITTED.load(Ordering::Relaxed),
        ALERTS_DEDUPED.load(Ordering::Relaxed),
        PRICE_MISSES.load(Ordering::Relaxed),
        POLICY_REJECTS.load(Ordering::Relaxed),
    );

    if transient > 0 || schema > 0 || store_failures > 0 {
        warn!(
            "⚠️  Upstream health: transient={} schema={} window_store_failures={} deadline_exceeded={} quarantined={}",
            transient,
            schema,
            store_failures,
            JOB_DEADLINE_EXCEEDED.load(Ordering::Relaxed),
            TRADES_QUARANTINED.load(Ordering::Relaxed),
        );
    }
}
