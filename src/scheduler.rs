//! Cooperative job scheduler.
//!
//! One task per scheduled job. Every run carries a deadline of twice the
//! job's interval; on deadline the run is aborted (in-flight upstream calls
//! drop, idempotent writes already committed are kept) and the next tick
//! retries. A job exceeding its interval three runs in a row raises an
//! operational signal.

use anyhow::Result;
use chrono::{TimeZone, Timelike, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::metrics;

const MAX_CONSECUTIVE_OVERRUNS: u32 = 3;

/// Spawn a fixed-interval job. The closure is called once per tick.
pub fn spawn_interval_job<F, Fut>(
    name: &'static str,
    period: Duration,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        info!("⏱  Job '{}' scheduled every {:?}", name, period);
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = period * 2;
        let mut consecutive_overruns = 0u32;

        loop {
            tick.tick().await;
            metrics::incr(&metrics::JOBS_RUN);
            let started = std::time::Instant::now();

            match timeout(deadline, job()).await {
                Ok(Ok(())) => {
                    debug!("Job '{}' completed in {:?}", name, started.elapsed());
                }
                Ok(Err(e)) => {
                    // Workers surface kind + context; all the supervisor
                    // does is log and count.
                    warn!("Job '{}' failed: {:#}", name, e);
                }
                Err(_) => {
                    metrics::incr(&metrics::JOB_DEADLINE_EXCEEDED);
                    warn!("Job '{}' hit its {:?} deadline; aborted until next tick", name, deadline);
                }
            }

            if started.elapsed() > period {
                consecutive_overruns += 1;
                if consecutive_overruns >= MAX_CONSECUTIVE_OVERRUNS {
                    error!(
                        "🚨 Job '{}' exceeded its interval {} runs in a row",
                        name, consecutive_overruns
                    );
                }
            } else {
                consecutive_overruns = 0;
            }
        }
    })
}

/// Spawn a job that runs once a day at a fixed UTC hour.
pub fn spawn_daily_job<F, Fut>(name: &'static str, hour_utc: u32, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        info!("⏱  Job '{}' scheduled daily at {:02}:00 UTC", name, hour_utc);

        loop {
            let wait = seconds_until_next(hour_utc, Utc::now().timestamp());
            debug!("Job '{}' sleeping {}s until next run", name, wait);
            tokio::time::sleep(Duration::from_secs(wait)).await;

            metrics::incr(&metrics::JOBS_RUN);
            match timeout(Duration::from_secs(3_600), job()).await {
                Ok(Ok(())) => info!("Job '{}' completed", name),
                Ok(Err(e)) => warn!("Job '{}' failed: {:#}", name, e),
                Err(_) => {
                    metrics::incr(&metrics::JOB_DEADLINE_EXCEEDED);
                    warn!("Job '{}' hit its daily deadline", name);
                }
            }
        }
    })
}

/// Seconds from `now` to the next occurrence of `hour_utc:00:00`.
fn seconds_until_next(hour_utc: u32, now: i64) -> u64 {
    let now_dt = Utc.timestamp_opt(now, 0).single().unwrap_or_else(Utc::now);
    let today_target = now_dt
        .with_hour(hour_utc)
        .and_then(|d| d.with_minute(0))
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(now_dt);

    let target_ts = today_target.timestamp();
    if target_ts > now {
        (target_ts - now) as u64
    } else {
        (target_ts + 86_400 - now) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_seconds_until_next() {
        // 2026-01-01 00:00:00 UTC
        let midnight = 1_767_225_600i64;
        assert_eq!(seconds_until_next(2, midnight), 2 * 3_600);
        // One second past 02:00 waits a full day minus one second.
        assert_eq!(seconds_until_next(2, midnight + 2 * 3_600 + 1), 86_400 - 1);
        // Exactly at 02:00 schedules tomorrow.
        assert_eq!(seconds_until_next(2, midnight + 2 * 3_600), 86_400);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_job_runs_repeatedly() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        let handle = spawn_interval_job("test", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        handle.abort();

        // First tick fires immediately, then every 10s: t=0,10,20,30.
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_job_survives_errors() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        let handle = spawn_interval_job("failing", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("upstream exploded")
            }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        handle.abort();

        assert!(count.load(Ordering::SeqCst) >= 2);
    }
}
