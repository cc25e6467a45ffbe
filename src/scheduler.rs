// src/scheduler.rs
//! Two independent periodic tasks on the tokio runtime: the short poll cycle
//! and the long report cycle. Both stop when the shutdown flag flips.

use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

use crate::error::CycleError;
use crate::pipeline::Pipeline;
use crate::report::Reporter;

/// Poll immediately, then every `every`. A slow cycle delays the next
/// tick rather than bunching missed ones up.
pub fn spawn_poll_loop(
    pipeline: Arc<Pipeline>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                res = shutdown.changed() => {
                    let stop = res.is_err() || *shutdown.borrow();
                    if stop {
                        break;
                    }
                    continue;
                }
            }

            match pipeline.run_cycle(chrono::Utc::now()).await {
                Ok(_) => {}
                Err(CycleError::Cancelled) => break,
                Err(e @ CycleError::AllSourcesFailed { .. }) => {
                    tracing::error!(target: "ingest", error = %e, "cycle skipped");
                }
                Err(e @ CycleError::Persist { .. }) => {
                    tracing::error!(target: "ingest", error = %e, "cache not persisted; a restart may redeliver this cycle's items once");
                }
            }
            gauge!(crate::metrics::LAST_POLL_TS).set(chrono::Utc::now().timestamp() as f64);
        }
        tracing::info!(target: "ingest", "poll loop stopped");
    })
}

/// First report one full period after start, then every `every`.
pub fn spawn_report_loop(
    reporter: Arc<Reporter>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                res = shutdown.changed() => {
                    let stop = res.is_err() || *shutdown.borrow();
                    if stop {
                        break;
                    }
                    continue;
                }
            }
            let outcome = reporter.run_tick(chrono::Utc::now()).await;
            tracing::debug!(target: "report", ?outcome, "report tick");
        }
        tracing::info!(target: "report", "report loop stopped");
    })
}
