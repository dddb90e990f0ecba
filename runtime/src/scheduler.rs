//! Fixed-period watch loop.
//!
//! Runs one cycle immediately, then one per period until shutdown is
//! signaled. Cycles are awaited inline, so they never overlap; a slow cycle
//! pushes the next tick back instead of bunching ticks up.

use std::sync::Arc;
use std::time::Duration;

use statwatch::MetricValue;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::watcher::Watcher;

/// Run cycles until `shutdown` is notified. Returns the number of cycles run.
pub async fn run<V: MetricValue>(
    watcher: &mut Watcher<V>,
    period: Duration,
    shutdown: Arc<Notify>,
) -> u64 {
    info!("watch loop started: period={}s", period.as_secs());
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let start = watcher.cycles();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!("watch loop stopping");
                break;
            }
            _ = ticker.tick() => {
                let outcome = watcher.run_cycle().await;
                debug!("cycle {} finished: {outcome:?}", watcher.cycles());
            }
        }
    }

    watcher.cycles() - start
}
