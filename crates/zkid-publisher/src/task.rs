//! Background publisher loop.
//!
//! Sweeps transacted states every `check_interval` and, when a publish
//! interval is set, publishes every identity with pending changes. Stops
//! when the cancellation token fires; an in-progress round completes first.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::publisher::StatePublisher;

/// Loop schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Confirmation sweep interval.
    pub check_interval: Duration,
    /// Publish interval; `None` leaves publishing to callers.
    pub publish_interval: Option<Duration>,
}

/// Counters for a finished loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub sweeps: u64,
    pub publish_rounds: u64,
}

/// Run the loop on the current task until `shutdown` is cancelled.
pub async fn run(publisher: StatePublisher, schedule: Schedule, shutdown: CancellationToken) -> LoopStats {
    let mut check = ticker(schedule.check_interval);
    let mut publish = schedule.publish_interval.map(ticker);
    let mut stats = LoopStats::default();

    tracing::info!(
        check_interval_ms = schedule.check_interval.as_millis() as u64,
        publish_interval_ms = schedule.publish_interval.map(|d| d.as_millis() as u64),
        chain = publisher.chain().chain_name(),
        "publisher started"
    );

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            _ = check.tick() => {
                publisher.check_transaction_status().await;
                stats.sweeps += 1;
            }

            _ = next_tick(&mut publish) => {
                let results = publisher.publish_all().await;
                tracing::debug!(identities = results.len(), "publish round");
                stats.publish_rounds += 1;
            }
        }
    }

    tracing::info!(sweeps = stats.sweeps, publish_rounds = stats.publish_rounds, "publisher stopped");
    stats
}

/// Spawn [`run`] on the runtime.
pub fn spawn(publisher: StatePublisher, schedule: Schedule, shutdown: CancellationToken) -> JoinHandle<LoopStats> {
    tokio::spawn(run(publisher, schedule, shutdown))
}

fn ticker(period: Duration) -> Interval {
    let mut i = interval(period);
    i.set_missed_tick_behavior(MissedTickBehavior::Delay);
    i
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}
