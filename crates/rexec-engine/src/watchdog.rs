//! Periodically samples worker phases and cancels workers that have
//! exceeded their phase deadline.

use std::time::{Duration, Instant};

use rexec_core::Phase;

use crate::fleet::Fleet;

/// Fixed poll interval used after the first tick, matching "a handful
/// of seconds" for a watchdog whose only job is to catch stragglers,
/// not to fire precisely on the deadline.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Run until `shutdown` is cancelled. The first sleep is
/// `connect_timeout` itself so nothing can fire before any worker
/// could plausibly have timed out; every sleep after that is the fixed
/// poll interval.
pub async fn run(
    fleet: Fleet,
    connect_timeout: Duration,
    command_timeout: Duration,
    shutdown: tokio_util::sync::CancellationToken,
) {
    if !connect_timeout.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(connect_timeout) => {}
            _ = shutdown.cancelled() => return,
        }
    }

    loop {
        if shutdown.is_cancelled() {
            return;
        }
        tick(&fleet, connect_timeout, command_timeout);
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = shutdown.cancelled() => return,
        }
    }
}

fn tick(fleet: &Fleet, connect_timeout: Duration, command_timeout: Duration) {
    let now = Instant::now();
    let base = fleet.table.base();
    for slot in fleet.table.iter() {
        match slot.phase() {
            Phase::Connecting if !connect_timeout.is_zero() => {
                if let Some(start) = slot.start_time(base) {
                    if now > start + connect_timeout {
                        fleet.cancel_worker(slot.node_id);
                    }
                }
            }
            Phase::Streaming if !command_timeout.is_zero() => {
                if let Some(connect) = slot.connect_time(base) {
                    if now > connect + command_timeout {
                        fleet.cancel_worker(slot.node_id);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexec_core::{RcmdKind, WorkerSlot, WorkerTable};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn connecting_worker_past_deadline_gets_cancelled() {
        let base = Instant::now();
        let slot = Arc::new(WorkerSlot::new("h1", 0, RcmdKind::Bsd));
        slot.advance(Phase::Connecting);
        slot.mark_start(base);
        let fleet = Fleet::new(WorkerTable::new(vec![slot], base));

        let shutdown = tokio_util::sync::CancellationToken::new();
        let watchdog = tokio::spawn(run(fleet.clone(), Duration::from_millis(10), Duration::ZERO, shutdown.clone()));

        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(fleet.token(0).is_cancelled());
        shutdown.cancel();
        let _ = watchdog.await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_never_fires() {
        let base = Instant::now();
        let slot = Arc::new(WorkerSlot::new("h1", 0, RcmdKind::Bsd));
        slot.advance(Phase::Connecting);
        slot.mark_start(base);
        let fleet = Fleet::new(WorkerTable::new(vec![slot], base));

        let shutdown = tokio_util::sync::CancellationToken::new();
        let watchdog = tokio::spawn(run(fleet.clone(), Duration::ZERO, Duration::ZERO, shutdown.clone()));

        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!fleet.token(0).is_cancelled());
        shutdown.cancel();
        let _ = watchdog.await;
    }
}
