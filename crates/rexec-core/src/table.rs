use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::phase::Phase;
use crate::worker::WorkerSlot;

/// Status line for one worker, as reported by the signal mediator's
/// enumeration on the first operator interrupt, or by the debug dump.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub host: String,
    pub phase: Phase,
    /// Seconds remaining until the watchdog's deadline for this
    /// worker, when one applies (`Connecting` with a connect timeout,
    /// `Streaming` with a command timeout).
    pub deadline_in: Option<i64>,
}

/// Fixed-length, host-indexed table of worker slots, created once by
/// the scheduler and retained until final status aggregation.
///
/// Classic implementations of this kind of fan-out tool keep a
/// process-global array walked from a `SIGINT` handler without
/// locking. This keeps the same "lock-free enumeration" property via
/// `Arc<WorkerSlot>`'s atomic fields, but since nothing here runs in
/// actual async-signal-handler context (the operator interrupt is
/// awaited cooperatively -- see `rexec-engine`), a plain `Vec` index
/// replaces a sentinel-terminated traversal.
#[derive(Debug, Clone)]
pub struct WorkerTable {
    slots: Arc<[Arc<WorkerSlot>]>,
    base: Instant,
}

impl WorkerTable {
    pub fn new(slots: Vec<Arc<WorkerSlot>>, base: Instant) -> Self {
        Self {
            slots: slots.into(),
            base,
        }
    }

    pub fn base(&self) -> Instant {
        self.base
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WorkerSlot>> {
        self.slots.iter()
    }

    pub fn get(&self, node_id: usize) -> Option<&Arc<WorkerSlot>> {
        self.slots.get(node_id)
    }

    /// Count of workers currently in `Connecting` or `Streaming`.
    /// Used by tests to verify the fan-out ceiling invariant.
    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.phase(), Phase::Connecting | Phase::Streaming))
            .count()
    }

    pub fn all_terminal(&self) -> bool {
        self.slots.iter().all(|s| s.phase().is_terminal())
    }

    /// Build the status report the signal mediator prints on the
    /// first operator interrupt: every worker's phase and its
    /// remaining seconds until deadline, if any.
    pub fn enumerate(&self, connect_timeout: Duration, command_timeout: Duration) -> Vec<WorkerStatus> {
        let now = Instant::now();
        self.slots
            .iter()
            .map(|slot| {
                let phase = slot.phase();
                let deadline_in = match phase {
                    Phase::Connecting if !connect_timeout.is_zero() => slot
                        .start_time(self.base)
                        .map(|start| deadline_secs(start, connect_timeout, now)),
                    Phase::Streaming if !command_timeout.is_zero() => slot
                        .connect_time(self.base)
                        .map(|connect| deadline_secs(connect, command_timeout, now)),
                    _ => None,
                };
                WorkerStatus {
                    host: slot.host.clone(),
                    phase,
                    deadline_in,
                }
            })
            .collect()
    }
}

fn deadline_secs(from: Instant, timeout: Duration, now: Instant) -> i64 {
    let deadline = from + timeout;
    if deadline > now {
        deadline.duration_since(now).as_secs() as i64
    } else {
        -(now.duration_since(deadline).as_secs() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::RcmdKind;

    fn table_of(hosts: &[&str]) -> WorkerTable {
        let base = Instant::now();
        let slots = hosts
            .iter()
            .enumerate()
            .map(|(i, h)| Arc::new(WorkerSlot::new(*h, i, RcmdKind::Bsd)))
            .collect();
        WorkerTable::new(slots, base)
    }

    #[test]
    fn active_count_reflects_connecting_and_streaming_only() {
        let table = table_of(&["h1", "h2", "h3"]);
        table.get(0).unwrap().advance(Phase::Connecting);
        table.get(1).unwrap().advance(Phase::Connecting);
        table.get(1).unwrap().advance(Phase::Streaming);
        assert_eq!(table.active_count(), 2);
    }

    #[test]
    fn all_terminal_false_until_every_worker_finishes() {
        let table = table_of(&["h1", "h2"]);
        table.get(0).unwrap().advance(Phase::Connecting);
        table.get(0).unwrap().advance(Phase::Failed);
        assert!(!table.all_terminal());
        table.get(1).unwrap().advance(Phase::Connecting);
        table.get(1).unwrap().advance(Phase::Streaming);
        table.get(1).unwrap().advance(Phase::Done);
        assert!(table.all_terminal());
    }

    #[test]
    fn enumerate_reports_phase_per_host() {
        let table = table_of(&["h1", "h2"]);
        table.get(0).unwrap().advance(Phase::Connecting);
        let statuses = table.enumerate(Duration::from_secs(0), Duration::from_secs(0));
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].phase, Phase::Connecting);
        assert_eq!(statuses[1].phase, Phase::New);
    }
}
