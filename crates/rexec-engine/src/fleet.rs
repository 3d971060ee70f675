//! The worker table plus the cancellation machinery layered over it:
//! a global abort token (operator double-interrupt, gang-transport
//! failure) whose children are per-worker tokens the watchdog cancels
//! individually on a timeout.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use rexec_core::WorkerTable;
use tokio_util::sync::CancellationToken;

const NO_FD: i32 = -1;

#[derive(Clone)]
pub struct Fleet {
    pub table: WorkerTable,
    abort_token: CancellationToken,
    tokens: Arc<[CancellationToken]>,
    signal_fds: Arc<[AtomicI32]>,
}

impl Fleet {
    pub fn new(table: WorkerTable) -> Self {
        let abort_token = CancellationToken::new();
        let tokens: Vec<CancellationToken> = (0..table.len()).map(|_| abort_token.child_token()).collect();
        let signal_fds: Vec<AtomicI32> = (0..table.len()).map(|_| AtomicI32::new(NO_FD)).collect();
        Self {
            table,
            abort_token,
            tokens: tokens.into(),
            signal_fds: signal_fds.into(),
        }
    }

    pub fn token(&self, node_id: usize) -> &CancellationToken {
        &self.tokens[node_id]
    }

    /// Cancel a single worker (watchdog timeout). Does not affect the
    /// global abort state.
    pub fn cancel_worker(&self, node_id: usize) {
        self.tokens[node_id].cancel();
    }

    /// Cancel every worker at once (operator double-interrupt or
    /// gang-transport failure).
    pub fn abort_all(&self) {
        self.abort_token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_token.is_cancelled()
    }

    pub fn abort_token(&self) -> &CancellationToken {
        &self.abort_token
    }

    pub fn set_signal_fd(&self, node_id: usize, fd: RawFd) {
        self.signal_fds[node_id].store(fd, Ordering::Release);
    }

    pub fn signal_fd(&self, node_id: usize) -> Option<RawFd> {
        match self.signal_fds[node_id].load(Ordering::Acquire) {
            NO_FD => None,
            fd => Some(fd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexec_core::{RcmdKind, WorkerSlot};
    use std::time::Instant;

    fn fleet_of(n: usize) -> Fleet {
        let slots = (0..n)
            .map(|i| Arc::new(WorkerSlot::new(format!("h{i}"), i, RcmdKind::Bsd)))
            .collect();
        Fleet::new(WorkerTable::new(slots, Instant::now()))
    }

    #[test]
    fn cancelling_one_worker_does_not_abort_others() {
        let fleet = fleet_of(2);
        fleet.cancel_worker(0);
        assert!(fleet.token(0).is_cancelled());
        assert!(!fleet.token(1).is_cancelled());
        assert!(!fleet.is_aborted());
    }

    #[test]
    fn abort_all_cancels_every_child_token() {
        let fleet = fleet_of(3);
        fleet.abort_all();
        assert!(fleet.is_aborted());
        for i in 0..3 {
            assert!(fleet.token(i).is_cancelled());
        }
    }
}
