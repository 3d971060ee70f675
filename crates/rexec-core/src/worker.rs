use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::phase::{Phase, PhaseCell};

/// Sentinel stored in a timestamp cell before it has been recorded.
const UNSET: u64 = u64::MAX;

/// Which remote-shell mechanism a worker's transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RcmdKind {
    Bsd,
    Kerberos,
    Ssh,
    Interconnect,
}

impl RcmdKind {
    /// Gang transports couple all peers: one worker's failure aborts
    /// the whole job.
    pub fn is_gang(self) -> bool {
        matches!(self, RcmdKind::Interconnect)
    }

    /// Address pre-resolution is skipped for transports whose child
    /// process does its own lookup (the ssh variant).
    pub fn skips_resolution(self) -> bool {
        matches!(self, RcmdKind::Ssh)
    }
}

/// Per-host workload: a shell command or a file push.
#[derive(Debug, Clone)]
pub enum Workload {
    Command {
        cmd: String,
        labels: bool,
        separate_stderr: bool,
    },
    Copy {
        infiles: Vec<std::path::PathBuf>,
        target: String,
        preserve: bool,
        recursive: bool,
    },
}

/// The shared, lock-free slice of a worker's state that the watchdog
/// and the signal mediator read without holding any lock -- the
/// async-native replacement for a global array walked from a signal
/// handler. Single-writer (the worker owning the slot advances
/// `phase` and stamps timestamps); multi-reader (watchdog ticks,
/// signal-mediator enumeration, aggregation after drain).
#[derive(Debug)]
pub struct WorkerSlot {
    pub host: String,
    pub node_id: usize,
    pub rcmd_kind: RcmdKind,
    phase: PhaseCell,
    start_ms: AtomicU64,
    connect_ms: AtomicU64,
    finish_ms: AtomicU64,
    remote_rc: AtomicI64,
}

impl WorkerSlot {
    pub fn new(host: impl Into<String>, node_id: usize, rcmd_kind: RcmdKind) -> Self {
        Self {
            host: host.into(),
            node_id,
            rcmd_kind,
            phase: PhaseCell::new(),
            start_ms: AtomicU64::new(UNSET),
            connect_ms: AtomicU64::new(UNSET),
            finish_ms: AtomicU64::new(UNSET),
            remote_rc: AtomicI64::new(0),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase.load()
    }

    pub fn advance(&self, next: Phase) {
        self.phase.advance(next);
    }

    pub fn remote_rc(&self) -> i32 {
        self.remote_rc.load(Ordering::Acquire) as i32
    }

    /// Overwrite `remote_rc`. Called by the command-stream driver each
    /// time a sentinel is observed; the last one wins.
    pub fn set_remote_rc(&self, rc: i32) {
        self.remote_rc.store(rc as i64, Ordering::Release);
    }

    pub fn mark_start(&self, base: Instant) {
        self.start_ms.store(ms_since(base), Ordering::Release);
    }

    pub fn mark_connect(&self, base: Instant) {
        self.connect_ms.store(ms_since(base), Ordering::Release);
    }

    pub fn mark_finish(&self, base: Instant) {
        self.finish_ms.store(ms_since(base), Ordering::Release);
    }

    pub fn start_time(&self, base: Instant) -> Option<Instant> {
        from_ms(base, self.start_ms.load(Ordering::Acquire))
    }

    pub fn connect_time(&self, base: Instant) -> Option<Instant> {
        from_ms(base, self.connect_ms.load(Ordering::Acquire))
    }

    pub fn finish_time(&self, base: Instant) -> Option<Instant> {
        from_ms(base, self.finish_ms.load(Ordering::Acquire))
    }
}

fn ms_since(base: Instant) -> u64 {
    Instant::now().saturating_duration_since(base).as_millis() as u64
}

fn from_ms(base: Instant, ms: u64) -> Option<Instant> {
    if ms == UNSET {
        None
    } else {
        Some(base + Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_unset_until_marked() {
        let base = Instant::now();
        let slot = WorkerSlot::new("h1", 0, RcmdKind::Bsd);
        assert!(slot.start_time(base).is_none());
        slot.mark_start(base);
        assert!(slot.start_time(base).is_some());
    }

    #[test]
    fn remote_rc_defaults_zero_and_is_overwritable() {
        let slot = WorkerSlot::new("h1", 0, RcmdKind::Bsd);
        assert_eq!(slot.remote_rc(), 0);
        slot.set_remote_rc(7);
        assert_eq!(slot.remote_rc(), 7);
        slot.set_remote_rc(0);
        assert_eq!(slot.remote_rc(), 0);
    }

    #[test]
    fn gang_kind_is_only_interconnect() {
        assert!(RcmdKind::Interconnect.is_gang());
        assert!(!RcmdKind::Bsd.is_gang());
        assert!(!RcmdKind::Ssh.is_gang());
    }
}
