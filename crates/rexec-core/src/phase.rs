use std::sync::atomic::{AtomicU8, Ordering};

/// Coarse state of a worker, as observed by the watchdog, the signal
/// mediator, and the aggregator.
///
/// Monotonic: the only back-edge is `Connecting -> Failed` or
/// `Streaming -> Failed`. `New` is the initial phase; `Done` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    New = 0,
    Connecting = 1,
    Streaming = 2,
    Done = 3,
    Failed = 4,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    fn from_u8(v: u8) -> Phase {
        match v {
            0 => Phase::New,
            1 => Phase::Connecting,
            2 => Phase::Streaming,
            3 => Phase::Done,
            _ => Phase::Failed,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::New => "new",
            Phase::Connecting => "connecting",
            Phase::Streaming => "streaming",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Lock-free cell holding a worker's phase.
///
/// Single-writer (the worker owning the slot), multi-reader (the
/// watchdog and the signal mediator read it for reporting and
/// timeout decisions). Word-sized atomic writes are all that's
/// required since readers never need a value that is consistent with
/// any other field.
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(Phase::New as u8))
    }

    pub fn load(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Advance to `next`. Debug-asserts the transition is legal; in
    /// release builds an illegal transition is still applied (a single
    /// owner writes this cell, so there is nothing to protect against
    /// here beyond catching our own bugs in tests).
    pub fn advance(&self, next: Phase) {
        debug_assert!(
            Self::is_legal(self.load(), next),
            "illegal phase transition {:?} -> {:?}",
            self.load(),
            next
        );
        self.0.store(next as u8, Ordering::Release);
    }

    fn is_legal(from: Phase, to: Phase) -> bool {
        use Phase::*;
        matches!(
            (from, to),
            (New, Connecting)
                | (Connecting, Streaming)
                | (Connecting, Failed)
                | (Streaming, Done)
                | (Streaming, Failed)
                | (New, Failed)
        )
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_initial_and_nonterminal() {
        let cell = PhaseCell::new();
        assert_eq!(cell.load(), Phase::New);
        assert!(!cell.load().is_terminal());
    }

    #[test]
    fn advances_monotonically() {
        let cell = PhaseCell::new();
        cell.advance(Phase::Connecting);
        cell.advance(Phase::Streaming);
        cell.advance(Phase::Done);
        assert_eq!(cell.load(), Phase::Done);
        assert!(cell.load().is_terminal());
    }

    #[test]
    fn back_edge_to_failed_is_legal() {
        let cell = PhaseCell::new();
        cell.advance(Phase::Connecting);
        cell.advance(Phase::Failed);
        assert_eq!(cell.load(), Phase::Failed);
        assert!(cell.load().is_terminal());
    }
}
