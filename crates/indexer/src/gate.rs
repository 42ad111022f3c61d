//! Single-slot commit gate.
//!
//! Block commits are totally ordered by height.  Two commits in flight at
//! once means the pipeline ordering broke; continuing would corrupt the
//! chain tables, so that path panics.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct CommitGate {
    busy: AtomicBool,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the commit slot.  Panics if another commit holds it.
    pub fn acquire(&self) -> CommitPermit<'_> {
        let was_busy = self.busy.swap(true, Ordering::AcqRel);
        if was_busy {
            panic!("indexer: two block commits in flight, refusing to corrupt state");
        }
        CommitPermit { gate: self }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

pub struct CommitPermit<'a> {
    gate: &'a CommitGate,
}

impl Drop for CommitPermit<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_serialization() {
        let gate = CommitGate::new();
        {
            let _permit = gate.acquire();
            assert!(gate.is_busy());
        }
        assert!(!gate.is_busy());
        let _second = gate.acquire();
    }

    #[test]
    #[should_panic(expected = "two block commits in flight")]
    fn test_double_acquire_panics() {
        let gate = CommitGate::new();
        let _first = gate.acquire();
        let _second = gate.acquire();
    }
}
