use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub current: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    /// Completed share in `0.0..=1.0`. An empty cycle counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.current as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Entry counters for one sync cycle.
///
/// Owned by the cycle and shared by `Arc`; readers only ever see snapshots. `total` is
/// fixed by [`SyncProgress::reset`] and `current` only grows until the next reset.
#[derive(Debug, Default)]
pub struct SyncProgress {
    current: AtomicUsize,
    total: AtomicUsize,
}

impl SyncProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self, total: usize) {
        // Zero `current` first so a reader never sees current > total.
        self.current.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }

    /// Count one finished entry and return the new state.
    pub fn advance(&self) -> ProgressSnapshot {
        let total = self.total.load(Ordering::Acquire);
        let prev = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c < total).then_some(c + 1)
            })
            .unwrap_or(total);
        ProgressSnapshot {
            current: (prev + 1).min(total),
            total,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let total = self.total.load(Ordering::Acquire);
        let current = self.current.load(Ordering::Acquire);
        ProgressSnapshot {
            current: current.min(total),
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn advance_never_passes_total() {
        let p = SyncProgress::new();
        p.reset(2);
        assert_eq!(p.advance(), ProgressSnapshot { current: 1, total: 2 });
        assert_eq!(p.advance(), ProgressSnapshot { current: 2, total: 2 });
        assert_eq!(p.advance(), ProgressSnapshot { current: 2, total: 2 });
        assert!(p.snapshot().is_complete());
    }

    #[test]
    fn reset_starts_a_new_cycle() {
        let p = SyncProgress::new();
        p.reset(1);
        p.advance();
        p.reset(5);
        assert_eq!(p.snapshot(), ProgressSnapshot { current: 0, total: 5 });
        assert_eq!(p.snapshot().fraction(), 0.0);
        assert_eq!(ProgressSnapshot::default().fraction(), 1.0);
    }

    #[test]
    fn concurrent_advances_are_all_counted() {
        let p = Arc::new(SyncProgress::new());
        p.reset(400);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = p.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        p.advance();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(p.snapshot(), ProgressSnapshot { current: 400, total: 400 });
    }
}
