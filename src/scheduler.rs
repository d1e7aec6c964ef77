/// Deterministic event queue.
///
/// A `BinaryHeap` with reversed `Ord` on `Scheduled` acts as a min-heap
/// keyed by `(at, priority, seq)`. `seq` counts insertions, so two
/// entries with equal time and priority come out in the order they were
/// scheduled, and two runs with the same inputs pop in the same order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::event::{EventId, Priority};
use crate::time::SimTime;

// ── Scheduled ─────────────────────────────────────────────────────────

/// A queue entry: which event fires, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    /// Time at which the event fires.
    pub at: SimTime,
    /// Same-time tie-break; lower first.
    pub priority: Priority,
    /// Insertion counter; final tie-break.
    pub seq: u64,
    /// The event to fire.
    pub event: EventId,
}

impl Scheduled {
    /// The full ordering key.
    pub fn key(&self) -> (SimTime, Priority, u64) {
        (self.at, self.priority, self.seq)
    }
}

/// Ordering: smallest `(at, priority, seq)` first.
///
/// `BinaryHeap` is a max-heap, so the natural ordering is reversed.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────

/// The event queue owned by an `Environment`.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl Scheduler {
    /// Create a new, empty scheduler.
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Queue `event` to fire at `at`. O(log n).
    pub fn schedule(&mut self, at: SimTime, priority: Priority, event: EventId) -> Scheduled {
        let entry = Scheduled {
            at,
            priority,
            seq: self.next_seq,
            event,
        };
        self.next_seq += 1;
        self.queue.push(entry);
        entry
    }

    /// Pop the entry with the smallest `(at, priority, seq)`.
    pub fn pop_next(&mut self) -> Option<Scheduled> {
        self.queue.pop()
    }

    /// Peek at the next entry without removing it.
    pub fn peek_next(&self) -> Option<&Scheduled> {
        self.queue.peek()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drain all entries in firing order.
    pub fn drain_ordered(&mut self) -> Vec<Scheduled> {
        let mut entries = Vec::with_capacity(self.queue.len());
        while let Some(e) = self.queue.pop() {
            entries.push(e);
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ev(n: u64) -> EventId {
        EventId::new(n)
    }

    #[test]
    fn test_fifo_at_same_time() {
        let mut sched = Scheduler::new();
        sched.schedule(SimTime::new(10), Priority::NORMAL, ev(7));
        sched.schedule(SimTime::new(10), Priority::NORMAL, ev(3));
        sched.schedule(SimTime::new(10), Priority::NORMAL, ev(5));

        let order: Vec<u64> = sched.drain_ordered().iter().map(|s| s.event.raw()).collect();
        // Insertion order, not event-ID order.
        assert_eq!(order, vec![7, 3, 5]);
    }

    #[test]
    fn test_priority_beats_insertion_order() {
        let mut sched = Scheduler::new();
        sched.schedule(SimTime::new(4), Priority::NORMAL, ev(0));
        sched.schedule(SimTime::new(4), Priority::URGENT, ev(1));

        assert_eq!(sched.pop_next().unwrap().event, ev(1));
        assert_eq!(sched.pop_next().unwrap().event, ev(0));
    }

    #[test]
    fn test_time_ordering() {
        let mut sched = Scheduler::new();
        sched.schedule(SimTime::new(30), Priority::URGENT, ev(0));
        sched.schedule(SimTime::new(10), Priority::NORMAL, ev(1));
        sched.schedule(SimTime::new(20), Priority::NORMAL, ev(2));

        let times: Vec<u64> = sched.drain_ordered().iter().map(|s| s.at.ticks()).collect();
        assert_eq!(times, vec![10, 20, 30]);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut sched = Scheduler::new();
        sched.schedule(SimTime::new(2), Priority::NORMAL, ev(9));
        assert_eq!(sched.peek_next().map(|s| s.event), Some(ev(9)));
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn test_empty_scheduler() {
        let mut sched = Scheduler::new();
        assert!(sched.is_empty());
        assert_eq!(sched.len(), 0);
        assert!(sched.pop_next().is_none());
        assert!(sched.peek_next().is_none());
    }

    #[test]
    fn test_determinism_across_runs() {
        fn build() -> Vec<Scheduled> {
            let mut sched = Scheduler::new();
            sched.schedule(SimTime::new(5), Priority::NORMAL, ev(0));
            sched.schedule(SimTime::new(3), Priority::NORMAL, ev(1));
            sched.schedule(SimTime::new(5), Priority::URGENT, ev(2));
            sched.schedule(SimTime::new(1), Priority::NORMAL, ev(3));
            sched.schedule(SimTime::new(3), Priority::NORMAL, ev(4));
            sched.drain_ordered()
        }
        assert_eq!(build(), build());
    }

    proptest! {
        #[test]
        fn prop_pops_in_nondecreasing_key_order(
            entries in prop::collection::vec((0u64..50, 0u8..3), 0..200)
        ) {
            let mut sched = Scheduler::new();
            for (i, (t, p)) in entries.iter().enumerate() {
                sched.schedule(SimTime::new(*t), Priority::new(*p), ev(i as u64));
            }
            let drained = sched.drain_ordered();
            prop_assert_eq!(drained.len(), entries.len());
            for w in drained.windows(2) {
                prop_assert!(w[0].key() < w[1].key());
            }
        }
    }
}
