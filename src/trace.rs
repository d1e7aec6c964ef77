//! In-memory trace of processed events.
//!
//! When enabled through `EnvironmentConfig::record_trace`, the
//! environment appends one `TraceEntry` per processed event. Two runs
//! with identical inputs produce identical traces, so comparing
//! `Trace::hash` values is a cheap reproducibility check.

use crate::event::{EventId, EventKind, Priority};
use crate::time::SimTime;

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

/// A record of one processed event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceEntry {
    /// Clock value when the event was processed.
    pub time: SimTime,
    pub event: EventId,
    pub priority: Priority,
    pub kind: EventKind,
    /// `false` if the event carried a failure.
    pub ok: bool,
}

impl TraceEntry {
    fn hash(&self) -> u64 {
        let kind = match self.kind {
            EventKind::Plain => 1,
            EventKind::Timeout => 2,
            EventKind::Request { resource } => hash_combine(3, resource.raw()),
            EventKind::Completion { process } => hash_combine(4, process.raw()),
            EventKind::Interruption { process } => hash_combine(5, process.raw()),
        };
        let mut h = hash_combine(self.time.ticks(), self.event.raw());
        h = hash_combine(h, self.priority.level() as u64);
        h = hash_combine(h, kind);
        hash_combine(h, self.ok as u64)
    }
}

impl std::fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[T={} {} P={}] {}{}",
            self.time.ticks(),
            self.event,
            self.priority.level(),
            self.kind,
            if self.ok { "" } else { " (failed)" },
        )
    }
}

/// Append-only list of processed events.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    /// An empty trace.
    pub fn new() -> Self {
        Trace {
            entries: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    /// All entries in processing order.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deterministic hash of the whole trace.
    pub fn hash(&self) -> u64 {
        self.entries
            .iter()
            .fold(0u64, |h, e| hash_combine(h, e.hash()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(time: u64, event: u64) -> TraceEntry {
        TraceEntry {
            time: SimTime::new(time),
            event: EventId::new(event),
            priority: Priority::NORMAL,
            kind: EventKind::Timeout,
            ok: true,
        }
    }

    #[test]
    fn test_hash_is_order_sensitive() {
        let mut a = Trace::new();
        a.record(entry(1, 0));
        a.record(entry(2, 1));

        let mut b = Trace::new();
        b.record(entry(2, 1));
        b.record(entry(1, 0));

        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.clone().hash());
    }

    #[test]
    fn test_failed_entry_changes_hash() {
        let mut ok = Trace::new();
        ok.record(entry(1, 0));
        let mut failed = Trace::new();
        failed.record(TraceEntry { ok: false, ..entry(1, 0) });
        assert_ne!(ok.hash(), failed.hash());
    }

    #[test]
    fn test_display() {
        let shown = format!("{}", TraceEntry { ok: false, ..entry(7, 3) });
        assert_eq!(shown, "[T=7 E#3 P=1] Timeout (failed)");
    }
}
