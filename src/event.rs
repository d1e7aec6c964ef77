//! Event records for the simulation kernel.
//!
//! Every suspension point in a process is an event: a timeout, a
//! resource grant, another process's completion, an interruption, or a
//! bare event triggered by user code. Events live in the environment's
//! event table and are addressed by `EventId`.

use crate::payload::Outcome;
use crate::process::{Context, ProcessId};
use crate::resource::ResourceId;

// ── Event ID ──────────────────────────────────────────────────────────

/// A unique, strictly-increasing event identifier.
///
/// IDs are minted in creation order and key the environment's event
/// table, so an `EventId` from one environment is meaningless in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId(u64);

impl EventId {
    /// Wrap a raw u64 into an `EventId`.
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    /// Return the raw value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Deterministic, strictly-increasing event-ID generator.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    /// Create a generator starting at 0.
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next ID without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Priority ──────────────────────────────────────────────────────────

/// Tie-break between events scheduled at the same time. Lower fires
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Priority(u8);

impl Priority {
    /// Interruptions.
    pub const URGENT: Priority = Priority(0);
    /// Everything else.
    pub const NORMAL: Priority = Priority(1);

    /// A custom priority level.
    pub fn new(level: u8) -> Self {
        Priority(level)
    }

    /// The raw level.
    pub fn level(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

// ── Event state & kind ────────────────────────────────────────────────

/// Lifecycle of an event. Each event moves forward through these states
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum EventState {
    /// Created, no outcome yet.
    Pending,
    /// Outcome decided and queued; callbacks not yet run.
    Triggered,
    /// Popped from the queue and callbacks invoked.
    Processed,
}

/// What an event stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// A bare event triggered by user code.
    Plain,
    /// Fires a fixed delay after creation.
    Timeout,
    /// Fires when a resource unit is granted to this request.
    Request { resource: ResourceId },
    /// Fires when a process finishes or fails.
    Completion { process: ProcessId },
    /// Delivers an interrupt to a process.
    Interruption { process: ProcessId },
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Plain => write!(f, "Event"),
            EventKind::Timeout => write!(f, "Timeout"),
            EventKind::Request { resource } => write!(f, "Request({})", resource),
            EventKind::Completion { process } => write!(f, "Completion({})", process),
            EventKind::Interruption { process } => write!(f, "Interruption({})", process),
        }
    }
}

// ── Callbacks ─────────────────────────────────────────────────────────

/// A user continuation attached with `on_fire`.
pub type Hook = Box<dyn FnOnce(&mut Context<'_>, &Outcome)>;

/// A continuation invoked when an event is processed.
pub(crate) enum Callback {
    /// Resume a suspended process with the event's outcome.
    Resume(ProcessId),
    /// Deliver the event's value to a process as an interrupt.
    Interrupt(ProcessId),
    /// Run a user hook.
    Hook(Hook),
}

impl Callback {
    pub(crate) fn resumes(&self, pid: ProcessId) -> bool {
        matches!(self, Callback::Resume(p) if *p == pid)
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callback::Resume(pid) => write!(f, "Resume({})", pid),
            Callback::Interrupt(pid) => write!(f, "Interrupt({})", pid),
            Callback::Hook(_) => write!(f, "Hook"),
        }
    }
}

// ── Event record ──────────────────────────────────────────────────────

/// Event table entry.
#[derive(Debug)]
pub(crate) struct EventRecord {
    pub kind: EventKind,
    pub state: EventState,
    pub outcome: Option<Outcome>,
    pub callbacks: Vec<Callback>,
}

impl EventRecord {
    pub(crate) fn new(kind: EventKind) -> Self {
        EventRecord {
            kind,
            state: EventState::Pending,
            outcome: None,
            callbacks: Vec::new(),
        }
    }
}
