//! Structured error types for the kernel.
//!
//! All fallible public APIs return `KernelResult<T>`. Every variant here
//! is a misuse of the kernel or a failure nobody handled; none of them is
//! recoverable by retrying the same call.

use crate::event::EventId;
use crate::payload::Failure;
use crate::process::ProcessId;
use crate::resource::ResourceId;

/// The top-level error type for the simulation kernel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    // ── Event errors ──────────────────────────────────────

    /// The event has already been processed and cannot fire again.
    #[error("event {0} has already been processed")]
    DoubleFire(EventId),

    /// The event already has an outcome and is waiting in the queue.
    #[error("event {0} has already been triggered")]
    AlreadyTriggered(EventId),

    /// The event ID does not belong to this environment.
    #[error("event {0} does not exist")]
    UnknownEvent(EventId),

    /// Timeouts, grants, completions and interruptions are fired by the
    /// kernel only.
    #[error("event {0} is fired by the kernel and cannot be triggered directly")]
    KernelOwned(EventId),

    /// A failed event was processed and nobody was waiting on it.
    #[error("unhandled failure in {event}: {failure}")]
    UnhandledFailure { event: EventId, failure: Failure },

    // ── Process errors ────────────────────────────────────

    /// The process ID does not belong to this environment.
    #[error("process {0} does not exist")]
    UnknownProcess(ProcessId),

    /// The process has already finished or failed.
    #[error("process {0} has terminated")]
    ProcessNotAlive(ProcessId),

    /// A process tried to interrupt itself.
    #[error("process {0} cannot interrupt itself")]
    SelfInterrupt(ProcessId),

    // ── Resource errors ───────────────────────────────────

    /// The resource ID does not belong to this environment.
    #[error("resource {0} does not exist")]
    UnknownResource(ResourceId),

    /// Resources need at least one unit.
    #[error("resource capacity must be positive")]
    InvalidCapacity,

    /// A request was released or cancelled out of protocol.
    #[error("resource {resource}, request {request}: {reason}")]
    ResourceProtocol {
        resource: ResourceId,
        request: EventId,
        reason: ProtocolViolation,
    },

    // ── Clock errors ──────────────────────────────────────

    /// `now + delay` does not fit in the clock.
    #[error("clock overflow scheduling {delay} ticks after T={now}")]
    ClockOverflow { now: u64, delay: u64 },
}

/// Ways a request can be misused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// The request was never made against this resource.
    NotARequest,
    /// Released while still waiting in the queue.
    NotGranted,
    /// Released a second time, or after it was cancelled.
    AlreadyReleased,
    /// Cancelled after it was granted, released or cancelled.
    NotQueued,
}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolViolation::NotARequest => write!(f, "not a request of this resource"),
            ProtocolViolation::NotGranted => write!(f, "released before it was granted"),
            ProtocolViolation::AlreadyReleased => write!(f, "already released or cancelled"),
            ProtocolViolation::NotQueued => write!(f, "cancelled but not queued"),
        }
    }
}

/// Convenience alias for `Result<T, KernelError>`.
pub type KernelResult<T> = Result<T, KernelError>;
