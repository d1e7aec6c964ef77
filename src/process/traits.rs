//! The `Process` trait and the values exchanged at each suspension point.

use crate::error::KernelResult;
use crate::event::EventId;
use crate::payload::{Failure, Outcome, Value};

use super::context::Context;
use super::id::ProcessId;

// ── Resume / Step ─────────────────────────────────────────────────────

/// Why a process is being resumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resume {
    /// First entry, right after the process was created.
    Start,
    /// The awaited event succeeded with this value.
    Value(Value),
    /// The awaited event failed.
    Failed(Failure),
    /// Another party interrupted the wait. The awaited event no longer
    /// resumes this process.
    Interrupted(Value),
}

impl Resume {
    /// The delivered value, if the wait succeeded.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Resume::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Outcome> for Resume {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Ok(v) => Resume::Value(v),
            Err(f) => Resume::Failed(f),
        }
    }
}

/// What a process does at the end of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Suspend until the event is processed.
    Wait(EventId),
    /// Finish; the completion event succeeds with this value.
    Done(Value),
    /// Fail; the completion event fails and waiters see the failure.
    Fail(Failure),
}

impl Step {
    /// Wait on the event a kernel call produced, or fail if the call
    /// was refused.
    ///
    /// `ctx.timeout(5)` returns a `KernelResult<EventId>`; this turns it
    /// straight into the step.
    pub fn wait(event: KernelResult<EventId>) -> Step {
        match event {
            Ok(id) => Step::Wait(id),
            Err(e) => Step::Fail(Failure::new(e.to_string())),
        }
    }

    /// Finish with no value.
    pub fn done() -> Step {
        Step::Done(Value::None)
    }
}

// ── Process ───────────────────────────────────────────────────────────

/// A suspendable unit of simulated behavior.
///
/// A process is an explicit state machine. The environment calls
/// `resume` once with [`Resume::Start`] when the process is created, and
/// again every time the event returned in [`Step::Wait`] is processed.
/// Between two calls nothing else touches the process, so `resume` can
/// freely mutate `self`.
///
/// # Contract
///
/// Implementations **must**:
/// - Route every side effect on the simulation through `ctx`.
/// - Be deterministic for equal inputs.
///
/// # Example
///
/// ```rust
/// use eos::{Context, Environment, Process, Resume, Step, Until};
///
/// /// Charges for 5 ticks, drives for 2, forever.
/// struct Car {
///     charging: bool,
/// }
///
/// impl Process for Car {
///     fn resume(&mut self, ctx: &mut Context<'_>, _resume: Resume) -> Step {
///         self.charging = !self.charging;
///         let delay = if self.charging { 5 } else { 2 };
///         Step::wait(ctx.timeout(delay))
///     }
/// }
///
/// let mut env = Environment::new();
/// env.process(Car { charging: false }).unwrap();
/// env.run(Until::at(15)).unwrap();
/// assert_eq!(env.now().ticks(), 15);
/// ```
pub trait Process {
    /// Run until the next suspension point.
    fn resume(&mut self, ctx: &mut Context<'_>, resume: Resume) -> Step;

    /// Name used in logs.
    fn name(&self) -> &str {
        "process"
    }
}

/// Closures are processes; handy for tests and small scenarios.
impl<F> Process for F
where
    F: FnMut(&mut Context<'_>, Resume) -> Step,
{
    fn resume(&mut self, ctx: &mut Context<'_>, resume: Resume) -> Step {
        (self)(ctx, resume)
    }
}

/// Attach a name to any process.
pub struct Named<P> {
    name: String,
    inner: P,
}

impl<P: Process> Named<P> {
    pub fn new(name: impl Into<String>, inner: P) -> Self {
        Named {
            name: name.into(),
            inner,
        }
    }
}

impl<P: Process> Process for Named<P> {
    fn resume(&mut self, ctx: &mut Context<'_>, resume: Resume) -> Step {
        self.inner.resume(ctx, resume)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ── State & handle ────────────────────────────────────────────────────

/// Where a process is in its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// Inside `resume` right now.
    Running,
    /// Waiting for an event.
    Suspended { on: EventId },
    /// Returned [`Step::Done`].
    Finished,
    /// Returned [`Step::Fail`].
    Failed(Failure),
}

impl ProcessState {
    /// `true` until the process finishes or fails.
    pub fn is_alive(&self) -> bool {
        matches!(self, ProcessState::Running | ProcessState::Suspended { .. })
    }
}

/// Returned when a process is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    id: ProcessId,
    completion: EventId,
}

impl ProcessHandle {
    pub(crate) fn new(id: ProcessId, completion: EventId) -> Self {
        ProcessHandle { id, completion }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Fires when the process finishes (with its return value) or fails
    /// (with its failure). Wait on it to wait for the process.
    pub fn completion_event(&self) -> EventId {
        self.completion
    }
}
