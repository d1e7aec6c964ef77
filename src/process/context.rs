//! `Context` — the handle a running process uses to talk to its
//! environment.

use crate::config::TimeoutConfig;
use crate::environment::Environment;
use crate::error::{KernelError, KernelResult};
use crate::event::{EventId, EventState};
use crate::payload::{Failure, Outcome, Value};
use crate::resource::{Resource, ResourceId};
use crate::time::SimTime;

use super::id::ProcessId;
use super::traits::{Process, ProcessHandle, ProcessState};

/// Mutable access to the environment during one process step or hook.
///
/// The context borrows the environment mutably, so a step can schedule
/// and trigger events but cannot drive the loop itself.
///
/// Any kernel error a call returns here is also remembered by the
/// environment and ends the current `run` once the step returns. The
/// caller still gets the `Err` so it can stop what it was doing. The
/// one exception is a refused [`interrupt`](Self::interrupt).
pub struct Context<'a> {
    env: &'a mut Environment,
    active: Option<ProcessId>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(env: &'a mut Environment, active: Option<ProcessId>) -> Self {
        Context { env, active }
    }

    fn guard<T>(&mut self, result: KernelResult<T>) -> KernelResult<T> {
        if let Err(e) = &result {
            self.env.note_fault(e.clone());
        }
        result
    }

    /// Current simulation time.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.env.now()
    }

    /// The process this step belongs to; `None` inside an event hook.
    pub fn active(&self) -> Option<ProcessId> {
        self.active
    }

    // ── Events ────────────────────────────────────────────────

    /// An event that fires `delay` ticks from now.
    pub fn timeout(&mut self, delay: u64) -> KernelResult<EventId> {
        let r = self.env.timeout(delay);
        self.guard(r)
    }

    /// A timeout with an explicit value and priority.
    pub fn timeout_with(&mut self, config: TimeoutConfig) -> KernelResult<EventId> {
        let r = self.env.timeout_with(config);
        self.guard(r)
    }

    /// A bare pending event; fire it with [`succeed`](Self::succeed) or
    /// [`fail`](Self::fail).
    pub fn event(&mut self) -> EventId {
        self.env.event()
    }

    pub fn succeed(&mut self, event: EventId, value: impl Into<Value>) -> KernelResult<()> {
        let r = self.env.succeed(event, value);
        self.guard(r)
    }

    pub fn fail(&mut self, event: EventId, failure: Failure) -> KernelResult<()> {
        let r = self.env.fail(event, failure);
        self.guard(r)
    }

    pub fn event_state(&self, event: EventId) -> KernelResult<EventState> {
        self.env.event_state(event)
    }

    /// Run `hook` when `event` is processed.
    pub fn on_fire<F>(&mut self, event: EventId, hook: F) -> KernelResult<()>
    where
        F: FnOnce(&mut Context<'_>, &Outcome) + 'static,
    {
        let r = self.env.on_fire(event, hook);
        self.guard(r)
    }

    // ── Processes ─────────────────────────────────────────────

    /// Start a child process. It runs up to its first suspension before
    /// this call returns.
    pub fn process<P: Process + 'static>(&mut self, body: P) -> KernelResult<ProcessHandle> {
        let r = self.env.process(body);
        self.guard(r)
    }

    /// Interrupt another process with `cause`.
    ///
    /// `ProcessNotAlive` and `SelfInterrupt` stay with the caller, which
    /// may carry on; any other error ends the run.
    pub fn interrupt(&mut self, target: ProcessId, cause: impl Into<Value>) -> KernelResult<()> {
        let r = self.env.interrupt_from(self.active, target, cause.into());
        match r {
            Err(KernelError::ProcessNotAlive(_)) | Err(KernelError::SelfInterrupt(_)) => r,
            _ => self.guard(r),
        }
    }

    pub fn process_state(&self, pid: ProcessId) -> KernelResult<ProcessState> {
        self.env.process_state(pid)
    }

    pub fn is_alive(&self, pid: ProcessId) -> bool {
        self.env.is_alive(pid)
    }

    // ── Resources ─────────────────────────────────────────────

    /// Create a resource with `capacity` units.
    pub fn resource(&mut self, capacity: usize) -> KernelResult<ResourceId> {
        let r = self.env.resource(capacity);
        self.guard(r)
    }

    /// Ask for one unit. The returned event fires once it is granted.
    ///
    /// The request belongs to the active process: if the process ends
    /// while still holding or waiting, the unit is released or the
    /// request cancelled on its behalf.
    pub fn request(&mut self, resource: ResourceId) -> KernelResult<EventId> {
        let r = self.env.request_for(resource, self.active);
        self.guard(r)
    }

    /// Give back the unit held by `request`.
    pub fn release(&mut self, resource: ResourceId, request: EventId) -> KernelResult<()> {
        let r = self.env.release(resource, request);
        self.guard(r)
    }

    /// Withdraw a request still waiting in the queue.
    pub fn cancel(&mut self, resource: ResourceId, request: EventId) -> KernelResult<()> {
        let r = self.env.cancel(resource, request);
        self.guard(r)
    }

    pub fn inspect_resource(&self, resource: ResourceId) -> KernelResult<&Resource> {
        self.env.inspect_resource(resource)
    }
}
