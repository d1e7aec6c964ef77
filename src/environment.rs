//! The simulation environment: logical clock, event queue, and the loop
//! that drives processes.
//!
//! The environment pops the earliest event, jumps the clock to its time,
//! and runs its callbacks: resuming the processes waiting on it,
//! delivering interrupts, or invoking user hooks. Callbacks may schedule
//! more events. Nothing runs concurrently.
//!
//! Processed events whose outcome is a bare success are retired: their
//! record is dropped and the id reads back as processed with no value.
//! Records are kept only while they hold something a caller can still
//! read (a pending or queued outcome, a value, a failure). A process
//! slot is dropped once its completion event has been processed; its
//! final state is read back from that event.

use std::collections::BTreeMap;

use crate::config::{EnvironmentConfig, ResourceConfig, TimeoutConfig};
use crate::error::{KernelError, KernelResult, ProtocolViolation};
use crate::event::{Callback, EventId, EventIdGen, EventKind, EventRecord, EventState, Priority};
use crate::payload::{Failure, Outcome, Value};
use crate::process::{Context, Process, ProcessHandle, ProcessId, ProcessState, Resume, Step};
use crate::resource::{RequestState, Resource, ResourceId};
use crate::scheduler::Scheduler;
use crate::time::SimTime;
use crate::trace::{Trace, TraceEntry};

/// Outcome reported for retired events.
static RETIRED: Outcome = Ok(Value::None);

// ── Until / StopReason ────────────────────────────────────────────────

/// When [`Environment::run`] should stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Until {
    /// Run until the queue is empty.
    #[default]
    Forever,
    /// Stop before processing any event at or after this time. The clock
    /// is left at exactly this time.
    Time(SimTime),
    /// Stop right after this event is processed.
    Event(EventId),
}

impl Until {
    /// Shorthand for `Until::Time(SimTime::new(ticks))`.
    pub fn at(ticks: u64) -> Self {
        Until::Time(SimTime::new(ticks))
    }
}

impl From<SimTime> for Until {
    fn from(t: SimTime) -> Self {
        Until::Time(t)
    }
}

impl From<EventId> for Until {
    fn from(ev: EventId) -> Self {
        Until::Event(ev)
    }
}

/// Why [`Environment::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The queue drained. `stalled` lists processes still suspended on
    /// events nothing will fire; a non-empty list is a deadlock.
    Exhausted { stalled: Vec<ProcessId> },
    /// The time bound was reached.
    ReachedTime(SimTime),
    /// The `until` event fired with this value.
    EventFired(Value),
}

impl StopReason {
    /// `true` if the queue drained with processes still waiting.
    pub fn is_deadlock(&self) -> bool {
        matches!(self, StopReason::Exhausted { stalled } if !stalled.is_empty())
    }
}

// ── Process slot ──────────────────────────────────────────────────────

struct ProcessSlot {
    name: String,
    /// Taken out while the process is running.
    body: Option<Box<dyn Process>>,
    state: ProcessState,
    completion: EventId,
    /// Requests made by this process and not yet released or cancelled.
    held: Vec<(ResourceId, EventId)>,
}

impl std::fmt::Debug for ProcessSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSlot")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("completion", &self.completion)
            .field("held", &self.held)
            .finish()
    }
}

// ── Environment ───────────────────────────────────────────────────────

/// Owns the clock, the event queue, every event, process and resource.
///
/// Build one per simulation and hand it to the code that sets up the
/// scenario; there is no global state.
#[derive(Debug)]
pub struct Environment {
    now: SimTime,
    scheduler: Scheduler,
    id_gen: EventIdGen,
    events: BTreeMap<EventId, EventRecord>,
    processes: BTreeMap<ProcessId, ProcessSlot>,
    /// Indexed by `ResourceId`.
    resources: Vec<Resource>,
    request_owners: BTreeMap<EventId, ProcessId>,
    events_processed: u64,
    active: Option<ProcessId>,
    /// First kernel error raised inside the current step.
    fault: Option<KernelError>,
    trace: Option<Trace>,
}

impl Environment {
    /// An environment with the clock at zero.
    pub fn new() -> Self {
        Self::with_config(EnvironmentConfig::default())
    }

    pub fn with_config(config: EnvironmentConfig) -> Self {
        Environment {
            now: config.initial_time,
            scheduler: Scheduler::new(),
            id_gen: EventIdGen::new(),
            events: BTreeMap::new(),
            processes: BTreeMap::new(),
            resources: Vec::new(),
            request_owners: BTreeMap::new(),
            events_processed: 0,
            active: None,
            fault: None,
            trace: config.record_trace.then(Trace::new),
        }
    }

    // ── Clock & statistics ────────────────────────────────────

    /// Current simulation time.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Time of the next queued event.
    pub fn peek(&self) -> Option<SimTime> {
        self.scheduler.peek_next().map(|s| s.at)
    }

    /// Total events processed so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Number of queued events.
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Returns `true` if there are no more events to process.
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_empty()
    }

    /// The process whose step is running, if any.
    pub fn active_process(&self) -> Option<ProcessId> {
        self.active
    }

    /// Event records currently held. Retired events are not counted.
    pub fn retained_events(&self) -> usize {
        self.events.len()
    }

    /// Processes whose completion event has not been processed yet.
    pub fn retained_processes(&self) -> usize {
        self.processes.len()
    }

    /// The recorded trace, if enabled in the config.
    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    // ── Events ────────────────────────────────────────────────

    fn new_event(&mut self, kind: EventKind) -> EventId {
        let id = self.id_gen.next_id();
        self.events.insert(id, EventRecord::new(kind));
        id
    }

    /// Minted by this environment, processed, and its record dropped.
    fn is_retired(&self, event: EventId) -> bool {
        event < self.id_gen.peek() && !self.events.contains_key(&event)
    }

    fn record_mut(&mut self, event: EventId) -> KernelResult<&mut EventRecord> {
        self.events
            .get_mut(&event)
            .ok_or(KernelError::UnknownEvent(event))
    }

    /// Give `event` its outcome and queue it. The caller has checked it
    /// is still pending.
    fn enqueue(
        &mut self,
        event: EventId,
        at: SimTime,
        priority: Priority,
        outcome: Outcome,
    ) -> KernelResult<()> {
        let rec = self.record_mut(event)?;
        rec.outcome = Some(outcome);
        rec.state = EventState::Triggered;
        self.scheduler.schedule(at, priority, event);
        Ok(())
    }

    /// Trigger any pending event at the current time.
    fn trigger(&mut self, event: EventId, outcome: Outcome) -> KernelResult<()> {
        match self.event_state(event)? {
            EventState::Pending => {}
            EventState::Triggered => return Err(KernelError::AlreadyTriggered(event)),
            EventState::Processed => return Err(KernelError::DoubleFire(event)),
        }
        self.enqueue(event, self.now, Priority::NORMAL, outcome)
    }

    /// Trigger a user event; kernel-owned events are refused.
    fn trigger_plain(&mut self, event: EventId, outcome: Outcome) -> KernelResult<()> {
        if let Some(rec) = self.events.get(&event) {
            if rec.kind != EventKind::Plain && rec.state == EventState::Pending {
                return Err(KernelError::KernelOwned(event));
            }
        }
        self.trigger(event, outcome)
    }

    /// An event that fires `delay` ticks from now with no value.
    pub fn timeout(&mut self, delay: u64) -> KernelResult<EventId> {
        self.timeout_with(TimeoutConfig::after(delay))
    }

    /// A timeout with an explicit value and priority.
    pub fn timeout_with(&mut self, config: TimeoutConfig) -> KernelResult<EventId> {
        let at = self.now.plus(config.delay).ok_or(KernelError::ClockOverflow {
            now: self.now.ticks(),
            delay: config.delay,
        })?;
        let event = self.new_event(EventKind::Timeout);
        self.enqueue(event, at, config.priority, Ok(config.value))?;
        Ok(event)
    }

    /// A bare pending event. Nothing fires it until
    /// [`succeed`](Self::succeed) or [`fail`](Self::fail) is called.
    pub fn event(&mut self) -> EventId {
        self.new_event(EventKind::Plain)
    }

    /// Trigger `event` with `value`; its callbacks run at the next step.
    pub fn succeed(&mut self, event: EventId, value: impl Into<Value>) -> KernelResult<()> {
        self.trigger_plain(event, Ok(value.into()))
    }

    /// Trigger `event` with a failure.
    pub fn fail(&mut self, event: EventId, failure: Failure) -> KernelResult<()> {
        self.trigger_plain(event, Err(failure))
    }

    pub fn event_state(&self, event: EventId) -> KernelResult<EventState> {
        match self.events.get(&event) {
            Some(rec) => Ok(rec.state),
            None if self.is_retired(event) => Ok(EventState::Processed),
            None => Err(KernelError::UnknownEvent(event)),
        }
    }

    /// `None` once the event has been retired.
    pub fn event_kind(&self, event: EventId) -> KernelResult<Option<EventKind>> {
        match self.events.get(&event) {
            Some(rec) => Ok(Some(rec.kind)),
            None if self.is_retired(event) => Ok(None),
            None => Err(KernelError::UnknownEvent(event)),
        }
    }

    /// The outcome, once the event has been triggered.
    pub fn event_outcome(&self, event: EventId) -> KernelResult<Option<&Outcome>> {
        match self.events.get(&event) {
            Some(rec) => Ok(rec.outcome.as_ref()),
            None if self.is_retired(event) => Ok(Some(&RETIRED)),
            None => Err(KernelError::UnknownEvent(event)),
        }
    }

    /// The delivered value, once the event has succeeded.
    pub fn event_value(&self, event: EventId) -> KernelResult<Option<&Value>> {
        Ok(self.event_outcome(event)?.and_then(|o| o.as_ref().ok()))
    }

    /// Run `hook` when `event` is processed, after any callbacks already
    /// attached.
    pub fn on_fire<F>(&mut self, event: EventId, hook: F) -> KernelResult<()>
    where
        F: FnOnce(&mut Context<'_>, &Outcome) + 'static,
    {
        if self.is_retired(event) {
            return Err(KernelError::DoubleFire(event));
        }
        let rec = self.record_mut(event)?;
        if rec.state == EventState::Processed {
            return Err(KernelError::DoubleFire(event));
        }
        rec.callbacks.push(Callback::Hook(Box::new(hook)));
        Ok(())
    }

    pub(crate) fn note_fault(&mut self, error: KernelError) {
        if self.fault.is_none() {
            self.fault = Some(error);
        }
    }

    fn take_fault(&mut self) -> KernelResult<()> {
        match self.fault.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ── Processes ─────────────────────────────────────────────

    /// Register `body` as a process and run it up to its first
    /// suspension.
    pub fn process<P: Process + 'static>(&mut self, body: P) -> KernelResult<ProcessHandle> {
        // A process is numbered after its completion event.
        let pid = ProcessId::new(self.id_gen.peek().raw());
        let completion = self.new_event(EventKind::Completion { process: pid });
        let name = body.name().to_string();
        tracing::debug!(process = %pid, name = %name, time = %self.now, "process started");
        self.processes.insert(
            pid,
            ProcessSlot {
                name,
                body: Some(Box::new(body)),
                state: ProcessState::Running,
                completion,
                held: Vec::new(),
            },
        );
        self.resume_process(pid, Resume::Start)?;
        Ok(ProcessHandle::new(pid, completion))
    }

    /// Final state of a process whose slot has been dropped, read back
    /// from its completion event.
    fn retired_process(&self, pid: ProcessId) -> KernelResult<ProcessState> {
        let completion = EventId::new(pid.raw());
        match self.events.get(&completion) {
            Some(rec)
                if rec.kind == EventKind::Completion { process: pid }
                    && rec.state == EventState::Processed =>
            {
                match &rec.outcome {
                    Some(Err(f)) => Ok(ProcessState::Failed(f.clone())),
                    _ => Ok(ProcessState::Finished),
                }
            }
            None if self.is_retired(completion) => Ok(ProcessState::Finished),
            _ => Err(KernelError::UnknownProcess(pid)),
        }
    }

    pub fn process_state(&self, pid: ProcessId) -> KernelResult<ProcessState> {
        match self.processes.get(&pid) {
            Some(slot) => Ok(slot.state.clone()),
            None => self.retired_process(pid),
        }
    }

    /// The name is dropped together with the process slot.
    pub fn process_name(&self, pid: ProcessId) -> KernelResult<&str> {
        match self.processes.get(&pid) {
            Some(slot) => Ok(&slot.name),
            None => {
                self.retired_process(pid)?;
                Err(KernelError::ProcessNotAlive(pid))
            }
        }
    }

    /// Event that fires when `pid` finishes or fails.
    pub fn completion_event(&self, pid: ProcessId) -> KernelResult<EventId> {
        match self.processes.get(&pid) {
            Some(slot) => Ok(slot.completion),
            None => {
                self.retired_process(pid)?;
                Ok(EventId::new(pid.raw()))
            }
        }
    }

    /// Requests owned by `pid` and not yet released or cancelled.
    pub fn held_requests(&self, pid: ProcessId) -> KernelResult<&[(ResourceId, EventId)]> {
        match self.processes.get(&pid) {
            Some(slot) => Ok(&slot.held),
            None => {
                self.retired_process(pid)?;
                Ok(&[])
            }
        }
    }

    /// `false` for unknown and terminated processes.
    pub fn is_alive(&self, pid: ProcessId) -> bool {
        self.processes
            .get(&pid)
            .map(|s| s.state.is_alive())
            .unwrap_or(false)
    }

    /// Processes currently suspended, in creation order.
    pub fn suspended(&self) -> Vec<ProcessId> {
        self.processes
            .iter()
            .filter(|(_, s)| matches!(s.state, ProcessState::Suspended { .. }))
            .map(|(pid, _)| *pid)
            .collect()
    }

    /// Interrupt `target` with `cause`.
    ///
    /// The interrupt is delivered at the current time ahead of normal
    /// events. If `target` terminates before then, it is dropped.
    pub fn interrupt(&mut self, target: ProcessId, cause: impl Into<Value>) -> KernelResult<()> {
        self.interrupt_from(self.active, target, cause.into())
    }

    pub(crate) fn interrupt_from(
        &mut self,
        by: Option<ProcessId>,
        target: ProcessId,
        cause: Value,
    ) -> KernelResult<()> {
        if !self.process_state(target)?.is_alive() {
            return Err(KernelError::ProcessNotAlive(target));
        }
        if by == Some(target) {
            return Err(KernelError::SelfInterrupt(target));
        }
        let event = self.new_event(EventKind::Interruption { process: target });
        self.record_mut(event)?
            .callbacks
            .push(Callback::Interrupt(target));
        self.enqueue(event, self.now, Priority::URGENT, Ok(cause))?;
        tracing::debug!(process = %target, event = %event, time = %self.now, "interrupt scheduled");
        Ok(())
    }

    fn resume_process(&mut self, pid: ProcessId, resume: Resume) -> KernelResult<()> {
        let slot = self
            .processes
            .get_mut(&pid)
            .ok_or(KernelError::UnknownProcess(pid))?;
        let Some(mut body) = slot.body.take() else {
            return Ok(());
        };
        slot.state = ProcessState::Running;

        let previous = self.active.replace(pid);
        let result = self.drive(pid, body.as_mut(), resume);
        self.active = previous;

        if let Some(slot) = self.processes.get_mut(&pid) {
            if slot.state.is_alive() {
                slot.body = Some(body);
            }
        }
        result
    }

    /// Step `body` until it suspends on a pending event or terminates.
    fn drive(&mut self, pid: ProcessId, body: &mut dyn Process, resume: Resume) -> KernelResult<()> {
        let mut resume = resume;
        loop {
            let step = {
                let mut ctx = Context::new(self, Some(pid));
                body.resume(&mut ctx, resume)
            };
            self.take_fault()?;

            match step {
                Step::Wait(event) => {
                    if self.event_state(event)? == EventState::Processed {
                        // Already fired: resume straight away with its outcome.
                        let outcome = self.event_outcome(event)?.cloned();
                        resume = Resume::from(outcome.unwrap_or(Ok(Value::None)));
                        continue;
                    }
                    self.record_mut(event)?.callbacks.push(Callback::Resume(pid));
                    if let Some(slot) = self.processes.get_mut(&pid) {
                        slot.state = ProcessState::Suspended { on: event };
                    }
                    tracing::trace!(process = %pid, event = %event, "process suspended");
                    return Ok(());
                }
                Step::Done(value) => return self.terminate(pid, Ok(value)),
                Step::Fail(failure) => return self.terminate(pid, Err(failure.with_origin(pid))),
            }
        }
    }

    fn terminate(&mut self, pid: ProcessId, outcome: Outcome) -> KernelResult<()> {
        let slot = self
            .processes
            .get_mut(&pid)
            .ok_or(KernelError::UnknownProcess(pid))?;
        slot.state = match &outcome {
            Ok(_) => ProcessState::Finished,
            Err(f) => ProcessState::Failed(f.clone()),
        };
        let completion = slot.completion;
        let held = std::mem::take(&mut slot.held);

        for (resource, request) in held {
            self.request_owners.remove(&request);
            match self.inspect_resource(resource)?.state_of(request) {
                Some(RequestState::Granted) => self.release_unit(resource, request)?,
                Some(RequestState::Queued) => self.withdraw(resource, request)?,
                _ => {}
            }
        }

        match &outcome {
            Ok(_) => tracing::debug!(process = %pid, time = %self.now, "process finished"),
            Err(f) => tracing::debug!(process = %pid, time = %self.now, error = %f, "process failed"),
        }
        self.trigger(completion, outcome)
    }

    fn deliver_interrupt(&mut self, pid: ProcessId, cause: Value) -> KernelResult<()> {
        let on = match self.processes.get(&pid).map(|slot| &slot.state) {
            Some(ProcessState::Suspended { on }) => *on,
            _ => {
                tracing::debug!(process = %pid, "interrupt dropped, process not suspended");
                return Ok(());
            }
        };
        if let Some(rec) = self.events.get_mut(&on) {
            rec.callbacks.retain(|cb| !cb.resumes(pid));
        }
        tracing::debug!(process = %pid, event = %on, time = %self.now, "process interrupted");
        self.resume_process(pid, Resume::Interrupted(cause))
    }

    // ── Resources ─────────────────────────────────────────────

    /// Create a resource with `capacity` units.
    pub fn resource(&mut self, capacity: usize) -> KernelResult<ResourceId> {
        self.resource_with(ResourceConfig::with_capacity(capacity))
    }

    pub fn resource_with(&mut self, config: ResourceConfig) -> KernelResult<ResourceId> {
        let id = ResourceId::new(self.resources.len() as u64);
        self.resources.push(Resource::new(id, config.capacity)?);
        tracing::debug!(resource = %id, capacity = config.capacity, "resource created");
        Ok(id)
    }

    pub fn inspect_resource(&self, resource: ResourceId) -> KernelResult<&Resource> {
        self.resources
            .get(resource.index())
            .ok_or(KernelError::UnknownResource(resource))
    }

    fn resource_mut(&mut self, resource: ResourceId) -> KernelResult<&mut Resource> {
        self.resources
            .get_mut(resource.index())
            .ok_or(KernelError::UnknownResource(resource))
    }

    /// Ask for one unit of `resource`.
    ///
    /// The returned event fires once the unit is granted: at the current
    /// time if one is free, otherwise when every earlier request has been
    /// served. Requests made here have no owning process; the caller must
    /// release them.
    pub fn request(&mut self, resource: ResourceId) -> KernelResult<EventId> {
        self.request_for(resource, None)
    }

    pub(crate) fn request_for(
        &mut self,
        resource: ResourceId,
        owner: Option<ProcessId>,
    ) -> KernelResult<EventId> {
        self.inspect_resource(resource)?;
        let request = self.new_event(EventKind::Request { resource });
        let granted = self.resource_mut(resource)?.request(request);

        if let Some(pid) = owner {
            if let Some(slot) = self.processes.get_mut(&pid) {
                slot.held.push((resource, request));
                self.request_owners.insert(request, pid);
            }
        }

        if granted {
            tracing::debug!(resource = %resource, request = %request, time = %self.now, "request granted");
            self.trigger(request, Ok(Value::None))?;
        } else {
            tracing::debug!(resource = %resource, request = %request, time = %self.now, "request queued");
        }
        Ok(request)
    }

    /// Give back the unit held by `request` and grant the next waiter.
    pub fn release(&mut self, resource: ResourceId, request: EventId) -> KernelResult<()> {
        self.release_unit(resource, request)?;
        self.disown(request);
        Ok(())
    }

    /// Withdraw a request still waiting in the queue.
    ///
    /// The request's event is retired unless something is still attached
    /// to it; afterwards it reads back as processed with no value.
    pub fn cancel(&mut self, resource: ResourceId, request: EventId) -> KernelResult<()> {
        self.withdraw(resource, request)?;
        self.disown(request);
        Ok(())
    }

    fn withdraw(&mut self, resource: ResourceId, request: EventId) -> KernelResult<()> {
        if let Err(e) = self.resource_mut(resource)?.cancel(request) {
            return Err(self.closed_request(e, ProtocolViolation::NotQueued));
        }
        let detached = self
            .events
            .get(&request)
            .is_some_and(|rec| rec.callbacks.is_empty());
        if detached {
            self.events.remove(&request);
        }
        tracing::debug!(resource = %resource, request = %request, "request cancelled");
        Ok(())
    }

    /// A resource reports `NotARequest` for requests it has forgotten.
    /// Turn that into `closed` when the request was in fact made here.
    fn closed_request(&self, error: KernelError, closed: ProtocolViolation) -> KernelError {
        match error {
            KernelError::ResourceProtocol {
                resource,
                request,
                reason: ProtocolViolation::NotARequest,
            } if self.was_request(resource, request) => KernelError::ResourceProtocol {
                resource,
                request,
                reason: closed,
            },
            other => other,
        }
    }

    /// Retired ids cannot be told apart, so they count as closed requests.
    fn was_request(&self, resource: ResourceId, request: EventId) -> bool {
        match self.events.get(&request) {
            Some(rec) => rec.kind == EventKind::Request { resource },
            None => self.is_retired(request),
        }
    }

    fn release_unit(&mut self, resource: ResourceId, request: EventId) -> KernelResult<()> {
        let granted = match self.resource_mut(resource)?.release(request) {
            Ok(granted) => granted,
            Err(e) => return Err(self.closed_request(e, ProtocolViolation::AlreadyReleased)),
        };
        tracing::debug!(resource = %resource, request = %request, time = %self.now, "request released");
        for next in granted {
            tracing::debug!(resource = %resource, request = %next, time = %self.now, "request granted");
            self.trigger(next, Ok(Value::None))?;
        }
        Ok(())
    }

    fn disown(&mut self, request: EventId) {
        if let Some(pid) = self.request_owners.remove(&request) {
            if let Some(slot) = self.processes.get_mut(&pid) {
                slot.held.retain(|(_, r)| *r != request);
            }
        }
    }

    // ── Loop ──────────────────────────────────────────────────

    /// Process exactly one event: pop it, advance the clock, run its
    /// callbacks.
    ///
    /// Returns the processed event, or `None` if the queue is empty.
    pub fn step(&mut self) -> KernelResult<Option<EventId>> {
        let Some(entry) = self.scheduler.pop_next() else {
            return Ok(None);
        };

        // The clock must never go backward.
        assert!(
            entry.at >= self.now,
            "Time went backward! current={}, event={}",
            self.now,
            entry.at
        );
        self.now = entry.at;
        self.events_processed += 1;

        let event = entry.event;
        let rec = self.record_mut(event)?;
        if rec.state == EventState::Processed {
            return Err(KernelError::DoubleFire(event));
        }
        rec.state = EventState::Processed;
        let kind = rec.kind;
        let callbacks = std::mem::take(&mut rec.callbacks);
        let outcome = rec.outcome.clone().unwrap_or(Ok(Value::None));
        if !retains(kind, &outcome) {
            self.events.remove(&event);
        }
        if let EventKind::Completion { process } = kind {
            self.processes.remove(&process);
        }

        tracing::trace!(
            event = %event,
            kind = %kind,
            time = %self.now,
            callbacks = callbacks.len(),
            "event processed"
        );
        if let Some(trace) = self.trace.as_mut() {
            trace.record(TraceEntry {
                time: self.now,
                event,
                priority: entry.priority,
                kind,
                ok: outcome.is_ok(),
            });
        }

        if let Err(failure) = &outcome {
            if callbacks.is_empty() {
                tracing::warn!(event = %event, kind = %kind, error = %failure, "unhandled failure");
                return Err(KernelError::UnhandledFailure {
                    event,
                    failure: failure.clone(),
                });
            }
        }

        for callback in callbacks {
            self.fire(event, callback, &outcome)?;
        }
        Ok(Some(event))
    }

    fn fire(&mut self, event: EventId, callback: Callback, outcome: &Outcome) -> KernelResult<()> {
        match callback {
            Callback::Resume(pid) => {
                let waiting = matches!(
                    self.processes.get(&pid).map(|slot| &slot.state),
                    Some(ProcessState::Suspended { on }) if *on == event
                );
                if waiting {
                    self.resume_process(pid, Resume::from(outcome.clone()))?;
                }
                Ok(())
            }
            Callback::Interrupt(pid) => {
                let cause = outcome.clone().unwrap_or_default();
                self.deliver_interrupt(pid, cause)
            }
            Callback::Hook(hook) => {
                let mut ctx = Context::new(self, None);
                hook(&mut ctx, outcome);
                self.take_fault()
            }
        }
    }

    /// Drive the loop until `until` is met or the queue drains.
    ///
    /// A time bound at or before `now()` returns immediately. When the
    /// `until` event fails, its failure is returned as
    /// [`KernelError::UnhandledFailure`].
    pub fn run(&mut self, until: Until) -> KernelResult<StopReason> {
        match until {
            Until::Time(t) if t <= self.now => return Ok(StopReason::ReachedTime(self.now)),
            Until::Event(ev) if self.event_state(ev)? == EventState::Processed => {
                return self.stop_on(ev);
            }
            _ => {}
        }
        tracing::debug!(until = ?until, time = %self.now, "run started");

        loop {
            match (self.peek(), until) {
                (None, _) => {
                    let stalled = self.suspended();
                    if !stalled.is_empty() {
                        tracing::debug!(stalled = stalled.len(), time = %self.now, "queue drained with suspended processes");
                    }
                    return Ok(StopReason::Exhausted { stalled });
                }
                (Some(at), Until::Time(t)) if at >= t => {
                    self.now = t;
                    return Ok(StopReason::ReachedTime(t));
                }
                _ => {}
            }

            let processed = self.step()?;
            if let Until::Event(target) = until {
                if processed == Some(target) {
                    return self.stop_on(target);
                }
            }
        }
    }

    fn stop_on(&self, event: EventId) -> KernelResult<StopReason> {
        match self.event_outcome(event)?.cloned() {
            Some(Ok(value)) => Ok(StopReason::EventFired(value)),
            Some(Err(failure)) => Err(KernelError::UnhandledFailure { event, failure }),
            None => Ok(StopReason::EventFired(Value::None)),
        }
    }

    /// Run until the queue is empty **or** `max_steps` events have been
    /// processed, whichever comes first.
    ///
    /// Returns the number of events processed in this call.
    pub fn run_for(&mut self, max_steps: u64) -> KernelResult<u64> {
        let start = self.events_processed;
        while self.events_processed - start < max_steps {
            if self.step()?.is_none() {
                break;
            }
        }
        Ok(self.events_processed - start)
    }
}

/// Whether a processed event keeps its record: only when it carries a
/// value or failure someone may still read. Interruptions and grants are
/// never read back.
fn retains(kind: EventKind, outcome: &Outcome) -> bool {
    match kind {
        EventKind::Interruption { .. } | EventKind::Request { .. } => false,
        _ => !matches!(outcome, Ok(Value::None)),
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
