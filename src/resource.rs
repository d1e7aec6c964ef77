//! Capacity-bounded shared resources.
//!
//! A `Resource` is pure bookkeeping: which requests hold a unit, which
//! are waiting, and in what order. It never touches the event queue
//! itself. The environment turns the grants it reports into triggered
//! request events.

use std::collections::VecDeque;

use crate::error::{KernelError, KernelResult, ProtocolViolation};
use crate::event::EventId;

// ── Resource ID ───────────────────────────────────────────────────────

/// Handle to a resource owned by an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceId(u64);

impl ResourceId {
    /// Create a resource ID from a raw integer.
    #[inline]
    pub fn new(id: u64) -> Self {
        ResourceId(id)
    }

    /// Return the underlying integer.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}

// ── Request state ─────────────────────────────────────────────────────

/// Where a live request is. Released and cancelled requests are
/// forgotten by the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum RequestState {
    /// Waiting for a free unit.
    Queued,
    /// Holding a unit.
    Granted,
}

// ── Resource ──────────────────────────────────────────────────────────

/// A pool of `capacity` identical units with a strict FIFO wait queue.
///
/// Invariant: `users.len() <= capacity`, and a request is only granted
/// once every request queued ahead of it has been granted or cancelled.
#[derive(Debug, Clone)]
pub struct Resource {
    id: ResourceId,
    capacity: usize,
    /// Granted requests, in grant order.
    users: Vec<EventId>,
    /// Waiting requests, in arrival order.
    queue: VecDeque<EventId>,
}

impl Resource {
    pub(crate) fn new(id: ResourceId, capacity: usize) -> KernelResult<Self> {
        if capacity == 0 {
            return Err(KernelError::InvalidCapacity);
        }
        Ok(Resource {
            id,
            capacity,
            users: Vec::new(),
            queue: VecDeque::new(),
        })
    }

    /// This resource's handle.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Total units.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Units currently held.
    pub fn count(&self) -> usize {
        self.users.len()
    }

    /// Requests waiting for a unit.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Requests holding a unit, in grant order.
    pub fn users(&self) -> &[EventId] {
        &self.users
    }

    /// Waiting requests, head first.
    pub fn queue(&self) -> impl Iterator<Item = EventId> + '_ {
        self.queue.iter().copied()
    }

    /// State of `request`, or `None` once it has been released or
    /// cancelled (or was never made here).
    pub fn state_of(&self, request: EventId) -> Option<RequestState> {
        if self.users.contains(&request) {
            Some(RequestState::Granted)
        } else if self.queue.contains(&request) {
            Some(RequestState::Queued)
        } else {
            None
        }
    }

    /// Enqueue `request`, then grant as far as capacity allows.
    ///
    /// Returns `true` if `request` was granted straight away.
    pub(crate) fn request(&mut self, request: EventId) -> bool {
        self.queue.push_back(request);
        let granted = self.grant_waiting();
        granted.contains(&request)
    }

    /// Give back the unit held by `request`.
    ///
    /// Returns the queued requests granted as a result, in grant order.
    /// A request this resource no longer tracks is reported as
    /// `NotARequest`; the environment refines that when it knows the
    /// request was closed.
    pub(crate) fn release(&mut self, request: EventId) -> KernelResult<Vec<EventId>> {
        let Some(pos) = self.users.iter().position(|r| *r == request) else {
            let reason = if self.queue.contains(&request) {
                ProtocolViolation::NotGranted
            } else {
                ProtocolViolation::NotARequest
            };
            return Err(self.violation(request, reason));
        };
        self.users.remove(pos);
        Ok(self.grant_waiting())
    }

    /// Withdraw a request that is still waiting.
    pub(crate) fn cancel(&mut self, request: EventId) -> KernelResult<()> {
        if let Some(pos) = self.queue.iter().position(|r| *r == request) {
            self.queue.remove(pos);
            return Ok(());
        }
        let reason = if self.users.contains(&request) {
            ProtocolViolation::NotQueued
        } else {
            ProtocolViolation::NotARequest
        };
        Err(self.violation(request, reason))
    }

    fn grant_waiting(&mut self) -> Vec<EventId> {
        let mut granted = Vec::new();
        while self.users.len() < self.capacity {
            let Some(next) = self.queue.pop_front() else {
                break;
            };
            self.users.push(next);
            granted.push(next);
        }
        granted
    }

    fn violation(&self, request: EventId, reason: ProtocolViolation) -> KernelError {
        KernelError::ResourceProtocol {
            resource: self.id,
            request,
            reason,
        }
    }
}
