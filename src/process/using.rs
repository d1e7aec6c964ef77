//! `Using` — acquire a resource unit, run a body, give the unit back.

use crate::event::EventId;
use crate::payload::Failure;
use crate::resource::ResourceId;

use super::context::Context;
use super::traits::{Process, Resume, Step};

/// Runs `inner` while holding one unit of `resource`.
///
/// The request is made when `Using` starts; `inner` first resumes with
/// [`Resume::Start`] once the unit is granted. The unit belongs to the
/// `Using` process, so it is released however that process ends: normal
/// return, failure, or an interrupt while still queued (which cancels the
/// request and fails the process).
///
/// Spawn it as a child and wait on its completion event to get a scoped
/// acquisition inside a longer-lived process.
pub struct Using<P> {
    resource: ResourceId,
    inner: P,
    request: Option<EventId>,
    granted: bool,
}

impl<P: Process> Using<P> {
    pub fn new(resource: ResourceId, inner: P) -> Self {
        Using {
            resource,
            inner,
            request: None,
            granted: false,
        }
    }
}

impl<P: Process> Process for Using<P> {
    fn resume(&mut self, ctx: &mut Context<'_>, resume: Resume) -> Step {
        if self.granted {
            return self.inner.resume(ctx, resume);
        }
        match (self.request, resume) {
            (None, _) => match ctx.request(self.resource) {
                Ok(req) => {
                    self.request = Some(req);
                    Step::Wait(req)
                }
                Err(e) => Step::Fail(Failure::new(e.to_string())),
            },
            (Some(_), Resume::Value(_)) => {
                self.granted = true;
                self.inner.resume(ctx, Resume::Start)
            }
            (Some(_), Resume::Interrupted(cause)) => Step::Fail(Failure::new(format!(
                "interrupted ({}) while waiting for {}",
                cause, self.resource
            ))),
            (Some(_), Resume::Failed(f)) => Step::Fail(f),
            (Some(req), Resume::Start) => Step::Wait(req),
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
