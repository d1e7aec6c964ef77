//! # Eos — Deterministic Process Simulation Kernel
//!
//! A discrete-event simulation kernel for process-oriented models. No
//! async, no threads, no wall-clock time: processes are explicit state
//! machines that suspend on events, and a logical clock jumps from one
//! event to the next.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────┐
//! │        Environment          │ ← run loop, clock, ownership of all state
//! │  ┌──────────┐ ┌──────────┐ │
//! │  │ Process  │ │ Resource │ │ ← state machines / FIFO capacity pools
//! │  └──────────┘ └──────────┘ │
//! │  ┌──────────────────────┐  │
//! │  │      Scheduler       │  │ ← min-heap on (time, priority, seq)
//! │  └──────────────────────┘  │
//! │  ┌──────────┐ ┌──────────┐ │
//! │  │  Events  │ │ SimTime  │ │ ← event arena / logical clock
//! │  └──────────┘ └──────────┘ │
//! └────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! Two cars share one charging point; each charges for 5 ticks.
//!
//! ```rust
//! use eos::{Context, Environment, Resume, Step, Until, Using};
//!
//! let mut env = Environment::new();
//! let charger = env.resource(1).unwrap();
//!
//! for _ in 0..2 {
//!     let mut charging = false;
//!     let car = Using::new(charger, move |ctx: &mut Context<'_>, _r: Resume| {
//!         if charging {
//!             return Step::done();
//!         }
//!         charging = true;
//!         Step::wait(ctx.timeout(5))
//!     });
//!     env.process(car).unwrap();
//! }
//!
//! env.run(Until::Forever).unwrap();
//! assert_eq!(env.now().ticks(), 10);
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod event;
pub mod payload;
pub mod process;
pub mod resource;
pub mod scheduler;
pub mod time;
pub mod trace;

#[cfg(test)]
mod tests;

// Re-exports for convenience.
pub use config::{EnvironmentConfig, ResourceConfig, TimeoutConfig};
pub use environment::{Environment, StopReason, Until};
pub use error::{KernelError, KernelResult, ProtocolViolation};
pub use event::{EventId, EventKind, EventState, Priority};
pub use payload::{Failure, Outcome, Value};
pub use process::{
    Context, Named, Process, ProcessHandle, ProcessId, ProcessState, Resume, Step, Using,
};
pub use resource::{RequestState, Resource, ResourceId};
pub use time::SimTime;
pub use trace::{Trace, TraceEntry};
