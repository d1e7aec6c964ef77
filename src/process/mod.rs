//! Processes: suspendable units of simulated behavior.
//!
//! A process is an explicit state machine driven by the environment.
//! Each call to [`Process::resume`] runs one step and returns a [`Step`]
//! saying what to wait for next. Waiting on another process's completion
//! event composes processes.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`ProcessId`] newtype |
//! | [`traits`] | [`Process`], [`Resume`], [`Step`], [`ProcessState`], [`ProcessHandle`] |
//! | [`context`] | [`Context`] handed to every step |
//! | [`using`] | [`Using`] scoped resource acquisition |

pub mod context;
pub mod id;
pub mod traits;
pub mod using;

pub use context::Context;
pub use id::ProcessId;
pub use traits::{Named, Process, ProcessHandle, ProcessState, Resume, Step};
pub use using::Using;
