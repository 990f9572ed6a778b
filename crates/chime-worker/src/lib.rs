// SPDX-License-Identifier: Proprietary

//! The chime worker daemon.
//!
//! One process runs four kinds of actors wired together with channels:
//! a claimer that periodically takes ownership of due jobs from the shared
//! store, a scheduler that holds owned jobs in a time-ordered heap, a
//! bounded pool of executors that fire the HTTP calls and commit the
//! results, and a supervisor that owns startup order and graceful drain.
//! All cross-process coordination lives in the store; nothing in memory is
//! shared between workers.

pub mod claimer;
pub mod error;
pub mod pool;
pub mod scheduler;
pub mod supervisor;

pub use claimer::Claimer;
pub use error::WorkerError;
pub use pool::WorkerPool;
pub use scheduler::Scheduler;
pub use supervisor::Supervisor;

#[cfg(test)]
pub(crate) mod testsupport;
