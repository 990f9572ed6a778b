// SPDX-License-Identifier: Proprietary

//! Core domain types for the chime job executor.
//!
//! This crate holds the pieces shared by every other chime crate: the job
//! model persisted in the `jobs` table, the append-only execution record,
//! cron schedule evaluation, and the clock abstraction used to keep the
//! scheduler testable.

pub mod clock;
pub mod error;
pub mod job;
pub mod schedule;

pub use clock::{Clock, SystemClock};
pub use error::ScheduleError;
pub use job::{ExecutionRecord, Header, Job, JobStatus};
pub use schedule::{next_fire, validate_expression};
