// SPDX-License-Identifier: Proprietary

//! Durable job store for the chime executor fleet.
//!
//! The `jobs` and `job_results` tables are the only shared mutable state
//! across workers; every piece of cross-process coordination goes through
//! the operations in [`JobStore`]. Claims use row-level `FOR UPDATE SKIP
//! LOCKED` selects so workers never contend on the same rows, and every
//! operation is one bounded transaction.

pub mod error;
pub mod pool;
pub mod store;

pub use error::{Result, StoreError};
pub use pool::create_pool;
pub use store::{JobStore, PgJobStore};
