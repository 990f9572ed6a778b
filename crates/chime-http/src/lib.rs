// SPDX-License-Identifier: Proprietary

//! HTTP dispatcher for the chime job executor.
//!
//! Pure compute over a request: the dispatcher issues a job's HTTP call,
//! retries failures with bounded exponential backoff, and reports the
//! outcome as data. It never touches the store.

pub mod backoff;
pub mod client;
pub mod dispatcher;

pub use client::{builder, new_client, user_agent};
pub use dispatcher::{Dispatcher, Outcome};
