// SPDX-License-Identifier: Proprietary

//! Schedule evaluation errors.

use thiserror::Error;

/// Errors produced while evaluating a job's cron schedule.
///
/// Both variants are terminal for the offending job: the worker marks it
/// failed and moves on, the fleet keeps running.
#[derive(Debug, Error)]
pub enum ScheduleError {
	/// The expression does not parse as a 5-field cron schedule.
	#[error("InvalidSchedule: {0}")]
	Invalid(String),

	/// The expression parses but never fires within the lookahead window.
	#[error("UnsatisfiableSchedule: no firing within {years} years for {expression}")]
	Unsatisfiable { expression: String, years: i64 },
}
