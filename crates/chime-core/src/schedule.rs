// SPDX-License-Identifier: Proprietary

//! Cron schedule evaluation.
//!
//! Jobs carry standard 5-field Unix cron expressions. The `cron` crate
//! expects a 7-field format, so expressions are widened before parsing and
//! evaluated in the worker's configured timezone.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

use crate::error::ScheduleError;

/// Firings further out than this are treated as never firing at all.
const MAX_LOOKAHEAD_YEARS: i64 = 4;

/// Widen a 5-field Unix cron expression into the 7-field form the `cron`
/// crate parses, pinning seconds to "0" (fire at :00 of each minute) and
/// leaving the trailing year field as a wildcard.
///
/// Anything that is not exactly five fields passes through untouched:
/// six- and seven-field expressions are already in the extended form, and
/// malformed input gets its error from the parser, not from here.
fn widen_expression(expression: &str) -> String {
	match expression.split_whitespace().count() {
		5 => format!("0 {expression} *"),
		_ => expression.to_string(),
	}
}

/// Compute the next firing instant of `expression` strictly after `after`,
/// evaluated in `timezone` and returned in UTC.
///
/// # Errors
///
/// [`ScheduleError::Invalid`] when the expression does not parse,
/// [`ScheduleError::Unsatisfiable`] when no firing exists within
/// [`MAX_LOOKAHEAD_YEARS`] of `after`.
pub fn next_fire(
	expression: &str,
	after: DateTime<Utc>,
	timezone: Tz,
) -> Result<DateTime<Utc>, ScheduleError> {
	let schedule = Schedule::from_str(&widen_expression(expression))
		.map_err(|e| ScheduleError::Invalid(e.to_string()))?;

	let local_after = after.with_timezone(&timezone);

	let unsatisfiable = || ScheduleError::Unsatisfiable {
		expression: expression.to_string(),
		years: MAX_LOOKAHEAD_YEARS,
	};

	let next = schedule
		.after(&local_after)
		.next()
		.ok_or_else(unsatisfiable)?
		.with_timezone(&Utc);

	if next > after + Duration::days(MAX_LOOKAHEAD_YEARS * 366) {
		return Err(unsatisfiable());
	}

	Ok(next)
}

/// Validate a cron expression without computing a firing.
pub fn validate_expression(expression: &str) -> Result<(), ScheduleError> {
	Schedule::from_str(&widen_expression(expression))
		.map_err(|e| ScheduleError::Invalid(e.to_string()))?;
	Ok(())
}
