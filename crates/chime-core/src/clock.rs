// SPDX-License-Identifier: Proprietary

//! Wall-clock abstraction.
//!
//! The claimer and scheduler take a [`Clock`] instead of calling
//! `Utc::now()` directly so tests can pin time to a known instant.

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}
