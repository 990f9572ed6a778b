// SPDX-License-Identifier: Proprietary

//! Configuration errors.
//!
//! These are fatal: a worker with bad configuration exits before it becomes
//! a cluster member.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid timezone: {0}")]
	InvalidTimezone(String),

	#[error("invalid DB_SSLMode: {0} (expected 'disable' or 'require')")]
	InvalidSslMode(String),
}
