// SPDX-License-Identifier: Proprietary

//! Environment-backed configuration for the chime worker daemon.
//!
//! The configuration is an immutable value built once in `main` and passed
//! explicitly to every component; there is no process-wide singleton. Every
//! knob has a default, so a worker starts with an empty environment.
//!
//! Unparsable numeric values log an error and fall back to their default;
//! an unknown timezone or SSL mode is a fatal init error.

pub mod error;
pub mod ssl;

pub use error::ConfigError;
pub use ssl::{SslConfig, SslMode};

use std::env;
use std::time::Duration;

use chrono_tz::Tz;
use tracing::error;

/// Worker identity used as `claimed_by` in the shared store.
const APP_NAME: &str = "APP_NAME";
const MAX_JOBS: &str = "MAX_JOBS";
const POLL_INTERVAL_SECONDS: &str = "POLL_INTERVAL_SECONDS";
const WORKER_POOL_SIZE: &str = "WORKER_POOL_SIZE";
const SHUTDOWN_GRACE_SECONDS: &str = "SHUTDOWN_GRACE_SECONDS";
const TIMEZONE: &str = "TIMEZONE";
const STORAGE_KIND: &str = "STORAGE_KIND";
const DB_PROTOCOL: &str = "DB_PROTOCOL";
const DB_HOST: &str = "DB_HOST";
const DB_PORT: &str = "DB_PORT";
const DB_USER: &str = "DB_USER";
const DB_PASS: &str = "DB_PASS";
const DB_NAME: &str = "DB_NAME";

const DEFAULT_APP_NAME: &str = "application1";
const DEFAULT_MAX_JOBS: usize = 10_000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_WORKER_POOL_SIZE: usize = 10;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
const DEFAULT_STORAGE_KIND: &str = "postgres";
const DEFAULT_DB_PROTOCOL: &str = "postgresql";
const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_USER: &str = "user";
const DEFAULT_DB_PASS: &str = "password";
const DEFAULT_DB_NAME: &str = "db1";

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DbConfig {
	pub protocol: String,
	pub host: String,
	pub port: u16,
	pub user: String,
	pub password: String,
	pub dbname: String,
	pub ssl: SslConfig,
}

/// Fully-resolved worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
	/// Stable worker identity; survives restarts and names this process in
	/// the `claimed_by` column.
	pub app_name: String,
	/// Upper bound on jobs this worker schedules concurrently.
	pub max_jobs: usize,
	/// Claimer tick interval.
	pub poll_interval: Duration,
	/// Configured concurrency of the execution pool; the effective pool
	/// size is `min(max_jobs, worker_pool_size)`.
	pub worker_pool_size: usize,
	/// Grace period for draining in-flight executions on shutdown.
	pub shutdown_grace: Duration,
	/// Timezone cron expressions are evaluated in.
	pub timezone: Tz,
	/// Storage backend tag; only `postgres` is understood.
	pub storage_kind: String,
	pub db: DbConfig,
}

impl Config {
	/// Build the configuration from the process environment.
	pub fn from_env() -> Result<Config, ConfigError> {
		Self::from_lookup(|key| env::var(key).ok())
	}

	/// Build the configuration from an explicit lookup function.
	///
	/// Tests pass overrides directly instead of mutating process env vars.
	pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let timezone = match lookup(TIMEZONE) {
			None => chrono_tz::UTC,
			Some(name) => name
				.parse::<Tz>()
				.map_err(|_| ConfigError::InvalidTimezone(name))?,
		};

		let ssl = SslConfig::from_lookup(&lookup)?;

		Ok(Config {
			app_name: string_or_default(&lookup, APP_NAME, DEFAULT_APP_NAME),
			max_jobs: parse_or_default(&lookup, MAX_JOBS, DEFAULT_MAX_JOBS),
			poll_interval: Duration::from_secs(parse_or_default(
				&lookup,
				POLL_INTERVAL_SECONDS,
				DEFAULT_POLL_INTERVAL_SECS,
			)),
			worker_pool_size: parse_or_default(&lookup, WORKER_POOL_SIZE, DEFAULT_WORKER_POOL_SIZE),
			shutdown_grace: Duration::from_secs(parse_or_default(
				&lookup,
				SHUTDOWN_GRACE_SECONDS,
				DEFAULT_SHUTDOWN_GRACE_SECS,
			)),
			timezone,
			storage_kind: string_or_default(&lookup, STORAGE_KIND, DEFAULT_STORAGE_KIND),
			db: DbConfig {
				protocol: string_or_default(&lookup, DB_PROTOCOL, DEFAULT_DB_PROTOCOL),
				host: string_or_default(&lookup, DB_HOST, DEFAULT_DB_HOST),
				port: parse_or_default(&lookup, DB_PORT, DEFAULT_DB_PORT),
				user: string_or_default(&lookup, DB_USER, DEFAULT_DB_USER),
				password: string_or_default(&lookup, DB_PASS, DEFAULT_DB_PASS),
				dbname: string_or_default(&lookup, DB_NAME, DEFAULT_DB_NAME),
				ssl,
			},
		})
	}

	/// Effective size of the execution pool.
	pub fn pool_size(&self) -> usize {
		self.max_jobs.min(self.worker_pool_size).max(1)
	}
}

fn string_or_default<F>(lookup: &F, key: &str, default: &str) -> String
where
	F: Fn(&str) -> Option<String>,
{
	match lookup(key) {
		Some(value) if !value.is_empty() => value,
		_ => default.to_string(),
	}
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
	F: Fn(&str) -> Option<String>,
	T: std::str::FromStr + std::fmt::Display + Copy,
{
	match lookup(key) {
		None => default,
		Some(raw) => match raw.parse() {
			Ok(value) => value,
			Err(_) => {
				error!(key, raw = %raw, default = %default, "could not parse env value, using default");
				default
			}
		},
	}
}
