// SPDX-License-Identifier: Proprietary

//! The persisted job model and its append-only execution record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One HTTP header carried by a job, stored as JSON in the
/// `headers_string` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
	pub name: String,
	pub value: String,
}

/// Lifecycle state of a job row.
///
/// `available → claimed → executing → available` on the happy path;
/// `executing → failed` when retries are exhausted or the schedule is
/// unusable. Only an external provisioning path moves a job out of
/// `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Available,
	Claimed,
	Executing,
	Failed,
}

impl JobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Available => "available",
			JobStatus::Claimed => "claimed",
			JobStatus::Executing => "executing",
			JobStatus::Failed => "failed",
		}
	}
}

impl std::str::FromStr for JobStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"available" => Ok(JobStatus::Available),
			"claimed" => Ok(JobStatus::Claimed),
			"executing" => Ok(JobStatus::Executing),
			"failed" => Ok(JobStatus::Failed),
			_ => Err(format!("unknown job status: {s}")),
		}
	}
}

impl std::fmt::Display for JobStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A persistent, schedulable HTTP call.
///
/// In-memory handle for a row of the `jobs` table. A worker holds a handle
/// only while it owns the row (`claimed_by` equals its identity); handles
/// are value types, persistence always goes back through the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
	pub id: i64,
	pub cron_exp_string: String,
	pub endpoint: String,
	pub http_method: String,
	pub headers: Vec<Header>,
	pub success_statuses: Vec<i32>,
	pub max_retries: i32,
	pub status: JobStatus,
	pub claimed_by: Option<String>,
	pub should_execute_at: Option<DateTime<Utc>>,
	pub last_execution: Option<DateTime<Utc>>,
	pub last_response_at: Option<DateTime<Utc>>,
	pub last_message: Option<String>,
	pub last_status_code: Option<i32>,
	/// Optional PEM bundle for the HTTP call's client identity.
	pub tls_client_cert: Option<String>,
}

impl Job {
	/// Whether `status_code` counts as a successful outcome for this job.
	///
	/// An empty `success_statuses` set never matches, so such a job can
	/// only ever record failures.
	pub fn is_success(&self, status_code: i32) -> bool {
		self.success_statuses.contains(&status_code)
	}
}

/// One row of the append-only `job_results` table.
///
/// Written exactly once per completed firing; copies the job's schedule and
/// request fields as they were at execution time. Never updated or deleted
/// by the worker fleet.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
	pub id: i64,
	pub job_id: i64,
	pub cron_exp_string: String,
	pub endpoint: String,
	pub http_method: String,
	pub headers: Vec<Header>,
	pub success_statuses: Vec<i32>,
	pub max_retries: i32,
	pub execution_time: Option<DateTime<Utc>>,
	pub should_execute_at: Option<DateTime<Utc>>,
	pub last_response_at: Option<DateTime<Utc>>,
	pub last_message: Option<String>,
	pub last_status_code: Option<i32>,
	pub claimed_by: Option<String>,
}
