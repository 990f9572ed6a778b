// SPDX-License-Identifier: Proprietary

//! In-memory store double and fixed clock shared by the actor tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chime_core::{Clock, ExecutionRecord, Job, JobStatus};
use chime_store::{JobStore, Result, StoreError};

/// A clock frozen at construction time.
pub(crate) struct ManualClock {
	now: DateTime<Utc>,
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		self.now
	}
}

pub(crate) fn manual_clock() -> (Arc<ManualClock>, DateTime<Utc>) {
	let now = Utc::now();
	(Arc::new(ManualClock { now }), now)
}

pub(crate) fn test_job(id: i64) -> Job {
	Job {
		id,
		cron_exp_string: "* * * * *".to_string(),
		endpoint: "http://localhost/".to_string(),
		http_method: "GET".to_string(),
		headers: Vec::new(),
		success_statuses: vec![200],
		max_retries: 0,
		status: JobStatus::Available,
		claimed_by: None,
		should_execute_at: None,
		last_execution: None,
		last_response_at: None,
		last_message: None,
		last_status_code: None,
		tls_client_cert: None,
	}
}

/// In-memory [`JobStore`] with the same transition rules as the Postgres
/// implementation.
#[derive(Default)]
pub(crate) struct MemStore {
	jobs: Mutex<BTreeMap<i64, Job>>,
	executions: Mutex<Vec<ExecutionRecord>>,
	released_log: Mutex<Vec<i64>>,
}

impl MemStore {
	pub(crate) fn seed_available(&self, mut job: Job) {
		job.status = JobStatus::Available;
		job.claimed_by = None;
		self.jobs.lock().unwrap().insert(job.id, job);
	}

	pub(crate) fn seed_claimed(&self, mut job: Job, worker_id: &str) {
		job.claimed_by = Some(worker_id.to_string());
		if job.status == JobStatus::Available {
			job.status = JobStatus::Claimed;
		}
		self.jobs.lock().unwrap().insert(job.id, job);
	}

	pub(crate) fn get(&self, id: i64) -> Job {
		self.jobs.lock().unwrap().get(&id).cloned().expect("job seeded")
	}

	pub(crate) fn executions(&self) -> Vec<ExecutionRecord> {
		self.executions.lock().unwrap().clone()
	}

	/// Ids released back to available, sorted.
	pub(crate) fn released(&self) -> Vec<i64> {
		let mut ids = self.released_log.lock().unwrap().clone();
		ids.sort_unstable();
		ids
	}

	fn record_from(job: &Job, id: i64) -> ExecutionRecord {
		ExecutionRecord {
			id,
			job_id: job.id,
			cron_exp_string: job.cron_exp_string.clone(),
			endpoint: job.endpoint.clone(),
			http_method: job.http_method.clone(),
			headers: job.headers.clone(),
			success_statuses: job.success_statuses.clone(),
			max_retries: job.max_retries,
			execution_time: job.last_execution,
			should_execute_at: job.should_execute_at,
			last_response_at: job.last_response_at,
			last_message: job.last_message.clone(),
			last_status_code: job.last_status_code,
			claimed_by: job.claimed_by.clone(),
		}
	}
}

#[async_trait]
impl JobStore for MemStore {
	async fn claim_jobs(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
		let mut jobs = self.jobs.lock().unwrap();

		let mut claimable: Vec<i64> = jobs
			.values()
			.filter(|j| j.claimed_by.is_none() && j.status == JobStatus::Available)
			.map(|j| j.id)
			.collect();
		// Nulls first, then earliest due, then id.
		claimable.sort_by_key(|id| {
			let job = &jobs[id];
			(job.should_execute_at.is_some(), job.should_execute_at, *id)
		});
		claimable.truncate(limit.max(0) as usize);

		let mut claimed = Vec::new();
		for id in claimable {
			let job = jobs.get_mut(&id).expect("listed above");
			job.claimed_by = Some(worker_id.to_string());
			job.status = JobStatus::Claimed;
			claimed.push(job.clone());
		}
		Ok(claimed)
	}

	async fn get_claimed_jobs(&self, worker_id: &str, limit: i64, offset: i64) -> Result<Vec<Job>> {
		let jobs = self.jobs.lock().unwrap();
		Ok(jobs
			.values()
			.filter(|j| {
				j.claimed_by.as_deref() == Some(worker_id)
					&& matches!(j.status, JobStatus::Claimed | JobStatus::Executing)
			})
			.skip(offset.max(0) as usize)
			.take(limit.max(0) as usize)
			.cloned()
			.collect())
	}

	async fn mark_executing(&self, job_id: i64, worker_id: &str) -> Result<()> {
		let mut jobs = self.jobs.lock().unwrap();
		match jobs.get_mut(&job_id) {
			Some(job)
				if job.claimed_by.as_deref() == Some(worker_id)
					&& matches!(job.status, JobStatus::Claimed | JobStatus::Executing) =>
			{
				job.status = JobStatus::Executing;
				Ok(())
			}
			_ => Err(StoreError::Lost {
				job_id,
				worker_id: worker_id.to_string(),
			}),
		}
	}

	async fn write_done(&self, job: &Job, next_fire_at: DateTime<Utc>) -> Result<()> {
		let mut executions = self.executions.lock().unwrap();
		let record_id = executions.len() as i64 + 1;
		executions.push(Self::record_from(job, record_id));
		drop(executions);

		let mut jobs = self.jobs.lock().unwrap();
		if let Some(stored) = jobs.get_mut(&job.id) {
			stored.last_execution = job.last_execution;
			stored.last_response_at = job.last_response_at;
			stored.last_message = job.last_message.clone();
			stored.last_status_code = job.last_status_code;
			stored.should_execute_at = Some(next_fire_at);
			stored.status = JobStatus::Available;
			stored.claimed_by = None;
		}
		Ok(())
	}

	async fn write_failed(&self, job: &Job) -> Result<()> {
		let mut executions = self.executions.lock().unwrap();
		let record_id = executions.len() as i64 + 1;
		executions.push(Self::record_from(job, record_id));
		drop(executions);

		let mut jobs = self.jobs.lock().unwrap();
		if let Some(stored) = jobs.get_mut(&job.id) {
			stored.last_execution = job.last_execution;
			stored.last_response_at = job.last_response_at;
			stored.last_message = job.last_message.clone();
			stored.last_status_code = job.last_status_code;
			stored.status = JobStatus::Failed;
			stored.claimed_by = None;
		}
		Ok(())
	}

	async fn release(&self, job_id: i64, worker_id: &str) -> Result<()> {
		let mut jobs = self.jobs.lock().unwrap();
		if let Some(job) = jobs.get_mut(&job_id) {
			if job.claimed_by.as_deref() == Some(worker_id)
				&& matches!(job.status, JobStatus::Claimed | JobStatus::Executing)
			{
				job.claimed_by = None;
				job.status = JobStatus::Available;
				self.released_log.lock().unwrap().push(job_id);
			}
		}
		Ok(())
	}

	async fn mark_failed(&self, job_id: i64, worker_id: &str, message: &str) -> Result<()> {
		let mut jobs = self.jobs.lock().unwrap();
		if let Some(job) = jobs.get_mut(&job_id) {
			if job.claimed_by.as_deref() == Some(worker_id) {
				job.status = JobStatus::Failed;
				job.claimed_by = None;
				job.last_message = Some(message.to_string());
			}
		}
		Ok(())
	}

	async fn list_executions(&self, job_id: i64, limit: i64) -> Result<Vec<ExecutionRecord>> {
		let executions = self.executions.lock().unwrap();
		Ok(executions
			.iter()
			.filter(|r| r.job_id == job_id)
			.rev()
			.take(limit.max(0) as usize)
			.cloned()
			.collect())
	}
}
