// SPDX-License-Identifier: Proprietary

//! Claim, commit, and release operations on the shared `jobs` and
//! `job_results` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use tracing::instrument;

use chime_core::{ExecutionRecord, Header, Job, JobStatus};

use crate::error::{Result, StoreError};

/// Durable coordination surface shared by the worker fleet.
///
/// Implementations must keep every operation inside a single bounded
/// transaction; there are no long-running transactions anywhere.
#[async_trait]
pub trait JobStore: Send + Sync {
	/// Atomically take ownership of up to `limit` unowned due jobs.
	///
	/// Selects rows with `claimed_by IS NULL AND status = 'available'`
	/// ordered by `should_execute_at` (nulls first), locks them with
	/// `FOR UPDATE SKIP LOCKED`, marks them claimed by `worker_id`, and
	/// returns them. Two workers can never claim the same row.
	async fn claim_jobs(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>>;

	/// Read-only enumeration of jobs already owned by `worker_id`.
	///
	/// Used at startup to recover handles that were claimed or executing
	/// when the previous process died.
	async fn get_claimed_jobs(&self, worker_id: &str, limit: i64, offset: i64) -> Result<Vec<Job>>;

	/// Transition `claimed → executing` iff the row is still owned by
	/// `worker_id`; [`StoreError::Lost`] otherwise. Re-entrant for rows
	/// already `executing` so a recovered handle can fire again after a
	/// crash between this transition and its commit.
	async fn mark_executing(&self, job_id: i64, worker_id: &str) -> Result<()>;

	/// Commit one completed firing.
	///
	/// In a single transaction: insert a `job_results` row copying the
	/// handle's fields, then update the `jobs` row with the outcome, the
	/// next firing instant, `status = 'available'` and `claimed_by =
	/// NULL`. The insert precedes the update so a crash between the two
	/// leaves the job claimed and ready to retry.
	async fn write_done(&self, job: &Job, next_fire_at: DateTime<Utc>) -> Result<()>;

	/// Commit one completed firing whose retries were exhausted without
	/// success.
	///
	/// Same transaction shape as [`JobStore::write_done`]: the result row
	/// is still appended, but the `jobs` row lands on `status = 'failed'`
	/// with ownership cleared instead of being rescheduled.
	async fn write_failed(&self, job: &Job) -> Result<()>;

	/// Return a job to `available` with ownership cleared, iff still
	/// owned by `worker_id`. Idempotent.
	async fn release(&self, job_id: i64, worker_id: &str) -> Result<()>;

	/// Terminal transition for a job that never got to execute, e.g. one
	/// whose schedule cannot be evaluated. Clears ownership.
	async fn mark_failed(&self, job_id: i64, worker_id: &str, message: &str) -> Result<()>;

	/// Most recent execution records for a job, newest first.
	async fn list_executions(&self, job_id: i64, limit: i64) -> Result<Vec<ExecutionRecord>>;
}

const JOB_COLUMNS: &str = "\
	id, cron_exp_string, endpoint, httpmethod, headers_string, \
	success_statuses, max_retries, status, claimed_by, \
	should_execute_at, last_execution, last_response_at, \
	last_message, last_status_code, tls_client_cert";

/// PostgreSQL implementation of [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
	pool: PgPool,
}

impl PgJobStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl JobStore for PgJobStore {
	#[instrument(skip(self), fields(worker_id = %worker_id, limit))]
	async fn claim_jobs(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
		let mut tx = self.pool.begin().await?;

		let rows = sqlx::query_as::<_, JobRow>(&format!(
			r#"
			SELECT {JOB_COLUMNS}
			FROM jobs
			WHERE claimed_by IS NULL AND status = 'available'
			ORDER BY should_execute_at ASC NULLS FIRST
			LIMIT $1
			FOR UPDATE SKIP LOCKED
			"#
		))
		.bind(limit)
		.fetch_all(&mut *tx)
		.await?;

		if rows.is_empty() {
			tx.commit().await?;
			return Ok(Vec::new());
		}

		let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
		sqlx::query(
			r#"
			UPDATE jobs
			SET claimed_by = $1, status = 'claimed'
			WHERE id = ANY($2)
			"#,
		)
		.bind(worker_id)
		.bind(&ids)
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;

		let mut jobs = rows
			.into_iter()
			.map(Job::try_from)
			.collect::<Result<Vec<_>>>()?;
		for job in &mut jobs {
			job.status = JobStatus::Claimed;
			job.claimed_by = Some(worker_id.to_string());
		}

		tracing::debug!(count = jobs.len(), "claimed jobs");
		Ok(jobs)
	}

	#[instrument(skip(self), fields(worker_id = %worker_id, limit, offset))]
	async fn get_claimed_jobs(&self, worker_id: &str, limit: i64, offset: i64) -> Result<Vec<Job>> {
		let rows = sqlx::query_as::<_, JobRow>(&format!(
			r#"
			SELECT {JOB_COLUMNS}
			FROM jobs
			WHERE claimed_by = $1 AND status IN ('claimed', 'executing')
			ORDER BY id ASC
			LIMIT $2
			OFFSET $3
			"#
		))
		.bind(worker_id)
		.bind(limit)
		.bind(offset)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Job::try_from).collect()
	}

	#[instrument(skip(self), fields(job_id, worker_id = %worker_id))]
	async fn mark_executing(&self, job_id: i64, worker_id: &str) -> Result<()> {
		let result = sqlx::query(
			r#"
			UPDATE jobs
			SET status = 'executing'
			WHERE id = $1 AND claimed_by = $2 AND status IN ('claimed', 'executing')
			"#,
		)
		.bind(job_id)
		.bind(worker_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(StoreError::Lost {
				job_id,
				worker_id: worker_id.to_string(),
			});
		}
		Ok(())
	}

	#[instrument(skip(self, job), fields(job_id = job.id))]
	async fn write_done(&self, job: &Job, next_fire_at: DateTime<Utc>) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		insert_execution(&mut tx, job).await?;

		sqlx::query(
			r#"
			UPDATE jobs
			SET last_execution = $2,
				last_response_at = $3,
				last_message = $4,
				last_status_code = $5,
				should_execute_at = $6,
				status = 'available',
				claimed_by = NULL
			WHERE id = $1
			"#,
		)
		.bind(job.id)
		.bind(to_micros(job.last_execution))
		.bind(to_micros(job.last_response_at))
		.bind(&job.last_message)
		.bind(job.last_status_code)
		.bind(next_fire_at.timestamp_micros())
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;

		tracing::debug!(job_id = job.id, next_fire_at = %next_fire_at, "execution committed");
		Ok(())
	}

	#[instrument(skip(self, job), fields(job_id = job.id))]
	async fn write_failed(&self, job: &Job) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		insert_execution(&mut tx, job).await?;

		sqlx::query(
			r#"
			UPDATE jobs
			SET last_execution = $2,
				last_response_at = $3,
				last_message = $4,
				last_status_code = $5,
				status = 'failed',
				claimed_by = NULL
			WHERE id = $1
			"#,
		)
		.bind(job.id)
		.bind(to_micros(job.last_execution))
		.bind(to_micros(job.last_response_at))
		.bind(&job.last_message)
		.bind(job.last_status_code)
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;

		tracing::debug!(job_id = job.id, "failed execution committed");
		Ok(())
	}

	#[instrument(skip(self), fields(job_id, worker_id = %worker_id))]
	async fn release(&self, job_id: i64, worker_id: &str) -> Result<()> {
		let result = sqlx::query(
			r#"
			UPDATE jobs
			SET claimed_by = NULL, status = 'available'
			WHERE id = $1 AND claimed_by = $2 AND status IN ('claimed', 'executing')
			"#,
		)
		.bind(job_id)
		.bind(worker_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			tracing::debug!(job_id, "release: job not owned, nothing to do");
		}
		Ok(())
	}

	#[instrument(skip(self, message), fields(job_id, worker_id = %worker_id))]
	async fn mark_failed(&self, job_id: i64, worker_id: &str, message: &str) -> Result<()> {
		sqlx::query(
			r#"
			UPDATE jobs
			SET status = 'failed', claimed_by = NULL, last_message = $3
			WHERE id = $1 AND claimed_by = $2
			"#,
		)
		.bind(job_id)
		.bind(worker_id)
		.bind(message)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self), fields(job_id, limit))]
	async fn list_executions(&self, job_id: i64, limit: i64) -> Result<Vec<ExecutionRecord>> {
		let rows = sqlx::query_as::<_, ExecutionRow>(
			r#"
			SELECT id, job_id, cron_exp_string, endpoint, httpmethod,
				headers_string, success_statuses, max_retries, execution_time,
				should_execute_at, last_response_at, last_message,
				last_status_code, claimed_by
			FROM job_results
			WHERE job_id = $1
			ORDER BY id DESC
			LIMIT $2
			"#,
		)
		.bind(job_id)
		.bind(limit)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(ExecutionRecord::try_from).collect()
	}
}

/// Append the `job_results` row for one firing, copying the handle's
/// fields. Runs inside the caller's transaction, always before the `jobs`
/// update, so a crash in between leaves the job claimed and retryable.
async fn insert_execution(
	tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
	job: &Job,
) -> Result<()> {
	let headers_string = serde_json::to_string(&job.headers)?;

	sqlx::query(
		r#"
		INSERT INTO job_results (
			job_id, cron_exp_string, endpoint, httpmethod, headers_string,
			success_statuses, max_retries, execution_time, should_execute_at,
			last_response_at, last_message, last_status_code, tls_client_cert,
			claimed_by
		)
		VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
		"#,
	)
	.bind(job.id)
	.bind(&job.cron_exp_string)
	.bind(&job.endpoint)
	.bind(&job.http_method)
	.bind(&headers_string)
	.bind(&job.success_statuses)
	.bind(job.max_retries)
	.bind(to_micros(job.last_execution))
	.bind(to_micros(job.should_execute_at))
	.bind(to_micros(job.last_response_at))
	.bind(&job.last_message)
	.bind(job.last_status_code)
	.bind(&job.tls_client_cert)
	.bind(&job.claimed_by)
	.execute(&mut **tx)
	.await?;

	Ok(())
}

// Database row types.

#[derive(sqlx::FromRow)]
struct JobRow {
	id: i64,
	cron_exp_string: String,
	endpoint: String,
	httpmethod: String,
	headers_string: Option<String>,
	success_statuses: Vec<i32>,
	max_retries: i32,
	status: String,
	claimed_by: Option<String>,
	should_execute_at: Option<i64>,
	last_execution: Option<i64>,
	last_response_at: Option<i64>,
	last_message: Option<String>,
	last_status_code: Option<i32>,
	tls_client_cert: Option<String>,
}

impl TryFrom<JobRow> for Job {
	type Error = StoreError;

	fn try_from(row: JobRow) -> Result<Self> {
		Ok(Job {
			id: row.id,
			cron_exp_string: row.cron_exp_string,
			endpoint: row.endpoint,
			http_method: row.httpmethod,
			headers: decode_headers(row.headers_string.as_deref())?,
			success_statuses: row.success_statuses,
			max_retries: row.max_retries,
			status: row
				.status
				.parse()
				.map_err(|e: String| StoreError::CorruptRow(e))?,
			claimed_by: row.claimed_by,
			should_execute_at: from_micros(row.should_execute_at, "should_execute_at")?,
			last_execution: from_micros(row.last_execution, "last_execution")?,
			last_response_at: from_micros(row.last_response_at, "last_response_at")?,
			last_message: row.last_message,
			last_status_code: row.last_status_code,
			tls_client_cert: row.tls_client_cert,
		})
	}
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
	id: i64,
	job_id: i64,
	cron_exp_string: String,
	endpoint: String,
	httpmethod: String,
	headers_string: Option<String>,
	success_statuses: Vec<i32>,
	max_retries: i32,
	execution_time: Option<i64>,
	should_execute_at: Option<i64>,
	last_response_at: Option<i64>,
	last_message: Option<String>,
	last_status_code: Option<i32>,
	claimed_by: Option<String>,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
	type Error = StoreError;

	fn try_from(row: ExecutionRow) -> Result<Self> {
		Ok(ExecutionRecord {
			id: row.id,
			job_id: row.job_id,
			cron_exp_string: row.cron_exp_string,
			endpoint: row.endpoint,
			http_method: row.httpmethod,
			headers: decode_headers(row.headers_string.as_deref())?,
			success_statuses: row.success_statuses,
			max_retries: row.max_retries,
			execution_time: from_micros(row.execution_time, "execution_time")?,
			should_execute_at: from_micros(row.should_execute_at, "should_execute_at")?,
			last_response_at: from_micros(row.last_response_at, "last_response_at")?,
			last_message: row.last_message,
			last_status_code: row.last_status_code,
			claimed_by: row.claimed_by,
		})
	}
}

fn decode_headers(raw: Option<&str>) -> Result<Vec<Header>> {
	match raw {
		None | Some("") => Ok(Vec::new()),
		Some(json) => Ok(serde_json::from_str(json)?),
	}
}

fn from_micros(value: Option<i64>, column: &str) -> Result<Option<DateTime<Utc>>> {
	value
		.map(|micros| {
			DateTime::from_timestamp_micros(micros)
				.ok_or_else(|| StoreError::CorruptRow(format!("{column} out of range: {micros}")))
		})
		.transpose()
}

fn to_micros(value: Option<DateTime<Utc>>) -> Option<i64> {
	value.map(|dt| dt.timestamp_micros())
}
