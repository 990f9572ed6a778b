// SPDX-License-Identifier: Proprietary

//! Bounded pool of executors.
//!
//! Each worker loops over the dispatch channel: mark the job executing,
//! fire the HTTP call, compute the next firing, commit. A handle whose
//! claim was lost is dropped silently. Executions in flight when shutdown
//! starts run to completion; nothing cancels an HTTP call mid-flight.

use std::sync::Arc;

use chrono_tz::Tz;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chime_core::{next_fire, Clock, Job};
use chime_http::Dispatcher;
use chime_store::JobStore;

pub struct WorkerPool {
	store: Arc<dyn JobStore>,
	dispatcher: Dispatcher,
	clock: Arc<dyn Clock>,
	worker_id: String,
	timezone: Tz,
}

impl WorkerPool {
	pub fn new(
		store: Arc<dyn JobStore>,
		dispatcher: Dispatcher,
		clock: Arc<dyn Clock>,
		worker_id: String,
		timezone: Tz,
	) -> Self {
		Self {
			store,
			dispatcher,
			clock,
			worker_id,
			timezone,
		}
	}

	/// Spawn `size` identical workers over the dispatch channel. Workers
	/// exit when the channel closes and drains.
	pub fn spawn(self, size: usize, dispatch_rx: mpsc::Receiver<Job>) -> Vec<JoinHandle<()>> {
		let pool = Arc::new(self);
		let dispatch_rx = Arc::new(Mutex::new(dispatch_rx));

		info!(size, "worker pool starting");
		(0..size)
			.map(|worker| {
				let pool = Arc::clone(&pool);
				let dispatch_rx = Arc::clone(&dispatch_rx);
				tokio::spawn(async move {
					loop {
						let received = { dispatch_rx.lock().await.recv().await };
						match received {
							Some(job) => pool.run_job(job).await,
							None => {
								debug!(worker, "dispatch channel drained, worker exiting");
								break;
							}
						}
					}
				})
			})
			.collect()
	}

	async fn run_job(&self, mut job: Job) {
		match self.store.mark_executing(job.id, &self.worker_id).await {
			Ok(()) => {}
			Err(e) if e.is_lost() => {
				debug!(job_id = job.id, "claim lost, dropping handle");
				return;
			}
			Err(e) => {
				warn!(job_id = job.id, error = %e, "mark_executing failed, dropping handle");
				return;
			}
		}

		let fired_at = self.clock.now();
		let outcome = self.dispatcher.execute(&job).await;
		debug!(
			job_id = job.id,
			success = outcome.success,
			status = outcome.status_code,
			attempts = outcome.attempts,
			"execution finished"
		);

		job.last_execution = Some(fired_at);
		job.last_response_at = Some(outcome.response_at);
		job.last_message = Some(outcome.message);
		job.last_status_code = outcome.status_code;

		if !outcome.success {
			// Retries exhausted without a success status.
			if let Err(e) = self.store.write_failed(&job).await {
				error!(job_id = job.id, error = %e, "commit failed, job stays executing for recovery");
			}
			return;
		}

		match next_fire(&job.cron_exp_string, self.clock.now(), self.timezone) {
			Ok(next) => {
				if let Err(e) = self.store.write_done(&job, next).await {
					error!(job_id = job.id, error = %e, "commit failed, job stays executing for recovery");
				}
			}
			Err(schedule_err) => {
				warn!(job_id = job.id, error = %schedule_err, "schedule became unusable");
				job.last_message = Some(schedule_err.to_string());
				if let Err(e) = self.store.write_failed(&job).await {
					error!(job_id = job.id, error = %e, "commit failed, job stays executing for recovery");
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testsupport::{manual_clock, test_job, MemStore};
	use chime_core::JobStatus;
	use std::time::Duration;

	async fn run_pool_until_idle(store: Arc<MemStore>, jobs: Vec<Job>) {
		let (clock, _now) = manual_clock();
		let dispatcher = Dispatcher::new().unwrap();
		let pool = WorkerPool::new(
			Arc::clone(&store) as Arc<dyn JobStore>,
			dispatcher,
			clock,
			"application1".to_string(),
			chrono_tz::UTC,
		);

		let (tx, rx) = mpsc::channel(16);
		let handles = pool.spawn(2, rx);
		for job in jobs {
			tx.send(job).await.unwrap();
		}
		drop(tx);
		for handle in handles {
			handle.await.unwrap();
		}
	}

	fn local_endpoint_job(id: i64, endpoint: String, statuses: Vec<i32>, retries: i32) -> Job {
		let mut job = test_job(id);
		job.endpoint = endpoint;
		job.success_statuses = statuses;
		job.max_retries = retries;
		job
	}

	async fn spawn_http_server(status: u16, body: &'static str) -> String {
		use tokio::io::{AsyncReadExt, AsyncWriteExt};
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let endpoint = format!("http://{}/", listener.local_addr().unwrap());
		tokio::spawn(async move {
			loop {
				let Ok((mut socket, _)) = listener.accept().await else {
					break;
				};
				let mut buf = [0u8; 4096];
				let _ = socket.read(&mut buf).await;
				let response = format!(
					"HTTP/1.1 {status} X\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
					body.len()
				);
				let _ = socket.write_all(response.as_bytes()).await;
				let _ = socket.shutdown().await;
			}
		});
		endpoint
	}

	#[tokio::test]
	async fn lost_handles_are_dropped_without_execution() {
		let store = Arc::new(MemStore::default());
		// Owned by someone else entirely.
		store.seed_claimed(test_job(1), "application2");

		run_pool_until_idle(Arc::clone(&store), vec![store.get(1)]).await;

		assert!(store.executions().is_empty());
		assert_eq!(store.get(1).claimed_by.as_deref(), Some("application2"));
	}

	#[tokio::test]
	async fn successful_execution_commits_and_reschedules() {
		let endpoint = spawn_http_server(200, "OK").await;
		let store = Arc::new(MemStore::default());
		let job = local_endpoint_job(1, endpoint, vec![200], 0);
		store.seed_claimed(job, "application1");

		run_pool_until_idle(Arc::clone(&store), vec![store.get(1)]).await;

		let executions = store.executions();
		assert_eq!(executions.len(), 1);
		assert_eq!(executions[0].job_id, 1);
		assert_eq!(executions[0].last_status_code, Some(200));
		assert_eq!(executions[0].last_message.as_deref(), Some("OK"));
		assert_eq!(executions[0].claimed_by.as_deref(), Some("application1"));

		let committed = store.get(1);
		assert_eq!(committed.status, JobStatus::Available);
		assert_eq!(committed.claimed_by, None);
		assert_eq!(committed.last_status_code, Some(200));
		// Rescheduled strictly past the recorded execution instant.
		assert!(committed.should_execute_at.unwrap() > committed.last_execution.unwrap());
	}

	#[tokio::test]
	async fn exhausted_retries_land_on_failed_with_one_record() {
		let endpoint = spawn_http_server(500, "boom").await;
		let store = Arc::new(MemStore::default());
		let job = local_endpoint_job(1, endpoint, vec![200], 1);
		store.seed_claimed(job, "application1");

		run_pool_until_idle(Arc::clone(&store), vec![store.get(1)]).await;

		// One record per firing, not per attempt.
		assert_eq!(store.executions().len(), 1);

		let failed = store.get(1);
		assert_eq!(failed.status, JobStatus::Failed);
		assert_eq!(failed.claimed_by, None);
		assert_eq!(failed.last_status_code, Some(500));
	}

	#[tokio::test]
	async fn unusable_schedule_after_execution_fails_the_job() {
		let endpoint = spawn_http_server(200, "OK").await;
		let store = Arc::new(MemStore::default());
		let mut job = local_endpoint_job(1, endpoint, vec![200], 0);
		// Parses, but never fires inside the lookahead window.
		job.cron_exp_string = "0 0 30 2 *".to_string();
		store.seed_claimed(job, "application1");

		run_pool_until_idle(Arc::clone(&store), vec![store.get(1)]).await;

		assert_eq!(store.executions().len(), 1);
		let failed = store.get(1);
		assert_eq!(failed.status, JobStatus::Failed);
		assert!(failed
			.last_message
			.unwrap()
			.contains("UnsatisfiableSchedule"));
	}

	#[tokio::test]
	async fn concurrency_never_exceeds_the_pool_size() {
		use std::sync::atomic::{AtomicU32, Ordering};
		use tokio::io::{AsyncReadExt, AsyncWriteExt};

		let in_flight = Arc::new(AtomicU32::new(0));
		let peak = Arc::new(AtomicU32::new(0));

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let endpoint = format!("http://{}/", listener.local_addr().unwrap());
		{
			let in_flight = Arc::clone(&in_flight);
			let peak = Arc::clone(&peak);
			tokio::spawn(async move {
				loop {
					let Ok((mut socket, _)) = listener.accept().await else {
						break;
					};
					let in_flight = Arc::clone(&in_flight);
					let peak = Arc::clone(&peak);
					tokio::spawn(async move {
						let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
						peak.fetch_max(current, Ordering::SeqCst);
						tokio::time::sleep(Duration::from_millis(50)).await;
						let mut buf = [0u8; 4096];
						let _ = socket.read(&mut buf).await;
						let _ = socket
							.write_all(b"HTTP/1.1 200 X\r\ncontent-length: 2\r\nconnection: close\r\n\r\nOK")
							.await;
						let _ = socket.shutdown().await;
						in_flight.fetch_sub(1, Ordering::SeqCst);
					});
				}
			});
		}

		let store = Arc::new(MemStore::default());
		let mut jobs = Vec::new();
		for id in 1..=8 {
			let job = local_endpoint_job(id, endpoint.clone(), vec![200], 0);
			store.seed_claimed(job, "application1");
			jobs.push(store.get(id));
		}

		run_pool_until_idle(Arc::clone(&store), jobs).await;

		assert_eq!(store.executions().len(), 8);
		assert!(peak.load(Ordering::SeqCst) <= 2, "pool of 2 must bound in-flight requests");
	}
}
