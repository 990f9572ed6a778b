// SPDX-License-Identifier: Proprietary

//! Periodic claim of unowned due jobs.
//!
//! Every tick the claimer asks the store for up to `max_jobs - |heap|`
//! unowned jobs and hands them to the scheduler. At startup it first pages
//! through the jobs this worker identity already owned when the previous
//! process died, so a restart resumes where the crash left off.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use chime_core::{next_fire, Clock, Job};
use chime_store::JobStore;

/// Page size for the startup recovery sweep.
const RECOVERY_PAGE: i64 = 500;

pub struct Claimer {
	store: Arc<dyn JobStore>,
	clock: Arc<dyn Clock>,
	worker_id: String,
	timezone: Tz,
	max_jobs: usize,
	poll_interval: Duration,
	insert_tx: mpsc::Sender<Job>,
	scheduler_size: Arc<AtomicUsize>,
	shutdown_rx: broadcast::Receiver<()>,
}

impl Claimer {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		store: Arc<dyn JobStore>,
		clock: Arc<dyn Clock>,
		worker_id: String,
		timezone: Tz,
		max_jobs: usize,
		poll_interval: Duration,
		insert_tx: mpsc::Sender<Job>,
		scheduler_size: Arc<AtomicUsize>,
		shutdown_rx: broadcast::Receiver<()>,
	) -> Self {
		Self {
			store,
			clock,
			worker_id,
			timezone,
			max_jobs,
			poll_interval,
			insert_tx,
			scheduler_size,
			shutdown_rx,
		}
	}

	/// Recover previously-owned jobs, then claim on every tick until
	/// shutdown.
	pub async fn run(mut self) {
		self.recover().await;

		let mut ticker = tokio::time::interval(self.poll_interval);
		info!(poll_interval_secs = self.poll_interval.as_secs(), "claimer running");

		loop {
			tokio::select! {
				biased;

				_ = self.shutdown_rx.recv() => {
					info!("claimer stopping");
					break;
				}

				_ = ticker.tick() => {
					self.tick().await;
				}
			}
		}
	}

	async fn tick(&self) {
		let held = self.scheduler_size.load(Ordering::SeqCst);
		if held >= self.max_jobs {
			debug!(held, max_jobs = self.max_jobs, "at capacity, skipping claim");
			return;
		}
		let remaining = (self.max_jobs - held) as i64;

		match self.store.claim_jobs(&self.worker_id, remaining).await {
			Ok(jobs) => {
				debug!(count = jobs.len(), "claimed");
				for job in jobs {
					self.admit(job).await;
				}
			}
			// Transient; the next tick retries.
			Err(e) => warn!(error = %e, "claim failed"),
		}
	}

	/// Hand one owned job to the scheduler, computing its first firing
	/// when the stored value is missing.
	async fn admit(&self, mut job: Job) {
		if job.should_execute_at.is_none() {
			match next_fire(&job.cron_exp_string, self.clock.now(), self.timezone) {
				Ok(next) => job.should_execute_at = Some(next),
				Err(e) => {
					warn!(job_id = job.id, error = %e, "unusable schedule");
					if let Err(store_err) = self
						.store
						.mark_failed(job.id, &self.worker_id, &e.to_string())
						.await
					{
						warn!(job_id = job.id, error = %store_err, "mark_failed failed");
					}
					return;
				}
			}
		}

		if self.insert_tx.send(job).await.is_err() {
			// Scheduler gone; shutdown is already in progress.
			debug!("insert channel closed");
		}
	}

	async fn recover(&self) {
		let mut offset = 0i64;
		let mut total = 0usize;
		loop {
			match self
				.store
				.get_claimed_jobs(&self.worker_id, RECOVERY_PAGE, offset)
				.await
			{
				Ok(jobs) => {
					let count = jobs.len();
					total += count;
					for job in jobs {
						self.admit(job).await;
					}
					if (count as i64) < RECOVERY_PAGE {
						break;
					}
					offset += count as i64;
				}
				Err(e) => {
					warn!(error = %e, "recovery sweep failed, continuing with claims");
					break;
				}
			}
		}
		if total > 0 {
			info!(count = total, "recovered previously claimed jobs");
		}
	}
}
