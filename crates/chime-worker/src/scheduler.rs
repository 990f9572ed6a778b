// SPDX-License-Identifier: Proprietary

//! In-memory schedule of owned jobs.
//!
//! A min-heap keyed by `(should_execute_at, job_id)` and a single task that
//! sleeps until the soonest deadline or an insert, whichever comes first.
//! Due jobs drain onto a bounded channel consumed by the worker pool. On
//! shutdown every handle still held is released back to the store.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use chime_core::{Clock, Job};
use chime_store::JobStore;

/// Heap entry: a job keyed by its next firing instant, ties broken by id
/// so pops are deterministic.
#[derive(Debug)]
struct ScheduledJob {
	due: DateTime<Utc>,
	job: Job,
}

impl PartialEq for ScheduledJob {
	fn eq(&self, other: &Self) -> bool {
		self.due == other.due && self.job.id == other.job.id
	}
}

impl Eq for ScheduledJob {}

impl PartialOrd for ScheduledJob {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for ScheduledJob {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.due
			.cmp(&other.due)
			.then_with(|| self.job.id.cmp(&other.job.id))
	}
}

/// The scheduler actor. Owns the heap; the rest of the process talks to it
/// through the insert channel and the size gauge.
pub struct Scheduler {
	store: Arc<dyn JobStore>,
	clock: Arc<dyn Clock>,
	worker_id: String,
	insert_rx: mpsc::Receiver<Job>,
	dispatch_tx: mpsc::Sender<Job>,
	shutdown_rx: broadcast::Receiver<()>,
	size: Arc<AtomicUsize>,
}

impl Scheduler {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		store: Arc<dyn JobStore>,
		clock: Arc<dyn Clock>,
		worker_id: String,
		insert_rx: mpsc::Receiver<Job>,
		dispatch_tx: mpsc::Sender<Job>,
		shutdown_rx: broadcast::Receiver<()>,
		size: Arc<AtomicUsize>,
	) -> Self {
		Self {
			store,
			clock,
			worker_id,
			insert_rx,
			dispatch_tx,
			shutdown_rx,
			size,
		}
	}

	/// Run until shutdown, then release every handle still held.
	pub async fn run(mut self) {
		let mut heap: BinaryHeap<Reverse<ScheduledJob>> = BinaryHeap::new();

		info!("scheduler running");

		loop {
			let next_due = heap.peek().map(|Reverse(entry)| entry.due);

			tokio::select! {
				biased;

				_ = self.shutdown_rx.recv() => {
					break;
				}

				received = self.insert_rx.recv() => {
					match received {
						Some(job) => {
							let due = job.should_execute_at.unwrap_or_else(|| self.clock.now());
							debug!(job_id = job.id, due = %due, "scheduled");
							heap.push(Reverse(ScheduledJob { due, job }));
							self.size.store(heap.len(), Ordering::SeqCst);
						}
						// Claimer gone without a shutdown signal.
						None => break,
					}
				}

				_ = sleep_until(next_due, self.clock.as_ref()) => {
					let now = self.clock.now();
					while let Some(due) = heap.peek().map(|Reverse(entry)| entry.due) {
						if due > now {
							break;
						}
						let Some(Reverse(entry)) = heap.pop() else {
							break;
						};
						self.size.store(heap.len(), Ordering::SeqCst);
						if let Err(e) = self.dispatch_tx.send(entry.job).await {
							// Pool gone; hand the job back to the fleet.
							let job = e.0;
							warn!(job_id = job.id, "dispatch channel closed, releasing");
							self.release(job.id).await;
						}
					}
				}
			}
		}

		// Anything still buffered on the insert channel is owned too.
		while let Ok(job) = self.insert_rx.try_recv() {
			heap.push(Reverse(ScheduledJob {
				due: self.clock.now(),
				job,
			}));
		}

		info!(remaining = heap.len(), "scheduler draining");
		for Reverse(entry) in heap.drain() {
			self.release(entry.job.id).await;
		}
		self.size.store(0, Ordering::SeqCst);
	}

	async fn release(&self, job_id: i64) {
		if let Err(e) = self.store.release(job_id, &self.worker_id).await {
			warn!(job_id, error = %e, "release failed, recovery sweep will re-own");
		}
	}
}

/// Sleep until `due`, or forever when the heap is empty.
async fn sleep_until(due: Option<DateTime<Utc>>, clock: &dyn Clock) {
	match due {
		None => std::future::pending().await,
		Some(due) => {
			let delta = (due - clock.now()).to_std().unwrap_or(Duration::ZERO);
			tokio::time::sleep(delta).await;
		}
	}
}
