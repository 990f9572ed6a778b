// SPDX-License-Identifier: Proprietary

//! Lifecycle: startup order, signal handling, graceful drain.
//!
//! Components start store → dispatcher → scheduler → workers → claimer, so
//! no work can be ingested before everything downstream is ready. Shutdown
//! reverses the ingress side first: the claimer stops, the scheduler
//! releases every handle still in its heap, and the workers drain in-flight
//! executions within the grace period. A hard deadline at twice the grace
//! aborts whatever is left and relies on the next boot's recovery sweep.

use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use chime_config::Config;
use chime_core::{Clock, SystemClock};
use chime_http::Dispatcher;
use chime_store::{create_pool, JobStore, PgJobStore};

use crate::claimer::Claimer;
use crate::error::WorkerError;
use crate::pool::WorkerPool;
use crate::scheduler::Scheduler;

/// Capacity of the insert channel between claimer and scheduler.
const INSERT_CHANNEL_CAPACITY: usize = 1024;

pub struct Supervisor {
	config: Config,
}

impl Supervisor {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Run the daemon until a shutdown signal arrives.
	pub async fn run(self) -> Result<(), WorkerError> {
		let pool = create_pool(&self.config).await?;
		let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
		let dispatcher = Dispatcher::new()?;

		run_components(store, dispatcher, &self.config, shutdown_signal()).await;

		pool.close().await;
		info!("store closed");
		Ok(())
	}
}

/// Wire up and run the actors against any store and dispatcher, until the
/// given shutdown future resolves.
pub async fn run_components(
	store: Arc<dyn JobStore>,
	dispatcher: Dispatcher,
	config: &Config,
	shutdown: impl Future<Output = ()> + Send,
) {
	let clock: Arc<dyn Clock> = Arc::new(SystemClock);
	let (shutdown_tx, _) = broadcast::channel(1);
	let (insert_tx, insert_rx) = mpsc::channel(INSERT_CHANNEL_CAPACITY);
	let pool_size = config.pool_size();
	let (dispatch_tx, dispatch_rx) = mpsc::channel(pool_size * 2);
	let scheduler_size = Arc::new(AtomicUsize::new(0));

	let scheduler = Scheduler::new(
		Arc::clone(&store),
		Arc::clone(&clock),
		config.app_name.clone(),
		insert_rx,
		dispatch_tx,
		shutdown_tx.subscribe(),
		Arc::clone(&scheduler_size),
	);
	let scheduler_handle = tokio::spawn(scheduler.run());

	let worker_pool = WorkerPool::new(
		Arc::clone(&store),
		dispatcher,
		Arc::clone(&clock),
		config.app_name.clone(),
		config.timezone,
	);
	let worker_handles = worker_pool.spawn(pool_size, dispatch_rx);

	// Claimer last: nothing is ingested before the pipeline is ready.
	let claimer = Claimer::new(
		store,
		clock,
		config.app_name.clone(),
		config.timezone,
		config.max_jobs,
		config.poll_interval,
		insert_tx,
		scheduler_size,
		shutdown_tx.subscribe(),
	);
	let claimer_handle = tokio::spawn(claimer.run());

	info!(app_name = %config.app_name, "worker running");
	shutdown.await;
	info!("shutting down");

	let _ = shutdown_tx.send(());

	// Ingress first, then the heap drain, then the executors.
	let _ = claimer_handle.await;
	let _ = scheduler_handle.await;

	let grace_deadline = Instant::now() + config.shutdown_grace;
	let hard_deadline = grace_deadline + config.shutdown_grace;

	let mut pending = Vec::new();
	for mut handle in worker_handles {
		if timeout_at(grace_deadline, &mut handle).await.is_err() {
			pending.push(handle);
		}
	}
	if !pending.is_empty() {
		warn!(count = pending.len(), "grace period elapsed, in-flight executions still running");
		for mut handle in pending {
			if timeout_at(hard_deadline, &mut handle).await.is_err() {
				warn!("hard deadline reached, aborting executor");
				handle.abort();
			}
		}
	}

	info!("drain complete");
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
	#[cfg(unix)]
	{
		let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler");
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {}
			_ = sigterm.recv() => {}
		}
	}
	#[cfg(not(unix))]
	{
		let _ = tokio::signal::ctrl_c().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testsupport::{test_job, MemStore};
	use chime_core::JobStatus;
	use chrono::{Duration as ChronoDuration, Utc};
	use std::time::Duration;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::sync::oneshot;

	fn test_config() -> Config {
		let mut config = Config::from_lookup(|_| None).unwrap();
		config.poll_interval = Duration::from_millis(50);
		config.worker_pool_size = 2;
		config.shutdown_grace = Duration::from_secs(2);
		config
	}

	async fn spawn_http_server(status: u16, body: &'static str) -> String {
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
	async fn a_due_job_is_claimed_executed_and_committed() {
		let endpoint = spawn_http_server(200, "OK").await;
		let store = Arc::new(MemStore::default());
		let mut job = test_job(1);
		job.endpoint = endpoint;
		job.should_execute_at = Some(Utc::now() - ChronoDuration::seconds(1));
		store.seed_available(job);

		let config = test_config();
		let (stop_tx, stop_rx) = oneshot::channel::<()>();
		let run = tokio::spawn({
			let store = Arc::clone(&store) as Arc<dyn JobStore>;
			let config = config.clone();
			async move {
				run_components(store, Dispatcher::new().unwrap(), &config, async {
					let _ = stop_rx.await;
				})
				.await;
			}
		});

		// One claim tick, one firing, one commit.
		tokio::time::timeout(Duration::from_secs(5), async {
			while store.executions().is_empty() {
				tokio::time::sleep(Duration::from_millis(20)).await;
			}
		})
		.await
		.expect("execution should be recorded");

		stop_tx.send(()).unwrap();
		run.await.unwrap();

		let committed = store.get(1);
		assert_eq!(committed.status, JobStatus::Available);
		assert_eq!(committed.claimed_by, None);
		assert_eq!(committed.last_status_code, Some(200));
		assert_eq!(store.executions().len(), 1);
	}

	#[tokio::test]
	async fn shutdown_returns_undue_jobs_to_the_fleet() {
		let store = Arc::new(MemStore::default());
		let mut job = test_job(1);
		job.should_execute_at = Some(Utc::now() + ChronoDuration::hours(1));
		store.seed_available(job);

		let config = test_config();
		let (stop_tx, stop_rx) = oneshot::channel::<()>();
		let run = tokio::spawn({
			let store = Arc::clone(&store) as Arc<dyn JobStore>;
			let config = config.clone();
			async move {
				run_components(store, Dispatcher::new().unwrap(), &config, async {
					let _ = stop_rx.await;
				})
				.await;
			}
		});

		// Wait for the claim to land in the scheduler.
		tokio::time::timeout(Duration::from_secs(5), async {
			while store.get(1).status != JobStatus::Claimed {
				tokio::time::sleep(Duration::from_millis(20)).await;
			}
		})
		.await
		.expect("job should be claimed");

		stop_tx.send(()).unwrap();
		run.await.unwrap();

		let released = store.get(1);
		assert_eq!(released.status, JobStatus::Available);
		assert_eq!(released.claimed_by, None);
		assert!(store.executions().is_empty());
	}
}
