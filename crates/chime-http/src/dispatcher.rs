// SPDX-License-Identifier: Proprietary

//! One firing = up to `max_retries + 1` HTTP attempts.

use chrono::{DateTime, Utc};
use reqwest::{Client, Identity, Method};
use tracing::{debug, warn};

use chime_core::Job;

use crate::backoff;
use crate::client::{builder, new_client};

/// Body excerpts stored in `last_message` are capped at 4 KiB.
const MAX_BODY_EXCERPT_BYTES: usize = 4096;

/// Result of one firing: the last attempt's status, a body excerpt or the
/// transport error text, and the instant the response completed.
#[derive(Debug, Clone)]
pub struct Outcome {
	/// Whether the final attempt's status was in the job's success set.
	pub success: bool,
	/// Status of the final attempt; `None` when it never got a response.
	pub status_code: Option<i32>,
	/// Body excerpt (≤ 4 KiB) or transport error text.
	pub message: String,
	/// Completion instant of the final attempt.
	pub response_at: DateTime<Utc>,
	/// Attempts actually issued.
	pub attempts: u32,
}

/// Issues jobs' HTTP requests. Holds one shared client; jobs carrying a
/// client certificate get a dedicated client for their identity.
#[derive(Clone)]
pub struct Dispatcher {
	client: Client,
}

impl Dispatcher {
	pub fn new() -> reqwest::Result<Self> {
		Ok(Self {
			client: new_client()?,
		})
	}

	pub fn with_client(client: Client) -> Self {
		Self { client }
	}

	/// Execute one firing of `job`.
	///
	/// An attempt succeeds when its response status is in the job's
	/// success set; anything else (including transport errors) consumes a
	/// retry. Retries back off exponentially with jitter. The outcome is
	/// data; this method never fails.
	pub async fn execute(&self, job: &Job) -> Outcome {
		let method = match Method::from_bytes(job.http_method.as_bytes()) {
			Ok(method) => method,
			Err(e) => {
				return Outcome {
					success: false,
					status_code: None,
					message: format!("invalid http method {:?}: {e}", job.http_method),
					response_at: Utc::now(),
					attempts: 0,
				}
			}
		};

		let dedicated;
		let client = match self.client_for(job) {
			Ok(None) => &self.client,
			Ok(Some(client)) => {
				dedicated = client;
				&dedicated
			}
			Err(e) => {
				return Outcome {
					success: false,
					status_code: None,
					message: format!("invalid client certificate: {e}"),
					response_at: Utc::now(),
					attempts: 0,
				}
			}
		};

		let max_attempts = job.max_retries.max(0) as u32 + 1;
		let mut attempt = 0;
		loop {
			attempt += 1;
			let outcome = self.attempt(client, method.clone(), job, attempt).await;

			if outcome.success || attempt >= max_attempts {
				return outcome;
			}

			let delay = backoff::retry_delay(attempt);
			debug!(job_id = job.id, attempt, delay_ms = delay.as_millis() as u64, "retrying");
			tokio::time::sleep(delay).await;
		}
	}

	async fn attempt(&self, client: &Client, method: Method, job: &Job, attempt: u32) -> Outcome {
		let mut request = client.request(method, &job.endpoint);
		for header in &job.headers {
			request = request.header(header.name.as_str(), header.value.as_str());
		}

		match request.send().await {
			Ok(response) => {
				let status = response.status().as_u16() as i32;
				let body = response.text().await.unwrap_or_default();
				let success = job.is_success(status);
				if !success {
					warn!(job_id = job.id, attempt, status, "attempt failed");
				}
				Outcome {
					success,
					status_code: Some(status),
					message: excerpt(&body),
					response_at: Utc::now(),
					attempts: attempt,
				}
			}
			Err(e) => {
				warn!(job_id = job.id, attempt, error = %e, "transport error");
				Outcome {
					success: false,
					status_code: None,
					message: e.to_string(),
					response_at: Utc::now(),
					attempts: attempt,
				}
			}
		}
	}

	fn client_for(&self, job: &Job) -> reqwest::Result<Option<Client>> {
		match &job.tls_client_cert {
			None => Ok(None),
			Some(pem) => {
				let identity = Identity::from_pem(pem.as_bytes())?;
				Ok(Some(builder().identity(identity).build()?))
			}
		}
	}
}

fn excerpt(body: &str) -> String {
	if body.len() <= MAX_BODY_EXCERPT_BYTES {
		return body.to_string();
	}
	let mut end = MAX_BODY_EXCERPT_BYTES;
	while !body.is_char_boundary(end) {
		end -= 1;
	}
	body[..end].to_string()
}
