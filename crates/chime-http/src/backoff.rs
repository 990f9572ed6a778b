// SPDX-License-Identifier: Proprietary

//! Retry backoff: exponential with a cap and ±25% jitter.

use rand::Rng;
use std::time::Duration;

const BASE_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 30_000;
const RETRY_FACTOR: f64 = 2.0;
const JITTER_RATIO: f64 = 0.25;

/// Deterministic delay for the given retry, before jitter.
///
/// `retry_count` is 1-based: the first retry waits the base delay.
pub(crate) fn retry_delay_ms(retry_count: u32) -> u64 {
	let delay = BASE_RETRY_DELAY_MS as f64 * RETRY_FACTOR.powi(retry_count as i32 - 1);
	(delay as u64).min(MAX_RETRY_DELAY_MS)
}

/// Full backoff delay for the given retry, jittered by ±25%.
pub fn retry_delay(retry_count: u32) -> Duration {
	let base = retry_delay_ms(retry_count) as f64;
	let jittered = base * rand::thread_rng().gen_range(1.0 - JITTER_RATIO..=1.0 + JITTER_RATIO);
	Duration::from_millis(jittered as u64)
}
