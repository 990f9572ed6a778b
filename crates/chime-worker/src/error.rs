// SPDX-License-Identifier: Proprietary

//! Daemon init errors.
//!
//! Anything surfacing here happens before the worker becomes a cluster
//! member, so the process exits non-zero instead of limping along.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
	#[error("configuration error: {0}")]
	Config(#[from] chime_config::ConfigError),

	#[error("store error: {0}")]
	Store(#[from] chime_store::StoreError),

	#[error("http client error: {0}")]
	Http(#[from] reqwest::Error),
}
