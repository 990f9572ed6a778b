// SPDX-License-Identifier: Proprietary

//! Store errors.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
	/// The optimistic-claim race: the row is no longer owned by this
	/// worker. Callers drop the handle silently.
	#[error("job {job_id} is no longer owned by {worker_id}")]
	Lost { job_id: i64, worker_id: String },

	#[error("unsupported storage kind: {0}")]
	UnsupportedKind(String),

	#[error("database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("encoding error: {0}")]
	Encoding(#[from] serde_json::Error),

	#[error("corrupt row: {0}")]
	CorruptRow(String),
}

impl StoreError {
	/// Whether this is the claim race, as opposed to a real fault.
	pub fn is_lost(&self) -> bool {
		matches!(self, StoreError::Lost { .. })
	}
}
