// SPDX-License-Identifier: Proprietary

//! Shared HTTP client with consistent User-Agent header.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates the HTTP client used for job dispatch.
///
/// The User-Agent format is: `chime/{version}`.
pub fn new_client() -> reqwest::Result<Client> {
	builder().build()
}

/// Creates an HTTP client builder with the standard chime User-Agent and
/// request timeout.
///
/// Use this when the client needs extra settings (e.g. a client identity).
pub fn builder() -> ClientBuilder {
	Client::builder()
		.user_agent(user_agent())
		.timeout(REQUEST_TIMEOUT)
}

/// Returns the standard chime User-Agent string.
pub fn user_agent() -> String {
	format!("chime/{}", env!("CARGO_PKG_VERSION"))
}
