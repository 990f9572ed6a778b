// SPDX-License-Identifier: Proprietary

//! TLS material resolution for database connections.
//!
//! When SSL is required, certificates are read from a deployment base
//! directory: `/app` inside a container, the repo-relative `ssl/` directory
//! otherwise. File names are fixed.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

const DB_SSL_MODE: &str = "DB_SSLMode";
const DB_SSL_PASS: &str = "DB_SSL_PASS";

const DEFAULT_SSL_PASS: &str = "clientpass";
const CONTAINER_BASE_DIR: &str = "/app";

const CA_CERT_FILE: &str = "ca-cert.pem";
const CLIENT_CERT_FILE: &str = "client-cert.pem";
const CLIENT_KEY_FILE: &str = "client-key.pem";

/// Whether the database connection uses TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
	Disable,
	Require,
}

impl std::str::FromStr for SslMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"disable" => Ok(SslMode::Disable),
			"require" => Ok(SslMode::Require),
			other => Err(other.to_string()),
		}
	}
}

/// Resolved TLS material for the database connection.
///
/// Paths are only populated when `mode` is [`SslMode::Require`].
#[derive(Debug, Clone)]
pub struct SslConfig {
	pub mode: SslMode,
	pub ca_cert_path: Option<PathBuf>,
	pub client_cert_path: Option<PathBuf>,
	pub client_key_path: Option<PathBuf>,
	pub key_password: Option<String>,
}

impl SslConfig {
	pub(crate) fn from_lookup<F>(lookup: &F) -> Result<SslConfig, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mode = match lookup(DB_SSL_MODE) {
			None => SslMode::Disable,
			Some(raw) if raw.is_empty() => SslMode::Disable,
			Some(raw) => raw.parse().map_err(ConfigError::InvalidSslMode)?,
		};

		if mode == SslMode::Disable {
			return Ok(SslConfig {
				mode,
				ca_cert_path: None,
				client_cert_path: None,
				client_key_path: None,
				key_password: None,
			});
		}

		let password = lookup(DB_SSL_PASS)
			.filter(|p| !p.is_empty())
			.unwrap_or_else(|| DEFAULT_SSL_PASS.to_string());

		Ok(Self::required(&resolve_base_dir(), password))
	}

	/// TLS material rooted at `base`, with the fixed file names.
	pub fn required(base: &Path, key_password: String) -> SslConfig {
		SslConfig {
			mode: SslMode::Require,
			ca_cert_path: Some(base.join(CA_CERT_FILE)),
			client_cert_path: Some(base.join(CLIENT_CERT_FILE)),
			client_key_path: Some(base.join(CLIENT_KEY_FILE)),
			key_password: Some(key_password),
		}
	}
}

/// `/app` when it exists (container deployment), otherwise the repository's
/// `ssl/` directory so local runs outside docker find the same files.
fn resolve_base_dir() -> PathBuf {
	let container = Path::new(CONTAINER_BASE_DIR);
	if container.is_dir() {
		return container.to_path_buf();
	}
	local_base_dir()
}

fn local_base_dir() -> PathBuf {
	let mut base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
	base.pop(); // crates/
	base.pop(); // repo root
	base.join("ssl")
}
