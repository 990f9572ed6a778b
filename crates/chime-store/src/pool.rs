// SPDX-License-Identifier: Proprietary

//! Connection pool construction.

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};

use chime_config::{Config, SslMode};

use crate::error::{Result, StoreError};

/// Create a PgPool from the worker configuration.
///
/// Fails fast when the configured storage kind is not `postgres` or the
/// database is unreachable; both are fatal init errors for the daemon.
#[tracing::instrument(skip(config), fields(host = %config.db.host, dbname = %config.db.dbname))]
pub async fn create_pool(config: &Config) -> Result<PgPool> {
	if config.storage_kind != "postgres" {
		return Err(StoreError::UnsupportedKind(config.storage_kind.clone()));
	}

	let db = &config.db;
	let url = format!(
		"{}://{}:{}@{}:{}/{}",
		db.protocol, db.user, db.password, db.host, db.port, db.dbname
	);
	let mut options = PgConnectOptions::from_str(&url)?;

	options = match db.ssl.mode {
		SslMode::Disable => options.ssl_mode(PgSslMode::Disable),
		SslMode::Require => {
			let mut options = options.ssl_mode(PgSslMode::Require);
			if let Some(ca) = &db.ssl.ca_cert_path {
				options = options.ssl_root_cert(ca);
			}
			if let Some(cert) = &db.ssl.client_cert_path {
				options = options.ssl_client_cert(cert);
			}
			if let Some(key) = &db.ssl.client_key_path {
				options = options.ssl_client_key(key);
			}
			if db.ssl.key_password.is_some() {
				// The driver only reads unencrypted PKCS#8 keys.
				tracing::warn!("DB_SSL_PASS is set but client key decryption is not supported; provide an unencrypted key");
			}
			options
		}
	};

	let pool = PgPoolOptions::new()
		.max_connections(10)
		.connect_with(options)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}
