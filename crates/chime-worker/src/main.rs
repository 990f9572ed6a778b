// SPDX-License-Identifier: Proprietary

//! Chime worker daemon binary.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chime_config::Config;
use chime_worker::Supervisor;

/// Chime worker - distributed cron-style HTTP job executor.
#[derive(Parser, Debug)]
#[command(name = "chime-worker", about = "Chime job executor worker", version)]
struct Args {
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("chime-worker {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "info".into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	let config = Config::from_env()?;

	tracing::info!(
		app_name = %config.app_name,
		db_host = %config.db.host,
		db_name = %config.db.dbname,
		max_jobs = config.max_jobs,
		poll_interval_secs = config.poll_interval.as_secs(),
		"starting chime-worker"
	);

	Supervisor::new(config).run().await?;

	tracing::info!("shutdown complete");
	Ok(())
}
