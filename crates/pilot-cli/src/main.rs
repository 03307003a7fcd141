// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pilot feature flags command line tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pilot_server_config::{FlagsConfig, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

/// Pilot feature flags - check and manage pilot whitelists.
#[derive(Parser, Debug)]
#[command(name = "pilot-flags", about = "Pilot feature flag checks and management", version)]
struct Args {
	/// Config file (defaults to /etc/pilot/flags.toml)
	#[arg(long, global = true, env = "PILOT_FLAGS_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Check whether a feature is active for a user
	Check {
		feature_name: String,
		user_identifier: String,
		#[arg(long)]
		user_type: Option<String>,
		#[arg(long)]
		app_version: Option<String>,
	},

	/// Check a JSON array of requests read from a file ("-" for stdin)
	CheckBatch { file: PathBuf },

	/// Manage feature flags
	#[command(subcommand)]
	Flags(FlagsCommand),

	/// Manage pilot whitelists
	#[command(subcommand)]
	Whitelist(WhitelistCommand),

	/// Manage the flag cache
	#[command(subcommand)]
	Cache(CacheCommand),

	/// Create the demo flags if they do not exist
	Seed,

	/// Show version information
	Version,
}

#[derive(Subcommand, Debug)]
enum FlagsCommand {
	/// List all flags
	List,

	/// Show a flag by name or id
	Get { flag: String },

	/// Create a flag
	Create {
		name: String,
		#[arg(long)]
		description: Option<String>,
		#[arg(long)]
		enabled: bool,
		#[arg(long)]
		created_by: Option<String>,
	},

	/// Update a flag's description or enabled state; unset options keep their value
	Update {
		flag: String,
		#[arg(long)]
		description: Option<String>,
		#[arg(long)]
		enabled: Option<bool>,
		#[arg(long)]
		updated_by: Option<String>,
	},

	/// Delete a flag and its whitelist
	Delete { flag: String },
}

#[derive(Subcommand, Debug)]
enum WhitelistCommand {
	/// List the whitelist of a flag
	List { flag: String },

	/// Add a user to a flag's whitelist
	Add {
		flag: String,
		user_identifier: String,
		#[arg(long)]
		user_type: Option<String>,
		#[arg(long)]
		min_version: Option<String>,
		/// Expiry as an RFC 3339 timestamp
		#[arg(long, conflicts_with = "expires_in_days")]
		expires_at: Option<chrono::DateTime<chrono::Utc>>,
		/// Expiry relative to now
		#[arg(long)]
		expires_in_days: Option<i64>,
		#[arg(long)]
		created_by: Option<String>,
	},

	/// Remove a whitelist entry by id
	Remove { entry_id: uuid::Uuid },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
	/// Drop every cached snapshot and reload from the store
	Refresh,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("{}", format_version_info());
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => pilot_server_config::load_config_with_file(path)?,
		None => pilot_server_config::load_config()?,
	};

	init_tracing(&config);

	let service = commands::open_service(&config).await?;
	commands::run(&service, args.command).await
}

/// Installs the log subscriber. Logs go to stderr; stdout carries command output.
fn init_tracing(config: &FlagsConfig) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

	let registry = tracing_subscriber::registry().with(filter);
	match config.logging.format {
		LogFormat::Pretty => registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init(),
		LogFormat::Json => registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.with_writer(std::io::stderr),
			)
			.init(),
	}
}

fn format_version_info() -> String {
	format!(
		"pilot-flags version: {}\n\
		 Platform:            {}-{}",
		env!("CARGO_PKG_VERSION"),
		std::env::consts::OS,
		std::env::consts::ARCH,
	)
}
