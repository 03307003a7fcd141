// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite pool creation and schema migrations.

use std::str::FromStr;

use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::{FlagsServerError, Result};

/// Create a SqlitePool with WAL mode and foreign keys enforced.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./pilot-flags.db")
/// * `max_connections` - Upper bound on pooled connections
///
/// # Errors
/// Returns `FlagsServerError::Internal` if the URL is invalid, or
/// `FlagsServerError::Database` if the connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| FlagsServerError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.foreign_keys(true)
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(max_connections.max(1))
		.connect_with(options)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Run the flag schema migrations.
///
/// Migrations are idempotent - safe to run multiple times.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	let m1 = include_str!("../migrations/001_create_feature_flags.sql");
	for stmt in m1.split(';').filter(|s| !s.trim().is_empty()) {
		sqlx::query(stmt).execute(pool).await?;
	}

	tracing::debug!("flag migrations applied");
	Ok(())
}

/// Helpers for tests that need a migrated in-memory database.
pub mod testing {
	use super::*;

	/// A single-connection in-memory pool with the flag schema applied.
	///
	/// Every `:memory:` connection is its own database, so the pool is capped at one.
	pub async fn create_test_pool() -> Result<SqlitePool> {
		let options = SqliteConnectOptions::from_str(":memory:")
			.map_err(|e| FlagsServerError::Internal(e.to_string()))?
			.foreign_keys(true)
			.create_if_missing(true);

		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(options)
			.await?;

		run_migrations(&pool).await?;
		Ok(pool)
	}
}
