// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for flag server operations.

use pilot_flags_core::FlagsError;
use thiserror::Error;

/// Result type for flag server operations.
pub type Result<T> = std::result::Result<T, FlagsServerError>;

/// Errors surfaced by the store and the management operations.
///
/// Cache faults never appear here; they are absorbed by the cache-aside layer.
#[derive(Debug, Error)]
pub enum FlagsServerError {
	#[error("feature flag not found")]
	FlagNotFound,

	#[error("feature flag name already exists: {0}")]
	DuplicateName(String),

	#[error("user {user_identifier} is already whitelisted for this flag")]
	DuplicateEntry { user_identifier: String },

	#[error("validation failed: {0}")]
	Validation(String),

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("internal error: {0}")]
	Internal(String),
}

impl From<FlagsError> for FlagsServerError {
	fn from(err: FlagsError) -> Self {
		match err {
			FlagsError::Validation(message) => FlagsServerError::Validation(message),
			FlagsError::InvalidVersion(version) => {
				FlagsServerError::Validation(format!("invalid min_version: {version:?}"))
			}
		}
	}
}

/// Returns true if the error is an SQLite uniqueness violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
	match err {
		sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
		_ => false,
	}
}
