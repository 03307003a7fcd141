// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for pilot flag core operations.

use thiserror::Error;

/// Result type for core flag operations.
pub type Result<T> = std::result::Result<T, FlagsError>;

/// Errors raised while validating or parsing flag data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagsError {
	#[error("validation failed: {0}")]
	Validation(String),

	#[error("invalid version string: {0:?}")]
	InvalidVersion(String),
}
