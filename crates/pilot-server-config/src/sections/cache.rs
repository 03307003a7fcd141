// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag cache configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const MIN_TTL_SECS: u64 = 1;
pub const MAX_TTL_SECS: u64 = 24 * 60 * 60;

const DEFAULT_TTL_SECS: u64 = 30 * 60;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 250;

/// Which cache backend serves flag snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
	#[default]
	Memory,
	Redis,
	None,
}

impl FromStr for CacheBackendKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"memory" => Ok(CacheBackendKind::Memory),
			"redis" => Ok(CacheBackendKind::Redis),
			"none" | "disabled" => Ok(CacheBackendKind::None),
			other => Err(format!(
				"unknown cache backend '{other}', expected memory, redis or none"
			)),
		}
	}
}

impl std::fmt::Display for CacheBackendKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CacheBackendKind::Memory => f.write_str("memory"),
			CacheBackendKind::Redis => f.write_str("redis"),
			CacheBackendKind::None => f.write_str("none"),
		}
	}
}

/// Cache configuration (runtime, fully resolved and validated).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
	pub backend: CacheBackendKind,
	/// Set whenever `backend` is `Redis`.
	pub redis_url: Option<String>,
	pub ttl: Duration,
	pub operation_timeout: Duration,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			backend: CacheBackendKind::Memory,
			redis_url: None,
			ttl: Duration::from_secs(DEFAULT_TTL_SECS),
			operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheConfigLayer {
	#[serde(default)]
	pub backend: Option<CacheBackendKind>,
	#[serde(default)]
	pub redis_url: Option<String>,
	#[serde(default)]
	pub ttl_secs: Option<u64>,
	#[serde(default)]
	pub operation_timeout_ms: Option<u64>,
}

impl CacheConfigLayer {
	pub fn merge(&mut self, other: CacheConfigLayer) {
		if other.backend.is_some() {
			self.backend = other.backend;
		}
		if other.redis_url.is_some() {
			self.redis_url = other.redis_url;
		}
		if other.ttl_secs.is_some() {
			self.ttl_secs = other.ttl_secs;
		}
		if other.operation_timeout_ms.is_some() {
			self.operation_timeout_ms = other.operation_timeout_ms;
		}
	}

	pub fn finalize(self) -> Result<CacheConfig, ConfigError> {
		let backend = self.backend.unwrap_or_default();
		let ttl_secs = self.ttl_secs.unwrap_or(DEFAULT_TTL_SECS);
		let operation_timeout_ms = self
			.operation_timeout_ms
			.unwrap_or(DEFAULT_OPERATION_TIMEOUT_MS);

		if !(MIN_TTL_SECS..=MAX_TTL_SECS).contains(&ttl_secs) {
			return Err(ConfigError::Validation(format!(
				"cache.ttl_secs must be between {MIN_TTL_SECS} and {MAX_TTL_SECS}, got {ttl_secs}"
			)));
		}

		if operation_timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"cache.operation_timeout_ms must be greater than zero".to_string(),
			));
		}

		if backend == CacheBackendKind::Redis && self.redis_url.is_none() {
			return Err(ConfigError::Validation(
				"cache.backend = \"redis\" requires cache.redis_url (PILOT_FLAGS_REDIS_URL)"
					.to_string(),
			));
		}

		Ok(CacheConfig {
			backend,
			redis_url: self.redis_url,
			ttl: Duration::from_secs(ttl_secs),
			operation_timeout: Duration::from_millis(operation_timeout_ms),
		})
	}
}
