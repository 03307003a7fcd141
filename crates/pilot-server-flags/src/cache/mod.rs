// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cache-aside layer in front of the flag store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌─────────────────────────────┐      ┌──────────────────┐
//! │ EvaluationEngine │ ───> │ FlagCache                   │ ───> │ dyn CacheBackend │
//! │ FlagsService     │      │ JSON values, timeouts,      │      │ memory / redis / │
//! └──────────────────┘      │ faults degrade to miss/no-op│      │ none             │
//!                           └─────────────────────────────┘      └──────────────────┘
//! ```
//!
//! Backends report failures as [`CacheError`]; [`FlagCache`] never returns one. Cache
//! availability affects latency only: a lookup that fails is a miss, and a write or
//! removal that fails is dropped after a warning.
//!
//! Two namespaces are kept: per-flag entries under [`keys::FLAG_PREFIX`] and the
//! [`keys::ALL_FLAGS`] listing.

mod memory;
#[cfg(feature = "redis")]
mod redis_backend;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub use memory::{InMemoryCache, NoopCache};
#[cfg(feature = "redis")]
pub use redis_backend::RedisCache;

/// Default time-to-live for cached snapshots.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Default upper bound on a single backend call.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(250);

/// Cache key layout.
pub mod keys {
	use pilot_flags_core::FlagId;

	/// Prefix shared by every per-flag entry.
	pub const FLAG_PREFIX: &str = "flag:";

	/// Key of the listing of all flags.
	pub const ALL_FLAGS: &str = "all_flags";

	pub fn flag_by_name(name: &str) -> String {
		format!("{FLAG_PREFIX}name:{name}")
	}

	pub fn flag_by_id(id: FlagId) -> String {
		format!("{FLAG_PREFIX}id:{id}")
	}
}

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
	#[error("cache backend error: {0}")]
	Backend(String),

	#[error("cache operation timed out after {0:?}")]
	Timeout(Duration),
}

/// Key/value storage with TTL and prefix deletion. Holds no business logic.
#[async_trait]
pub trait CacheBackend: Send + Sync {
	fn name(&self) -> &'static str;
	async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
	async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
	async fn delete(&self, key: &str) -> Result<(), CacheError>;
	async fn delete_by_prefix(&self, prefix: &str) -> Result<(), CacheError>;
	async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}

/// Settings for the cache-aside layer.
#[derive(Debug, Clone, Copy)]
pub struct FlagCacheConfig {
	pub ttl: Duration,
	pub operation_timeout: Duration,
}

impl Default for FlagCacheConfig {
	fn default() -> Self {
		Self {
			ttl: DEFAULT_TTL,
			operation_timeout: DEFAULT_OPERATION_TIMEOUT,
		}
	}
}

/// Best-effort typed cache over a [`CacheBackend`].
#[derive(Clone)]
pub struct FlagCache {
	backend: Arc<dyn CacheBackend>,
	config: FlagCacheConfig,
}

impl FlagCache {
	pub fn new(backend: Arc<dyn CacheBackend>, config: FlagCacheConfig) -> Self {
		Self { backend, config }
	}

	/// An in-memory cache with default settings.
	pub fn in_memory() -> Self {
		Self::new(Arc::new(InMemoryCache::new()), FlagCacheConfig::default())
	}

	/// A cache that stores nothing; every lookup misses.
	pub fn disabled() -> Self {
		Self::new(Arc::new(NoopCache), FlagCacheConfig::default())
	}

	pub fn ttl(&self) -> Duration {
		self.config.ttl
	}

	pub fn backend_name(&self) -> &'static str {
		self.backend.name()
	}

	/// Returns the cached value, or `None` on a miss, a backend fault, or an undecodable value.
	pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
		let raw = self.guarded("get", key, self.backend.get(key)).await.flatten();

		let Some(raw) = raw else {
			debug!(key, "cache miss");
			return None;
		};

		match serde_json::from_str(&raw) {
			Ok(value) => {
				debug!(key, "cache hit");
				Some(value)
			}
			Err(e) => {
				warn!(key, error = %e, "discarding undecodable cache entry");
				self.invalidate(key).await;
				None
			}
		}
	}

	/// Stores a value with the configured TTL.
	pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
		self.set_with_ttl(key, value, self.config.ttl).await;
	}

	/// Stores a value with an explicit TTL. Failures are logged and dropped.
	pub async fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
		let raw = match serde_json::to_string(value) {
			Ok(raw) => raw,
			Err(e) => {
				warn!(key, error = %e, "failed to encode cache entry");
				return;
			}
		};

		self.guarded("set", key, self.backend.set(key, raw, ttl)).await;
	}

	/// Removes one key. Failures are logged and dropped.
	pub async fn invalidate(&self, key: &str) {
		self.guarded("delete", key, self.backend.delete(key)).await;
	}

	/// Removes every key starting with `prefix`. Failures are logged and dropped.
	pub async fn invalidate_by_prefix(&self, prefix: &str) {
		self
			.guarded("delete_by_prefix", prefix, self.backend.delete_by_prefix(prefix))
			.await;
	}

	/// Returns false on a backend fault.
	pub async fn exists(&self, key: &str) -> bool {
		self
			.guarded("exists", key, self.backend.exists(key))
			.await
			.unwrap_or(false)
	}

	async fn guarded<T, F>(&self, op: &'static str, key: &str, fut: F) -> Option<T>
	where
		F: Future<Output = Result<T, CacheError>>,
	{
		let timeout = self.config.operation_timeout;
		let outcome = match tokio::time::timeout(timeout, fut).await {
			Ok(result) => result,
			Err(_) => Err(CacheError::Timeout(timeout)),
		};

		match outcome {
			Ok(value) => Some(value),
			Err(e) => {
				warn!(
					backend = self.backend.name(),
					op,
					key,
					error = %e,
					"cache operation failed, continuing without cache"
				);
				None
			}
		}
	}
}
