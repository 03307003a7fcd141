// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::{CacheBackend, CacheError};

const SCAN_BATCH: usize = 100;

/// Redis cache backend, shared between processes.
///
/// Prefix deletion walks the keyspace with `SCAN MATCH` rather than `KEYS` so the server is
/// never blocked.
pub struct RedisCache {
	connection: ConnectionManager,
	/// Optional namespace, e.g. "pilot:" stores "pilot:flag:name:SealPilot"
	namespace: String,
}

impl RedisCache {
	pub async fn new(url: &str) -> Result<Self, CacheError> {
		Self::with_prefix(url, None).await
	}

	/// Connects with an optional namespace prepended to every key.
	pub async fn with_prefix(url: &str, namespace: Option<&str>) -> Result<Self, CacheError> {
		let client = Client::open(url).map_err(backend_error)?;
		let connection = ConnectionManager::new(client).await.map_err(backend_error)?;

		Ok(Self {
			connection,
			namespace: namespace.unwrap_or("").to_string(),
		})
	}

	fn namespaced(&self, key: &str) -> String {
		format!("{}{}", self.namespace, key)
	}
}

fn backend_error(err: redis::RedisError) -> CacheError {
	CacheError::Backend(err.to_string())
}

/// Escapes the glob metacharacters understood by `MATCH`.
fn escape_pattern(raw: &str) -> String {
	let mut escaped = String::with_capacity(raw.len());
	for c in raw.chars() {
		if matches!(c, '*' | '?' | '[' | ']' | '\\') {
			escaped.push('\\');
		}
		escaped.push(c);
	}
	escaped
}

#[async_trait]
impl CacheBackend for RedisCache {
	fn name(&self) -> &'static str {
		"redis"
	}

	async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
		let mut conn = self.connection.clone();
		conn
			.get::<_, Option<String>>(self.namespaced(key))
			.await
			.map_err(backend_error)
	}

	async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
		let mut conn = self.connection.clone();
		let seconds = ttl.as_secs().max(1);
		conn
			.set_ex::<_, _, ()>(self.namespaced(key), value, seconds)
			.await
			.map_err(backend_error)
	}

	async fn delete(&self, key: &str) -> Result<(), CacheError> {
		let mut conn = self.connection.clone();
		conn
			.del::<_, ()>(self.namespaced(key))
			.await
			.map_err(backend_error)
	}

	async fn delete_by_prefix(&self, prefix: &str) -> Result<(), CacheError> {
		let mut conn = self.connection.clone();
		let pattern = format!("{}*", escape_pattern(&self.namespaced(prefix)));

		let mut cursor = 0u64;
		loop {
			let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
				.arg(cursor)
				.arg("MATCH")
				.arg(&pattern)
				.arg("COUNT")
				.arg(SCAN_BATCH)
				.query_async(&mut conn)
				.await
				.map_err(backend_error)?;

			if !batch.is_empty() {
				conn.del::<_, ()>(batch).await.map_err(backend_error)?;
			}

			cursor = next;
			if cursor == 0 {
				return Ok(());
			}
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, CacheError> {
		let mut conn = self.connection.clone();
		conn
			.exists::<_, bool>(self.namespaced(key))
			.await
			.map_err(backend_error)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_escape_pattern() {
		assert_eq!(escape_pattern("flag:"), "flag:");
		assert_eq!(escape_pattern("flag:name:a*b"), "flag:name:a\\*b");
		assert_eq!(escape_pattern("[x]?"), "\\[x\\]\\?");
	}
}
