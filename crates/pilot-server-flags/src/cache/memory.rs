// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{CacheBackend, CacheError};

#[derive(Debug, Clone)]
struct CacheEntry {
	value: String,
	expires_at: Instant,
}

/// Process-local cache backend with per-entry expiry.
///
/// Expired entries are dropped lazily on read, or in bulk by [`InMemoryCache::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryCache {
	entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored entries, including expired ones not yet purged.
	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}

	/// Drops every expired entry.
	pub async fn purge_expired(&self) {
		let now = Instant::now();
		self.entries.write().await.retain(|_, entry| entry.expires_at > now);
	}
}

#[async_trait]
impl CacheBackend for InMemoryCache {
	fn name(&self) -> &'static str {
		"memory"
	}

	async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
		let now = Instant::now();
		{
			let entries = self.entries.read().await;
			match entries.get(key) {
				Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
				Some(_) => {}
				None => return Ok(None),
			}
		}

		let mut entries = self.entries.write().await;
		if matches!(entries.get(key), Some(entry) if entry.expires_at <= now) {
			entries.remove(key);
		}
		Ok(None)
	}

	async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
		let expires_at = Instant::now()
			.checked_add(ttl)
			.ok_or_else(|| CacheError::Backend(format!("ttl out of range: {ttl:?}")))?;
		self
			.entries
			.write()
			.await
			.insert(key.to_string(), CacheEntry { value, expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), CacheError> {
		self.entries.write().await.remove(key);
		Ok(())
	}

	async fn delete_by_prefix(&self, prefix: &str) -> Result<(), CacheError> {
		self
			.entries
			.write()
			.await
			.retain(|key, _| !key.starts_with(prefix));
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, CacheError> {
		let now = Instant::now();
		Ok(matches!(
			self.entries.read().await.get(key),
			Some(entry) if entry.expires_at > now
		))
	}
}

/// Backend used when caching is switched off. Stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl CacheBackend for NoopCache {
	fn name(&self) -> &'static str {
		"none"
	}

	async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
		Ok(None)
	}

	async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
		Ok(())
	}

	async fn delete(&self, _key: &str) -> Result<(), CacheError> {
		Ok(())
	}

	async fn delete_by_prefix(&self, _prefix: &str) -> Result<(), CacheError> {
		Ok(())
	}

	async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
		Ok(false)
	}
}
