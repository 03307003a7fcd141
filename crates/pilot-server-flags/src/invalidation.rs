// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tracing::debug;

use crate::cache::{keys, FlagCache};

/// Purges cached snapshots after a mutation.
///
/// Both namespaces are dropped together: a per-flag entry and the listing may each reference
/// the mutated flag or whitelist entry.
#[derive(Clone)]
pub struct InvalidationCoordinator {
	cache: FlagCache,
}

impl InvalidationCoordinator {
	pub fn new(cache: FlagCache) -> Self {
		Self { cache }
	}

	pub async fn invalidate_all(&self) {
		self.cache.invalidate_by_prefix(keys::FLAG_PREFIX).await;
		self.cache.invalidate(keys::ALL_FLAGS).await;
		debug!("flag cache invalidated");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::test_support::FaultyCache;
	use crate::cache::FlagCacheConfig;
	use std::sync::Arc;

	#[tokio::test]
	async fn test_invalidate_all_clears_both_namespaces() {
		let cache = FlagCache::in_memory();
		cache.set(&keys::flag_by_name("A"), &1).await;
		cache.set(&keys::flag_by_id(pilot_flags_core::FlagId::new()), &2).await;
		cache.set(keys::ALL_FLAGS, &vec![1, 2]).await;
		cache.set("unrelated", &3).await;

		InvalidationCoordinator::new(cache.clone()).invalidate_all().await;

		assert!(!cache.exists(&keys::flag_by_name("A")).await);
		assert!(!cache.exists(keys::ALL_FLAGS).await);
		assert!(cache.exists("unrelated").await);
	}

	#[tokio::test]
	async fn test_invalidate_all_survives_outage() {
		let cache = FlagCache::new(Arc::new(FaultyCache::failing()), FlagCacheConfig::default());
		InvalidationCoordinator::new(cache).invalidate_all().await;
	}
}
