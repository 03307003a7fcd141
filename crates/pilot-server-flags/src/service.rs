// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Management operations on flags and whitelists, plus the check entry points.
//!
//! Every successful mutation purges the cache before returning, so a caller never sees a
//! write succeed while a stale snapshot is still served.

use std::sync::Arc;

use tracing::{info, instrument};

use pilot_flags_core::{
	CheckRequest, CheckResult, CreateFlagRequest, CreateWhitelistEntryRequest, FeatureFlag,
	FlagId, PilotWhitelistEntry, UpdateFlagRequest, WhitelistEntryId,
};

use crate::cache::{keys, FlagCache};
use crate::error::{FlagsServerError, Result};
use crate::evaluation::EvaluationEngine;
use crate::invalidation::InvalidationCoordinator;
use crate::repository::FlagStore;

#[derive(Clone)]
pub struct FlagsService {
	store: Arc<dyn FlagStore>,
	cache: FlagCache,
	engine: EvaluationEngine,
	invalidation: InvalidationCoordinator,
}

impl FlagsService {
	pub fn new(store: Arc<dyn FlagStore>, cache: FlagCache) -> Self {
		Self {
			engine: EvaluationEngine::new(store.clone(), cache.clone()),
			invalidation: InvalidationCoordinator::new(cache.clone()),
			store,
			cache,
		}
	}

	pub fn engine(&self) -> &EvaluationEngine {
		&self.engine
	}

	pub async fn check_flag(&self, request: &CheckRequest) -> CheckResult {
		self.engine.check_flag(request).await
	}

	pub async fn check_multiple(&self, requests: &[CheckRequest]) -> Vec<CheckResult> {
		self.engine.check_multiple(requests).await
	}

	// Flag operations

	#[instrument(skip(self, request), fields(flag_name = %request.name))]
	pub async fn create_flag(&self, request: CreateFlagRequest) -> Result<FeatureFlag> {
		request.validate()?;

		let flag = FeatureFlag::from_request(request);
		self.store.create_flag(&flag).await?;
		self.invalidation.invalidate_all().await;

		info!(flag_id = %flag.id, "feature flag created");
		Ok(flag)
	}

	#[instrument(skip(self), fields(flag_id = %id))]
	pub async fn get_flag_by_id(&self, id: FlagId) -> Result<Option<FeatureFlag>> {
		let key = keys::flag_by_id(id);
		if let Some(flag) = self.cache.get::<FeatureFlag>(&key).await {
			return Ok(Some(flag));
		}

		let flag = self.store.find_flag_by_id(id).await?;
		if let Some(flag) = &flag {
			self.cache.set(&key, flag).await;
		}
		Ok(flag)
	}

	/// Reads a flag straight from the store, bypassing the cache. Use this as the base of a
	/// read-modify-write so a stale snapshot is never written back.
	#[instrument(skip(self), fields(flag_id = %id))]
	pub async fn get_flag_uncached(&self, id: FlagId) -> Result<Option<FeatureFlag>> {
		self.store.find_flag_by_id(id).await
	}

	#[instrument(skip(self), fields(flag_name = %name))]
	pub async fn get_flag_by_name(&self, name: &str) -> Result<Option<FeatureFlag>> {
		self.engine.snapshot(name).await
	}

	/// All flags ordered by name.
	#[instrument(skip(self))]
	pub async fn list_flags(&self) -> Result<Vec<FeatureFlag>> {
		if let Some(flags) = self.cache.get::<Vec<FeatureFlag>>(keys::ALL_FLAGS).await {
			return Ok(flags);
		}

		let flags = self.store.list_flags().await?;
		self.cache.set(keys::ALL_FLAGS, &flags).await;
		Ok(flags)
	}

	/// Updates the description, enabled state and audit fields. Returns `None` if the flag does
	/// not exist, otherwise the flag as now stored.
	#[instrument(skip(self, update), fields(flag_id = %id))]
	pub async fn update_flag(
		&self,
		id: FlagId,
		update: UpdateFlagRequest,
	) -> Result<Option<FeatureFlag>> {
		update.validate()?;

		let Some(mut flag) = self.store.find_flag_by_id(id).await? else {
			return Ok(None);
		};

		flag.apply_update(update);
		if !self.store.update_flag(&flag).await? {
			return Ok(None);
		}
		self.invalidation.invalidate_all().await;

		info!(flag_name = %flag.name, enabled = flag.enabled, "feature flag updated");
		self.store.find_flag_by_id(id).await
	}

	/// Deletes a flag and its whitelist. Returns false if the flag does not exist.
	#[instrument(skip(self), fields(flag_id = %id))]
	pub async fn delete_flag(&self, id: FlagId) -> Result<bool> {
		let deleted = self.store.delete_flag(id).await?;
		if deleted {
			self.invalidation.invalidate_all().await;
			info!("feature flag deleted");
		}
		Ok(deleted)
	}

	// Whitelist operations

	/// Entries for one flag ordered by user identifier, read from the store.
	#[instrument(skip(self), fields(flag_id = %flag_id))]
	pub async fn list_whitelist(&self, flag_id: FlagId) -> Result<Vec<PilotWhitelistEntry>> {
		self.store.list_whitelist_entries(flag_id).await
	}

	#[instrument(
		skip(self, request),
		fields(flag_id = %request.feature_flag_id, user_identifier = %request.user_identifier)
	)]
	pub async fn add_to_whitelist(
		&self,
		request: CreateWhitelistEntryRequest,
	) -> Result<PilotWhitelistEntry> {
		request.validate()?;

		if self.store.find_flag_by_id(request.feature_flag_id).await?.is_none() {
			return Err(FlagsServerError::FlagNotFound);
		}

		let entry = PilotWhitelistEntry::from_request(request);
		self.store.create_whitelist_entry(&entry).await?;
		self.invalidation.invalidate_all().await;

		info!(entry_id = %entry.id, "user added to pilot whitelist");
		Ok(entry)
	}

	/// Returns false if the entry does not exist.
	#[instrument(skip(self), fields(entry_id = %id))]
	pub async fn remove_from_whitelist(&self, id: WhitelistEntryId) -> Result<bool> {
		let Some(entry) = self.store.find_whitelist_entry(id).await? else {
			return Ok(false);
		};

		let removed = self.store.delete_whitelist_entry(id).await?;
		if removed {
			self.invalidation.invalidate_all().await;
			info!(
				flag_id = %entry.feature_flag_id,
				user_identifier = %entry.user_identifier,
				"user removed from pilot whitelist"
			);
		}
		Ok(removed)
	}

	/// Drops every cached snapshot, then reloads the listing and each per-name snapshot from the
	/// store. Returns the number of flags cached.
	#[instrument(skip(self))]
	pub async fn refresh_cache(&self) -> Result<usize> {
		self.invalidation.invalidate_all().await;

		let flags = self.store.list_flags().await?;
		self.cache.set(keys::ALL_FLAGS, &flags).await;
		for flag in &flags {
			self.cache.set(&keys::flag_by_name(&flag.name), flag).await;
		}

		info!(count = flags.len(), "flag cache refreshed");
		Ok(flags.len())
	}
}
