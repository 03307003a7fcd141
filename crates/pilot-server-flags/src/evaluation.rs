// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use pilot_flags_core::{is_at_least, CheckReason, CheckRequest, CheckResult, FeatureFlag};

use crate::cache::{keys, FlagCache};
use crate::error::Result;
use crate::repository::FlagStore;

/// Decides whether a flag is active for a request.
///
/// The evaluation order is:
/// 1. Flag must exist
/// 2. Flag must be enabled
/// 3. A whitelist entry must match the user (identifier, user type, not expired)
/// 4. The matched entry's minimum version must be met, when both versions are given
/// 5. Otherwise the user is a pilot user
pub fn evaluate_pilot(
	flag: Option<&FeatureFlag>,
	request: &CheckRequest,
	now: DateTime<Utc>,
) -> CheckResult {
	let name = request.feature_name.as_str();

	let Some(flag) = flag else {
		return CheckResult::deny(name, CheckReason::FlagNotFound);
	};

	if !flag.enabled {
		return CheckResult::deny(name, CheckReason::FlagDisabled);
	}

	let entry = flag
		.whitelist
		.iter()
		.find(|entry| entry.matches(&request.user_identifier, request.user_type(), now));

	let Some(entry) = entry else {
		return CheckResult::deny(name, CheckReason::NotInPilotWhitelist);
	};

	// The gate only applies when both sides are present; a malformed version fails closed.
	if let (Some(min_version), Some(app_version)) = (entry.required_version(), request.app_version())
	{
		if !is_at_least(app_version, min_version) {
			return CheckResult::deny(
				name,
				CheckReason::MinimumVersion {
					min_version: min_version.to_string(),
				},
			);
		}
	}

	CheckResult::pilot(name)
}

/// Evaluates checks against snapshots read through the cache.
#[derive(Clone)]
pub struct EvaluationEngine {
	store: Arc<dyn FlagStore>,
	cache: FlagCache,
}

impl EvaluationEngine {
	pub fn new(store: Arc<dyn FlagStore>, cache: FlagCache) -> Self {
		Self { store, cache }
	}

	/// Checks a single request. Never fails: faults deny with a reason.
	#[instrument(skip(self, request), fields(flag_name = %request.feature_name))]
	pub async fn check_flag(&self, request: &CheckRequest) -> CheckResult {
		if !request.has_required_fields() {
			return CheckResult::deny(&request.feature_name, CheckReason::RequiredFieldsMissing);
		}

		let snapshot = match self.snapshot(&request.feature_name).await {
			Ok(snapshot) => snapshot,
			Err(e) => {
				warn!(error = %e, "failed to load flag, denying");
				return CheckResult::deny(&request.feature_name, CheckReason::StoreUnavailable);
			}
		};

		let result = evaluate_pilot(snapshot.as_ref(), request, Utc::now());
		debug!(
			is_enabled = result.is_enabled,
			reason = %result.reason,
			"flag checked"
		);
		result
	}

	/// Checks each request independently, in order.
	pub async fn check_multiple(&self, requests: &[CheckRequest]) -> Vec<CheckResult> {
		let mut results = Vec::with_capacity(requests.len());
		for request in requests {
			results.push(self.check_flag(request).await);
		}
		results
	}

	/// Returns the flag snapshot for `name`, populating the cache on a miss.
	///
	/// Absence is not cached; a created flag becomes visible on the next read.
	pub async fn snapshot(&self, name: &str) -> Result<Option<FeatureFlag>> {
		let key = keys::flag_by_name(name);
		if let Some(flag) = self.cache.get::<FeatureFlag>(&key).await {
			return Ok(Some(flag));
		}

		let flag = self.store.find_flag_by_name(name).await?;
		if let Some(flag) = &flag {
			self.cache.set(&key, flag).await;
		}
		Ok(flag)
	}
}
