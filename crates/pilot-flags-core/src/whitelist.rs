// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FlagsError;
use crate::flag::{validate_actor, FlagId};
use crate::version::AppVersion;

/// Maximum length of a whitelisted user identifier.
pub const MAX_USER_IDENTIFIER_LEN: usize = 100;
/// Maximum length of a user type tag.
pub const MAX_USER_TYPE_LEN: usize = 50;
/// Maximum length of a minimum version string.
pub const MAX_MIN_VERSION_LEN: usize = 20;

/// Unique identifier for a pilot whitelist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WhitelistEntryId(pub Uuid);

impl WhitelistEntryId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for WhitelistEntryId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for WhitelistEntryId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for WhitelistEntryId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Per-user grant admitting a subject into a flag's pilot population.
///
/// At most one entry exists per (`feature_flag_id`, `user_identifier`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PilotWhitelistEntry {
	pub id: WhitelistEntryId,
	pub feature_flag_id: FlagId,
	/// Customer number, username, etc.
	pub user_identifier: String,
	/// e.g., "Customer", "Employee". None matches any user type.
	pub user_type: Option<String>,
	/// Minimum app version, e.g., "1.2.0"
	pub min_version: Option<String>,
	pub expires_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub created_by: Option<String>,
}

impl PilotWhitelistEntry {
	/// Builds a new entry from a create request.
	pub fn from_request(request: CreateWhitelistEntryRequest) -> Self {
		Self {
			id: WhitelistEntryId::new(),
			feature_flag_id: request.feature_flag_id,
			user_identifier: request.user_identifier,
			user_type: request.user_type,
			min_version: request.min_version,
			expires_at: request.expires_at,
			created_at: Utc::now(),
			created_by: request.created_by,
		}
	}

	/// Checks whether this entry admits the given subject at `now`.
	///
	/// The identifier must match exactly, the entry's user type must be unset or equal to the
	/// request's, and the entry must not have expired (`expires_at` strictly after `now`).
	pub fn matches(&self, user_identifier: &str, user_type: Option<&str>, now: DateTime<Utc>) -> bool {
		if self.user_identifier != user_identifier {
			return false;
		}

		let type_ok = match non_empty(self.user_type.as_deref()) {
			None => true,
			Some(required) => non_empty(user_type) == Some(required),
		};

		type_ok && !self.is_expired_at(now)
	}

	/// Returns true once `expires_at` is at or before `now`.
	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		matches!(self.expires_at, Some(expires_at) if expires_at <= now)
	}

	/// The minimum version requirement, if any.
	pub fn required_version(&self) -> Option<&str> {
		non_empty(self.min_version.as_deref())
	}
}

/// Input for adding a subject to a flag's whitelist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateWhitelistEntryRequest {
	pub feature_flag_id: FlagId,
	pub user_identifier: String,
	#[serde(default)]
	pub user_type: Option<String>,
	#[serde(default)]
	pub min_version: Option<String>,
	#[serde(default)]
	pub expires_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub created_by: Option<String>,
}

impl CreateWhitelistEntryRequest {
	pub fn validate(&self) -> Result<(), FlagsError> {
		if self.user_identifier.trim().is_empty()
			|| self.user_identifier.chars().count() > MAX_USER_IDENTIFIER_LEN
		{
			return Err(FlagsError::Validation(format!(
				"user_identifier must be 1-{MAX_USER_IDENTIFIER_LEN} characters and not blank"
			)));
		}

		if let Some(user_type) = &self.user_type {
			if user_type.chars().count() > MAX_USER_TYPE_LEN {
				return Err(FlagsError::Validation(format!(
					"user_type must be at most {MAX_USER_TYPE_LEN} characters"
				)));
			}
		}

		if let Some(min_version) = non_empty(self.min_version.as_deref()) {
			if min_version.chars().count() > MAX_MIN_VERSION_LEN {
				return Err(FlagsError::Validation(format!(
					"min_version must be at most {MAX_MIN_VERSION_LEN} characters"
				)));
			}
			AppVersion::parse(min_version)?;
		}

		validate_actor("created_by", self.created_by.as_deref())
	}
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
	value.filter(|v| !v.is_empty())
}
