// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FlagsError;
use crate::whitelist::PilotWhitelistEntry;

/// Maximum length of a flag name.
pub const MAX_NAME_LEN: usize = 100;
/// Maximum length of a flag description.
pub const MAX_DESCRIPTION_LEN: usize = 500;
/// Maximum length of an audit actor (`created_by` / `updated_by`).
pub const MAX_ACTOR_LEN: usize = 50;

/// Unique identifier for a feature flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlagId(pub Uuid);

impl FlagId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for FlagId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for FlagId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for FlagId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// A named boolean toggle with an optional pilot population.
///
/// A flag loaded together with its whitelist is the snapshot the evaluation engine caches.
/// Entries are owned by value and refer back to the flag only through `feature_flag_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
	pub id: FlagId,
	/// Unique and immutable after creation, e.g. "OpenBankingPilot"
	pub name: String,
	pub description: Option<String>,
	pub enabled: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: Option<DateTime<Utc>>,
	pub created_by: Option<String>,
	pub updated_by: Option<String>,
	/// Ordered by `user_identifier`.
	#[serde(default)]
	pub whitelist: Vec<PilotWhitelistEntry>,
}

impl FeatureFlag {
	/// Builds a new flag from a create request. The whitelist starts empty.
	pub fn from_request(request: CreateFlagRequest) -> Self {
		Self {
			id: FlagId::new(),
			name: request.name,
			description: request.description,
			enabled: request.enabled,
			created_at: Utc::now(),
			updated_at: None,
			created_by: request.created_by,
			updated_by: None,
			whitelist: Vec::new(),
		}
	}

	/// Applies an update. The name is never touched.
	pub fn apply_update(&mut self, update: UpdateFlagRequest) {
		self.description = update.description;
		self.enabled = update.enabled;
		self.updated_by = update.updated_by;
		self.updated_at = Some(Utc::now());
	}

	/// Validates a flag name: 1-100 characters, not blank.
	pub fn validate_name(name: &str) -> bool {
		!name.trim().is_empty() && name.chars().count() <= MAX_NAME_LEN
	}
}

/// Input for creating a flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateFlagRequest {
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub enabled: bool,
	#[serde(default)]
	pub created_by: Option<String>,
}

impl CreateFlagRequest {
	pub fn validate(&self) -> Result<(), FlagsError> {
		if !FeatureFlag::validate_name(&self.name) {
			return Err(FlagsError::Validation(format!(
				"name must be 1-{MAX_NAME_LEN} characters and not blank"
			)));
		}
		validate_description(self.description.as_deref())?;
		validate_actor("created_by", self.created_by.as_deref())
	}
}

/// Input for updating a flag. Only the description, enabled state and audit fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateFlagRequest {
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub enabled: bool,
	#[serde(default)]
	pub updated_by: Option<String>,
}

impl UpdateFlagRequest {
	pub fn validate(&self) -> Result<(), FlagsError> {
		validate_description(self.description.as_deref())?;
		validate_actor("updated_by", self.updated_by.as_deref())
	}
}

fn validate_description(description: Option<&str>) -> Result<(), FlagsError> {
	match description {
		Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN => Err(FlagsError::Validation(format!(
			"description must be at most {MAX_DESCRIPTION_LEN} characters"
		))),
		_ => Ok(()),
	}
}

pub(crate) fn validate_actor(field: &str, actor: Option<&str>) -> Result<(), FlagsError> {
	match actor {
		Some(a) if a.chars().count() > MAX_ACTOR_LEN => Err(FlagsError::Validation(format!(
			"{field} must be at most {MAX_ACTOR_LEN} characters"
		))),
		_ => Ok(()),
	}
}
