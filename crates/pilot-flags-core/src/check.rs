// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::whitelist::non_empty;

/// A request to check whether a feature is active for a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
	#[serde(default)]
	pub feature_name: String,
	#[serde(default)]
	pub user_identifier: String,
	#[serde(default)]
	pub user_type: Option<String>,
	#[serde(default)]
	pub app_version: Option<String>,
}

impl CheckRequest {
	pub fn new(feature_name: impl Into<String>, user_identifier: impl Into<String>) -> Self {
		Self {
			feature_name: feature_name.into(),
			user_identifier: user_identifier.into(),
			user_type: None,
			app_version: None,
		}
	}

	pub fn with_user_type(mut self, user_type: impl Into<String>) -> Self {
		self.user_type = Some(user_type.into());
		self
	}

	pub fn with_app_version(mut self, app_version: impl Into<String>) -> Self {
		self.app_version = Some(app_version.into());
		self
	}

	/// Both the feature name and the user identifier must be present.
	pub fn has_required_fields(&self) -> bool {
		!self.feature_name.trim().is_empty() && !self.user_identifier.trim().is_empty()
	}

	pub fn user_type(&self) -> Option<&str> {
		non_empty(self.user_type.as_deref())
	}

	pub fn app_version(&self) -> Option<&str> {
		non_empty(self.app_version.as_deref())
	}
}

/// Why a check produced its decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum CheckReason {
	FlagNotFound,
	FlagDisabled,
	NotInPilotWhitelist,
	MinimumVersion { min_version: String },
	PilotUser,
	RequiredFieldsMissing,
	/// The flag could not be read; the check failed closed.
	StoreUnavailable,
}

impl std::fmt::Display for CheckReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CheckReason::FlagNotFound => f.write_str("flag not found"),
			CheckReason::FlagDisabled => f.write_str("flag disabled"),
			CheckReason::NotInPilotWhitelist => f.write_str("not in pilot whitelist"),
			CheckReason::MinimumVersion { min_version } => {
				write!(f, "minimum version requirement: {min_version}")
			}
			CheckReason::PilotUser => f.write_str("pilot user"),
			CheckReason::RequiredFieldsMissing => f.write_str("required fields missing"),
			CheckReason::StoreUnavailable => f.write_str("flag store unavailable"),
		}
	}
}

/// Outcome of a flag check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
	pub feature_name: String,
	pub is_enabled: bool,
	pub is_in_pilot: bool,
	pub reason: CheckReason,
	pub checked_at: DateTime<Utc>,
}

impl CheckResult {
	/// A denial carrying the given reason.
	pub fn deny(feature_name: impl Into<String>, reason: CheckReason) -> Self {
		Self {
			feature_name: feature_name.into(),
			is_enabled: false,
			is_in_pilot: false,
			reason,
			checked_at: Utc::now(),
		}
	}

	/// An admission for a pilot user.
	pub fn pilot(feature_name: impl Into<String>) -> Self {
		Self {
			feature_name: feature_name.into(),
			is_enabled: true,
			is_in_pilot: true,
			reason: CheckReason::PilotUser,
			checked_at: Utc::now(),
		}
	}

	/// True when two results carry the same decision, ignoring `checked_at`.
	pub fn same_decision(&self, other: &CheckResult) -> bool {
		self.feature_name == other.feature_name
			&& self.is_enabled == other.is_enabled
			&& self.is_in_pilot == other.is_in_pilot
			&& self.reason == other.reason
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_reason_messages() {
		assert_eq!(CheckReason::FlagNotFound.to_string(), "flag not found");
		assert_eq!(CheckReason::FlagDisabled.to_string(), "flag disabled");
		assert_eq!(
			CheckReason::NotInPilotWhitelist.to_string(),
			"not in pilot whitelist"
		);
		assert_eq!(
			CheckReason::MinimumVersion {
				min_version: "1.2.0".to_string()
			}
			.to_string(),
			"minimum version requirement: 1.2.0"
		);
		assert_eq!(CheckReason::PilotUser.to_string(), "pilot user");
		assert_eq!(
			CheckReason::RequiredFieldsMissing.to_string(),
			"required fields missing"
		);
	}

	#[test]
	fn test_required_fields() {
		assert!(CheckRequest::new("OpenBankingPilot", "CUST001").has_required_fields());
		assert!(!CheckRequest::new("", "CUST001").has_required_fields());
		assert!(!CheckRequest::new("OpenBankingPilot", " ").has_required_fields());
		assert!(!CheckRequest::default().has_required_fields());
	}

	#[test]
	fn test_empty_optionals_are_absent() {
		let request = CheckRequest::new("F", "U")
			.with_user_type("")
			.with_app_version("");
		assert_eq!(request.user_type(), None);
		assert_eq!(request.app_version(), None);
	}

	#[test]
	fn test_reason_serialization() {
		let json = serde_json::to_value(CheckReason::MinimumVersion {
			min_version: "1.2.0".to_string(),
		})
		.unwrap();
		assert_eq!(
			json,
			serde_json::json!({"code": "minimum_version", "min_version": "1.2.0"})
		);

		let json = serde_json::to_value(CheckReason::PilotUser).unwrap();
		assert_eq!(json, serde_json::json!({"code": "pilot_user"}));
	}

	#[test]
	fn test_request_deserializes_with_missing_fields() {
		let request: CheckRequest = serde_json::from_str(r#"{"feature_name": "F"}"#).unwrap();
		assert_eq!(request.feature_name, "F");
		assert!(!request.has_required_fields());
	}
}
