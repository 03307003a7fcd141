// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Demo flags for local development.

use chrono::{Duration, Utc};
use tracing::{debug, info, instrument};

use pilot_flags_core::{CreateFlagRequest, CreateWhitelistEntryRequest};

use crate::error::{FlagsServerError, Result};
use crate::service::FlagsService;

const SEED_ACTOR: &str = "system";

struct DemoEntry {
	user_identifier: &'static str,
	user_type: &'static str,
	min_version: Option<&'static str>,
	valid_days: i64,
}

struct DemoFlag {
	name: &'static str,
	description: &'static str,
	enabled: bool,
	whitelist: &'static [DemoEntry],
}

const DEMO_FLAGS: &[DemoFlag] = &[
	DemoFlag {
		name: "OpenBankingPilot",
		description: "Open banking features for pilot customers",
		enabled: true,
		whitelist: &[DemoEntry {
			user_identifier: "CUST001",
			user_type: "Customer",
			min_version: Some("1.2.0"),
			valid_days: 30,
		}],
	},
	DemoFlag {
		name: "SealSigningPilot",
		description: "Seal-based document signing",
		enabled: false,
		whitelist: &[],
	},
	DemoFlag {
		name: "SealPilot",
		description: "Seal authentication for pilot customers",
		enabled: true,
		whitelist: &[DemoEntry {
			user_identifier: "CUST002",
			user_type: "Customer",
			min_version: Some("1.1.0"),
			valid_days: 60,
		}],
	},
	DemoFlag {
		name: "SoftLoginPilot",
		description: "Soft login for internal staff",
		enabled: true,
		whitelist: &[DemoEntry {
			user_identifier: "EMP001",
			user_type: "Employee",
			min_version: None,
			valid_days: 90,
		}],
	},
];

/// Creates the demo flags and their whitelists. Existing flags keep their settings, but any
/// missing demo whitelist entry is added to them, so a partially seeded database is completed
/// on the next run.
///
/// Returns the names of the flags created.
#[instrument(skip(service))]
pub async fn seed_demo_flags(service: &FlagsService) -> Result<Vec<String>> {
	let mut created = Vec::new();

	for demo in DEMO_FLAGS {
		let flag = match service.get_flag_by_name(demo.name).await? {
			Some(flag) => {
				debug!(flag_name = demo.name, "demo flag exists");
				flag
			}
			None => {
				let flag = service
					.create_flag(CreateFlagRequest {
						name: demo.name.to_string(),
						description: Some(demo.description.to_string()),
						enabled: demo.enabled,
						created_by: Some(SEED_ACTOR.to_string()),
					})
					.await?;
				created.push(flag.name.clone());
				flag
			}
		};

		for entry in demo.whitelist {
			let request = CreateWhitelistEntryRequest {
				feature_flag_id: flag.id,
				user_identifier: entry.user_identifier.to_string(),
				user_type: Some(entry.user_type.to_string()),
				min_version: entry.min_version.map(str::to_string),
				expires_at: Some(Utc::now() + Duration::days(entry.valid_days)),
				created_by: Some(SEED_ACTOR.to_string()),
			};
			match service.add_to_whitelist(request).await {
				Ok(_) => {}
				Err(FlagsServerError::DuplicateEntry { user_identifier }) => {
					debug!(flag_name = demo.name, %user_identifier, "demo whitelist entry exists");
				}
				Err(e) => return Err(e),
			}
		}
	}

	info!(count = created.len(), "demo flags seeded");
	Ok(created)
}
