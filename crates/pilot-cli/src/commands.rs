// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Subcommand execution. Results are written to stdout as JSON.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use pilot_server_config::{CacheBackendKind, CacheConfig, FlagsConfig};
use pilot_server_flags::db::{create_pool, run_migrations};
use pilot_server_flags::{
	seed_demo_flags, CacheBackend, CheckRequest, CreateFlagRequest, CreateWhitelistEntryRequest,
	FeatureFlag, FlagCache, FlagCacheConfig, FlagId, FlagsService, InMemoryCache, NoopCache,
	SqliteFlagStore, UpdateFlagRequest, WhitelistEntryId,
};

use crate::{CacheCommand, Command, FlagsCommand, WhitelistCommand};

/// Opens the store and cache described by `config`.
pub(crate) async fn open_service(config: &FlagsConfig) -> anyhow::Result<FlagsService> {
	let pool = create_pool(&config.database.url, config.database.max_connections)
		.await
		.with_context(|| format!("opening database {}", config.database.url))?;
	run_migrations(&pool).await?;

	let cache = build_cache(&config.cache).await?;
	info!(cache_backend = cache.backend_name(), "flag service ready");

	Ok(FlagsService::new(Arc::new(SqliteFlagStore::new(pool)), cache))
}

async fn build_cache(config: &CacheConfig) -> anyhow::Result<FlagCache> {
	let backend: Arc<dyn CacheBackend> = match config.backend {
		CacheBackendKind::Memory => Arc::new(InMemoryCache::new()),
		CacheBackendKind::None => Arc::new(NoopCache),
		CacheBackendKind::Redis => redis_backend(config).await?,
	};

	Ok(FlagCache::new(
		backend,
		FlagCacheConfig {
			ttl: config.ttl,
			operation_timeout: config.operation_timeout,
		},
	))
}

#[cfg(feature = "redis")]
async fn redis_backend(config: &CacheConfig) -> anyhow::Result<Arc<dyn CacheBackend>> {
	let Some(url) = config.redis_url.as_deref() else {
		bail!("cache.backend = \"redis\" requires cache.redis_url");
	};
	let cache = pilot_server_flags::RedisCache::with_prefix(url, Some("pilot:")).await?;
	Ok(Arc::new(cache))
}

#[cfg(not(feature = "redis"))]
async fn redis_backend(_config: &CacheConfig) -> anyhow::Result<Arc<dyn CacheBackend>> {
	bail!("pilot-flags was built without redis support; rebuild with `--features redis`")
}

pub(crate) async fn run(service: &FlagsService, command: Command) -> anyhow::Result<()> {
	match command {
		Command::Check {
			feature_name,
			user_identifier,
			user_type,
			app_version,
		} => {
			let request = CheckRequest {
				feature_name,
				user_identifier,
				user_type,
				app_version,
			};
			print_json(&service.check_flag(&request).await)
		}
		Command::CheckBatch { file } => {
			let requests = read_batch(&file)?;
			print_json(&service.check_multiple(&requests).await)
		}
		Command::Flags(command) => run_flags(service, command).await,
		Command::Whitelist(command) => run_whitelist(service, command).await,
		Command::Cache(CacheCommand::Refresh) => {
			let count = service.refresh_cache().await?;
			print_json(&serde_json::json!({ "refreshed": count }))
		}
		Command::Seed => {
			let created = seed_demo_flags(service).await?;
			print_json(&serde_json::json!({ "created": created }))
		}
		Command::Version => {
			println!("{}", crate::format_version_info());
			Ok(())
		}
	}
}

async fn run_flags(service: &FlagsService, command: FlagsCommand) -> anyhow::Result<()> {
	match command {
		FlagsCommand::List => print_json(&service.list_flags().await?),
		FlagsCommand::Get { flag } => print_json(&resolve_flag(service, &flag).await?),
		FlagsCommand::Create {
			name,
			description,
			enabled,
			created_by,
		} => {
			let flag = service
				.create_flag(CreateFlagRequest {
					name,
					description,
					enabled,
					created_by,
				})
				.await?;
			print_json(&flag)
		}
		FlagsCommand::Update {
			flag,
			description,
			enabled,
			updated_by,
		} => {
			let id = resolve_flag(service, &flag).await?.id;
			let current = service
				.get_flag_uncached(id)
				.await?
				.with_context(|| format!("feature flag not found: {flag}"))?;
			let update = UpdateFlagRequest {
				description: description.or(current.description),
				enabled: enabled.unwrap_or(current.enabled),
				updated_by,
			};
			match service.update_flag(current.id, update).await? {
				Some(updated) => print_json(&updated),
				None => bail!("feature flag not found: {flag}"),
			}
		}
		FlagsCommand::Delete { flag } => {
			let current = resolve_flag(service, &flag).await?;
			let deleted = service.delete_flag(current.id).await?;
			print_json(&serde_json::json!({ "deleted": deleted, "id": current.id }))
		}
	}
}

async fn run_whitelist(service: &FlagsService, command: WhitelistCommand) -> anyhow::Result<()> {
	match command {
		WhitelistCommand::List { flag } => {
			let flag = resolve_flag(service, &flag).await?;
			print_json(&service.list_whitelist(flag.id).await?)
		}
		WhitelistCommand::Add {
			flag,
			user_identifier,
			user_type,
			min_version,
			expires_at,
			expires_in_days,
			created_by,
		} => {
			let flag = resolve_flag(service, &flag).await?;
			let expires_at = match (expires_at, expires_in_days) {
				(Some(at), _) => Some(at),
				(None, Some(days)) => Some(expiry_in_days(days)?),
				(None, None) => None,
			};
			let entry = service
				.add_to_whitelist(CreateWhitelistEntryRequest {
					feature_flag_id: flag.id,
					user_identifier,
					user_type,
					min_version,
					expires_at,
					created_by,
				})
				.await?;
			print_json(&entry)
		}
		WhitelistCommand::Remove { entry_id } => {
			let removed = service
				.remove_from_whitelist(WhitelistEntryId(entry_id))
				.await?;
			print_json(&serde_json::json!({ "removed": removed, "id": entry_id }))
		}
	}
}

fn expiry_in_days(days: i64) -> anyhow::Result<DateTime<Utc>> {
	Duration::try_days(days)
		.and_then(|delta| Utc::now().checked_add_signed(delta))
		.with_context(|| format!("--expires-in-days {days} is out of range"))
}

/// Looks a flag up by id when the argument is a UUID, otherwise by name.
async fn resolve_flag(service: &FlagsService, flag: &str) -> anyhow::Result<FeatureFlag> {
	let found = match flag.parse::<FlagId>() {
		Ok(id) => service.get_flag_by_id(id).await?,
		Err(_) => service.get_flag_by_name(flag).await?,
	};
	found.with_context(|| format!("feature flag not found: {flag}"))
}

fn read_batch(path: &Path) -> anyhow::Result<Vec<CheckRequest>> {
	let content = if path == Path::new("-") {
		let mut buf = String::new();
		std::io::stdin().read_to_string(&mut buf)?;
		buf
	} else {
		std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
	};

	serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use pilot_server_config::DatabaseConfig;
	use std::io::Write;

	fn test_config(dir: &Path) -> FlagsConfig {
		FlagsConfig {
			database: DatabaseConfig {
				url: format!("sqlite:{}", dir.join("flags.db").display()),
				max_connections: 1,
			},
			..Default::default()
		}
	}

	#[test]
	fn test_read_batch() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"[
				{{"feature_name": "OpenBankingPilot", "user_identifier": "CUST001", "app_version": "1.2.0"}},
				{{"feature_name": "SealPilot"}}
			]"#
		)
		.unwrap();

		let requests = read_batch(file.path()).unwrap();
		assert_eq!(requests.len(), 2);
		assert_eq!(requests[0].app_version.as_deref(), Some("1.2.0"));
		assert!(!requests[1].has_required_fields());
	}

	#[test]
	fn test_read_batch_rejects_non_array() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{"feature_name": "SealPilot"}}"#).unwrap();
		assert!(read_batch(file.path()).is_err());
	}

	#[test]
	fn test_expiry_in_days() {
		let expiry = expiry_in_days(30).unwrap();
		assert!(expiry > Utc::now() + Duration::days(29));

		assert!(expiry_in_days(i64::MAX).is_err());
		assert!(expiry_in_days(i64::MIN).is_err());
		assert!(expiry_in_days(1_000_000_000).is_err());
	}

	#[tokio::test]
	async fn test_build_cache_backends() {
		let memory = build_cache(&CacheConfig::default()).await.unwrap();
		assert_eq!(memory.backend_name(), "memory");

		let none = build_cache(&CacheConfig {
			backend: CacheBackendKind::None,
			..Default::default()
		})
		.await
		.unwrap();
		assert_eq!(none.backend_name(), "none");
	}

	#[tokio::test]
	async fn test_resolve_flag_by_name_and_id() {
		let dir = tempfile::tempdir().unwrap();
		let service = open_service(&test_config(dir.path())).await.unwrap();
		seed_demo_flags(&service).await.unwrap();

		let by_name = resolve_flag(&service, "SealPilot").await.unwrap();
		let by_id = resolve_flag(&service, &by_name.id.to_string()).await.unwrap();
		assert_eq!(by_name.id, by_id.id);
		assert!(resolve_flag(&service, "Missing").await.is_err());
	}

	#[tokio::test]
	async fn test_update_keeps_unset_fields() {
		let dir = tempfile::tempdir().unwrap();
		let service = open_service(&test_config(dir.path())).await.unwrap();
		seed_demo_flags(&service).await.unwrap();

		run_flags(
			&service,
			FlagsCommand::Update {
				flag: "SealPilot".to_string(),
				description: None,
				enabled: Some(false),
				updated_by: Some("ops".to_string()),
			},
		)
		.await
		.unwrap();

		let flag = resolve_flag(&service, "SealPilot").await.unwrap();
		assert!(!flag.enabled);
		assert_eq!(
			flag.description.as_deref(),
			Some("Seal authentication for pilot customers")
		);
	}

	#[tokio::test]
	async fn test_update_reads_description_from_store() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path());
		let pool = create_pool(&config.database.url, 1).await.unwrap();
		run_migrations(&pool).await.unwrap();
		let cache = FlagCache::in_memory();
		let service = FlagsService::new(Arc::new(SqliteFlagStore::new(pool)), cache.clone());
		seed_demo_flags(&service).await.unwrap();

		let mut stale = service.get_flag_by_name("SealPilot").await.unwrap().unwrap();
		stale.description = Some("stale".to_string());
		cache
			.set(&pilot_server_flags::cache::keys::flag_by_name("SealPilot"), &stale)
			.await;

		run_flags(
			&service,
			FlagsCommand::Update {
				flag: "SealPilot".to_string(),
				description: None,
				enabled: Some(false),
				updated_by: None,
			},
		)
		.await
		.unwrap();

		let stored = service.get_flag_uncached(stale.id).await.unwrap().unwrap();
		assert!(!stored.enabled);
		assert_eq!(
			stored.description.as_deref(),
			Some("Seal authentication for pilot customers")
		);
	}
}
