// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::instrument;

use pilot_flags_core::{FeatureFlag, FlagId, PilotWhitelistEntry, WhitelistEntryId};

use crate::error::{is_unique_violation, FlagsServerError, Result};

/// Durable storage for flags and their pilot whitelists.
///
/// The store owns identity and uniqueness: flag names are unique, and a subject has at
/// most one whitelist entry per flag. Flags returned by the `find_*` and `list_*`
/// methods carry their whitelist, ordered by `user_identifier`.
#[async_trait]
pub trait FlagStore: Send + Sync {
	// Flag operations
	async fn create_flag(&self, flag: &FeatureFlag) -> Result<()>;
	async fn find_flag_by_id(&self, id: FlagId) -> Result<Option<FeatureFlag>>;
	async fn find_flag_by_name(&self, name: &str) -> Result<Option<FeatureFlag>>;
	/// All flags ordered by name.
	async fn list_flags(&self) -> Result<Vec<FeatureFlag>>;
	/// Persists `description`, `enabled` and the update audit fields. Returns false if the
	/// flag does not exist.
	async fn update_flag(&self, flag: &FeatureFlag) -> Result<bool>;
	/// Deletes the flag and every whitelist entry it owns.
	async fn delete_flag(&self, id: FlagId) -> Result<bool>;

	// Whitelist operations
	async fn create_whitelist_entry(&self, entry: &PilotWhitelistEntry) -> Result<()>;
	async fn find_whitelist_entry(&self, id: WhitelistEntryId)
		-> Result<Option<PilotWhitelistEntry>>;
	async fn delete_whitelist_entry(&self, id: WhitelistEntryId) -> Result<bool>;
	/// Entries for one flag ordered by `user_identifier`.
	async fn list_whitelist_entries(&self, flag_id: FlagId) -> Result<Vec<PilotWhitelistEntry>>;
}

/// SQLite implementation of the flag store.
#[derive(Clone)]
pub struct SqliteFlagStore {
	pool: SqlitePool,
}

impl SqliteFlagStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl FlagStore for SqliteFlagStore {
	#[instrument(skip(self, flag), fields(flag_id = %flag.id, flag_name = %flag.name))]
	async fn create_flag(&self, flag: &FeatureFlag) -> Result<()> {
		let result = sqlx::query(
			r#"
			INSERT INTO feature_flags (id, name, description, enabled, created_at, updated_at,
									   created_by, updated_by)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(flag.id.0.to_string())
		.bind(&flag.name)
		.bind(&flag.description)
		.bind(flag.enabled)
		.bind(flag.created_at.to_rfc3339())
		.bind(flag.updated_at.map(|dt| dt.to_rfc3339()))
		.bind(&flag.created_by)
		.bind(&flag.updated_by)
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => Ok(()),
			Err(e) if is_unique_violation(&e) => Err(FlagsServerError::DuplicateName(flag.name.clone())),
			Err(e) => Err(e.into()),
		}
	}

	#[instrument(skip(self), fields(flag_id = %id))]
	async fn find_flag_by_id(&self, id: FlagId) -> Result<Option<FeatureFlag>> {
		let mut tx = self.pool.begin().await?;

		let row = sqlx::query_as::<_, FlagRow>(
			r#"
			SELECT id, name, description, enabled, created_at, updated_at, created_by, updated_by
			FROM feature_flags
			WHERE id = ?
			"#,
		)
		.bind(id.0.to_string())
		.fetch_optional(&mut *tx)
		.await?;

		let flag = match row {
			Some(row) => {
				let whitelist = select_whitelist(&mut tx, &row.id).await?;
				Some(row.into_flag(whitelist)?)
			}
			None => None,
		};

		tx.commit().await?;
		Ok(flag)
	}

	#[instrument(skip(self), fields(flag_name = %name))]
	async fn find_flag_by_name(&self, name: &str) -> Result<Option<FeatureFlag>> {
		let mut tx = self.pool.begin().await?;

		let row = sqlx::query_as::<_, FlagRow>(
			r#"
			SELECT id, name, description, enabled, created_at, updated_at, created_by, updated_by
			FROM feature_flags
			WHERE name = ?
			"#,
		)
		.bind(name)
		.fetch_optional(&mut *tx)
		.await?;

		let flag = match row {
			Some(row) => {
				let whitelist = select_whitelist(&mut tx, &row.id).await?;
				Some(row.into_flag(whitelist)?)
			}
			None => None,
		};

		tx.commit().await?;
		Ok(flag)
	}

	#[instrument(skip(self))]
	async fn list_flags(&self) -> Result<Vec<FeatureFlag>> {
		let mut tx = self.pool.begin().await?;

		let rows = sqlx::query_as::<_, FlagRow>(
			r#"
			SELECT id, name, description, enabled, created_at, updated_at, created_by, updated_by
			FROM feature_flags
			ORDER BY name ASC
			"#,
		)
		.fetch_all(&mut *tx)
		.await?;

		let entry_rows = sqlx::query_as::<_, WhitelistRow>(
			r#"
			SELECT id, feature_flag_id, user_identifier, user_type, min_version, expires_at,
				   created_at, created_by
			FROM pilot_whitelist
			ORDER BY user_identifier ASC
			"#,
		)
		.fetch_all(&mut *tx)
		.await?;

		tx.commit().await?;

		let mut by_flag: HashMap<String, Vec<PilotWhitelistEntry>> = HashMap::new();
		for row in entry_rows {
			let flag_id = row.feature_flag_id.clone();
			by_flag.entry(flag_id).or_default().push(row.try_into()?);
		}

		rows
			.into_iter()
			.map(|row| {
				let whitelist = by_flag.remove(&row.id).unwrap_or_default();
				row.into_flag(whitelist)
			})
			.collect()
	}

	#[instrument(skip(self, flag), fields(flag_id = %flag.id))]
	async fn update_flag(&self, flag: &FeatureFlag) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE feature_flags
			SET description = ?, enabled = ?, updated_at = ?, updated_by = ?
			WHERE id = ?
			"#,
		)
		.bind(&flag.description)
		.bind(flag.enabled)
		.bind(flag.updated_at.map(|dt| dt.to_rfc3339()))
		.bind(&flag.updated_by)
		.bind(flag.id.0.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[instrument(skip(self), fields(flag_id = %id))]
	async fn delete_flag(&self, id: FlagId) -> Result<bool> {
		let mut tx = self.pool.begin().await?;

		sqlx::query("DELETE FROM pilot_whitelist WHERE feature_flag_id = ?")
			.bind(id.0.to_string())
			.execute(&mut *tx)
			.await?;

		let result = sqlx::query("DELETE FROM feature_flags WHERE id = ?")
			.bind(id.0.to_string())
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;

		Ok(result.rows_affected() > 0)
	}

	#[instrument(skip(self, entry), fields(entry_id = %entry.id, flag_id = %entry.feature_flag_id))]
	async fn create_whitelist_entry(&self, entry: &PilotWhitelistEntry) -> Result<()> {
		let result = sqlx::query(
			r#"
			INSERT INTO pilot_whitelist (id, feature_flag_id, user_identifier, user_type,
										 min_version, expires_at, created_at, created_by)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(entry.id.0.to_string())
		.bind(entry.feature_flag_id.0.to_string())
		.bind(&entry.user_identifier)
		.bind(&entry.user_type)
		.bind(&entry.min_version)
		.bind(entry.expires_at.map(|dt| dt.to_rfc3339()))
		.bind(entry.created_at.to_rfc3339())
		.bind(&entry.created_by)
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => Ok(()),
			Err(e) if is_unique_violation(&e) => Err(FlagsServerError::DuplicateEntry {
				user_identifier: entry.user_identifier.clone(),
			}),
			Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
				Err(FlagsServerError::FlagNotFound)
			}
			Err(e) => Err(e.into()),
		}
	}

	#[instrument(skip(self), fields(entry_id = %id))]
	async fn find_whitelist_entry(
		&self,
		id: WhitelistEntryId,
	) -> Result<Option<PilotWhitelistEntry>> {
		let row = sqlx::query_as::<_, WhitelistRow>(
			r#"
			SELECT id, feature_flag_id, user_identifier, user_type, min_version, expires_at,
				   created_at, created_by
			FROM pilot_whitelist
			WHERE id = ?
			"#,
		)
		.bind(id.0.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[instrument(skip(self), fields(entry_id = %id))]
	async fn delete_whitelist_entry(&self, id: WhitelistEntryId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM pilot_whitelist WHERE id = ?")
			.bind(id.0.to_string())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[instrument(skip(self), fields(flag_id = %flag_id))]
	async fn list_whitelist_entries(&self, flag_id: FlagId) -> Result<Vec<PilotWhitelistEntry>> {
		let mut conn = self.pool.acquire().await?;
		select_whitelist(&mut conn, &flag_id.0.to_string()).await
	}
}

/// Whitelist of one flag ordered by `user_identifier`, read on the given connection so callers
/// can pair it with the flag row inside one transaction.
async fn select_whitelist(
	conn: &mut SqliteConnection,
	flag_id: &str,
) -> Result<Vec<PilotWhitelistEntry>> {
	let rows = sqlx::query_as::<_, WhitelistRow>(
		r#"
		SELECT id, feature_flag_id, user_identifier, user_type, min_version, expires_at,
			   created_at, created_by
		FROM pilot_whitelist
		WHERE feature_flag_id = ?
		ORDER BY user_identifier ASC
		"#,
	)
	.bind(flag_id)
	.fetch_all(&mut *conn)
	.await?;

	rows.into_iter().map(TryInto::try_into).collect()
}

// Database row types for sqlx

#[derive(sqlx::FromRow)]
struct FlagRow {
	id: String,
	name: String,
	description: Option<String>,
	enabled: bool,
	created_at: String,
	updated_at: Option<String>,
	created_by: Option<String>,
	updated_by: Option<String>,
}

impl FlagRow {
	fn into_flag(self, whitelist: Vec<PilotWhitelistEntry>) -> Result<FeatureFlag> {
		Ok(FeatureFlag {
			id: self
				.id
				.parse()
				.map_err(|_| FlagsServerError::Internal("Invalid flag ID".to_string()))?,
			name: self.name,
			description: self.description,
			enabled: self.enabled,
			created_at: parse_timestamp(&self.created_at, "created_at")?,
			updated_at: self
				.updated_at
				.map(|s| parse_timestamp(&s, "updated_at"))
				.transpose()?,
			created_by: self.created_by,
			updated_by: self.updated_by,
			whitelist,
		})
	}
}

#[derive(sqlx::FromRow)]
struct WhitelistRow {
	id: String,
	feature_flag_id: String,
	user_identifier: String,
	user_type: Option<String>,
	min_version: Option<String>,
	expires_at: Option<String>,
	created_at: String,
	created_by: Option<String>,
}

impl TryFrom<WhitelistRow> for PilotWhitelistEntry {
	type Error = FlagsServerError;

	fn try_from(row: WhitelistRow) -> Result<Self> {
		Ok(PilotWhitelistEntry {
			id: row
				.id
				.parse()
				.map_err(|_| FlagsServerError::Internal("Invalid whitelist entry ID".to_string()))?,
			feature_flag_id: row
				.feature_flag_id
				.parse()
				.map_err(|_| FlagsServerError::Internal("Invalid flag ID".to_string()))?,
			user_identifier: row.user_identifier,
			user_type: row.user_type,
			min_version: row.min_version,
			expires_at: row
				.expires_at
				.map(|s| parse_timestamp(&s, "expires_at"))
				.transpose()?,
			created_at: parse_timestamp(&row.created_at, "created_at")?,
			created_by: row.created_by,
		})
	}
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|_| FlagsServerError::Internal(format!("Invalid {field}")))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::testing::create_test_pool;
	use chrono::Duration;
	use pilot_flags_core::{CreateFlagRequest, CreateWhitelistEntryRequest};

	async fn make_store() -> SqliteFlagStore {
		SqliteFlagStore::new(create_test_pool().await.unwrap())
	}

	fn new_flag(name: &str, enabled: bool) -> FeatureFlag {
		FeatureFlag::from_request(CreateFlagRequest {
			name: name.to_string(),
			description: Some(format!("{name} description")),
			enabled,
			created_by: Some("System".to_string()),
		})
	}

	fn new_entry(flag_id: FlagId, user: &str) -> PilotWhitelistEntry {
		PilotWhitelistEntry::from_request(CreateWhitelistEntryRequest {
			feature_flag_id: flag_id,
			user_identifier: user.to_string(),
			user_type: Some("Customer".to_string()),
			min_version: Some("1.2.0".to_string()),
			expires_at: Some(Utc::now() + Duration::days(30)),
			created_by: Some("System".to_string()),
		})
	}

	#[tokio::test]
	async fn test_create_and_find_flag() {
		let store = make_store().await;
		let flag = new_flag("OpenBankingPilot", true);
		store.create_flag(&flag).await.unwrap();

		let by_id = store.find_flag_by_id(flag.id).await.unwrap().unwrap();
		assert_eq!(by_id.name, "OpenBankingPilot");
		assert!(by_id.enabled);
		assert_eq!(by_id.created_by.as_deref(), Some("System"));
		assert!(by_id.whitelist.is_empty());

		let by_name = store
			.find_flag_by_name("OpenBankingPilot")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(by_name.id, flag.id);
	}

	#[tokio::test]
	async fn test_find_missing_flag() {
		let store = make_store().await;
		assert!(store.find_flag_by_id(FlagId::new()).await.unwrap().is_none());
		assert!(store.find_flag_by_name("Nope").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_duplicate_name_rejected() {
		let store = make_store().await;
		store.create_flag(&new_flag("SealPilot", true)).await.unwrap();

		let err = store
			.create_flag(&new_flag("SealPilot", false))
			.await
			.unwrap_err();
		assert!(matches!(err, FlagsServerError::DuplicateName(name) if name == "SealPilot"));
	}

	#[tokio::test]
	async fn test_list_flags_ordered_by_name_with_whitelists() {
		let store = make_store().await;
		let b = new_flag("SoftLoginPilot", true);
		let a = new_flag("OpenBankingPilot", true);
		store.create_flag(&b).await.unwrap();
		store.create_flag(&a).await.unwrap();

		store.create_whitelist_entry(&new_entry(a.id, "CUST002")).await.unwrap();
		store.create_whitelist_entry(&new_entry(a.id, "CUST001")).await.unwrap();
		store.create_whitelist_entry(&new_entry(b.id, "EMP001")).await.unwrap();

		let flags = store.list_flags().await.unwrap();
		let names: Vec<_> = flags.iter().map(|f| f.name.as_str()).collect();
		assert_eq!(names, vec!["OpenBankingPilot", "SoftLoginPilot"]);

		let users: Vec<_> = flags[0]
			.whitelist
			.iter()
			.map(|e| e.user_identifier.as_str())
			.collect();
		assert_eq!(users, vec!["CUST001", "CUST002"]);
		assert_eq!(flags[1].whitelist.len(), 1);
	}

	#[tokio::test]
	async fn test_update_flag_persists_mutable_fields() {
		let store = make_store().await;
		let mut flag = new_flag("SealSigningPilot", false);
		store.create_flag(&flag).await.unwrap();

		flag.apply_update(pilot_flags_core::UpdateFlagRequest {
			description: Some("re-enabled".to_string()),
			enabled: true,
			updated_by: Some("ops".to_string()),
		});
		assert!(store.update_flag(&flag).await.unwrap());

		let stored = store.find_flag_by_id(flag.id).await.unwrap().unwrap();
		assert!(stored.enabled);
		assert_eq!(stored.description.as_deref(), Some("re-enabled"));
		assert_eq!(stored.updated_by.as_deref(), Some("ops"));
		assert!(stored.updated_at.is_some());

		let ghost = new_flag("Ghost", true);
		assert!(!store.update_flag(&ghost).await.unwrap());
	}

	#[tokio::test]
	async fn test_delete_flag_cascades_to_whitelist() {
		let store = make_store().await;
		let flag = new_flag("OpenBankingPilot", true);
		store.create_flag(&flag).await.unwrap();
		let entry = new_entry(flag.id, "CUST001");
		store.create_whitelist_entry(&entry).await.unwrap();

		assert!(store.delete_flag(flag.id).await.unwrap());
		assert!(store.find_flag_by_id(flag.id).await.unwrap().is_none());
		assert!(store.find_whitelist_entry(entry.id).await.unwrap().is_none());
		assert!(!store.delete_flag(flag.id).await.unwrap());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_flag_snapshot_is_never_torn_by_concurrent_delete() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("flags.db").display());
		let pool = crate::db::create_pool(&url, 4).await.unwrap();
		crate::db::run_migrations(&pool).await.unwrap();
		let store = SqliteFlagStore::new(pool);

		let flag = new_flag("OpenBankingPilot", true);
		store.create_flag(&flag).await.unwrap();
		for user in ["CUST001", "CUST002", "CUST003"] {
			store.create_whitelist_entry(&new_entry(flag.id, user)).await.unwrap();
		}

		let writer_store = store.clone();
		let id = flag.id;
		let writer = tokio::spawn(async move { writer_store.delete_flag(id).await.unwrap() });

		while !writer.is_finished() {
			if let Some(found) = store.find_flag_by_id(id).await.unwrap() {
				assert_eq!(found.whitelist.len(), 3);
			}
			if let Some(found) = store.find_flag_by_name("OpenBankingPilot").await.unwrap() {
				assert_eq!(found.whitelist.len(), 3);
			}
		}

		assert!(writer.await.unwrap());
		assert!(store.find_flag_by_id(id).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_duplicate_whitelist_entry_rejected() {
		let store = make_store().await;
		let flag = new_flag("OpenBankingPilot", true);
		store.create_flag(&flag).await.unwrap();
		store.create_whitelist_entry(&new_entry(flag.id, "CUST001")).await.unwrap();

		let err = store
			.create_whitelist_entry(&new_entry(flag.id, "CUST001"))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			FlagsServerError::DuplicateEntry { user_identifier } if user_identifier == "CUST001"
		));

		// Same subject on another flag is fine
		let other = new_flag("SealPilot", true);
		store.create_flag(&other).await.unwrap();
		store.create_whitelist_entry(&new_entry(other.id, "CUST001")).await.unwrap();
	}

	#[tokio::test]
	async fn test_whitelist_entry_for_missing_flag_rejected() {
		let store = make_store().await;
		let err = store
			.create_whitelist_entry(&new_entry(FlagId::new(), "CUST001"))
			.await
			.unwrap_err();
		assert!(matches!(err, FlagsServerError::FlagNotFound));
	}

	#[tokio::test]
	async fn test_whitelist_entry_roundtrip_and_delete() {
		let store = make_store().await;
		let flag = new_flag("OpenBankingPilot", true);
		store.create_flag(&flag).await.unwrap();
		let entry = new_entry(flag.id, "CUST001");
		store.create_whitelist_entry(&entry).await.unwrap();

		let stored = store.find_whitelist_entry(entry.id).await.unwrap().unwrap();
		assert_eq!(stored.user_identifier, "CUST001");
		assert_eq!(stored.user_type.as_deref(), Some("Customer"));
		assert_eq!(stored.min_version.as_deref(), Some("1.2.0"));
		assert!(stored.expires_at.is_some());

		assert!(store.delete_whitelist_entry(entry.id).await.unwrap());
		assert!(!store.delete_whitelist_entry(entry.id).await.unwrap());
		assert!(store.list_whitelist_entries(flag.id).await.unwrap().is_empty());
	}
}
