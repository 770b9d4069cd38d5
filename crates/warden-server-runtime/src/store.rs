// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag and override persistence.
//!
//! The read side is the [`FlagStore`] trait consumed by the snapshot builder.
//! Writes are inherent methods on the concrete stores; the builder never
//! mutates state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::instrument;

use warden_runtime_core::{FlagRecord, FlagRecordId, FlagScope, Variant};

use crate::error::{Result, ServerRuntimeError};

/// Which snapshot section a runtime override targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideSection {
	Ops,
	Marketing,
}

impl OverrideSection {
	pub fn as_str(&self) -> &'static str {
		match self {
			OverrideSection::Ops => "ops",
			OverrideSection::Marketing => "marketing",
		}
	}

	fn parse(value: &str) -> Result<Self> {
		match value {
			"ops" => Ok(OverrideSection::Ops),
			"marketing" => Ok(OverrideSection::Marketing),
			other => Err(ServerRuntimeError::Internal(format!(
				"Unknown override section {:?}",
				other
			))),
		}
	}
}

impl std::fmt::Display for OverrideSection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A single per-environment override applied on top of the compiled-in
/// ops/marketing defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOverride {
	pub environment: String,
	pub section: OverrideSection,
	pub key: String,
	pub value: serde_json::Value,
	pub updated_at: DateTime<Utc>,
}

/// Read interface the snapshot builder evaluates from.
#[async_trait]
pub trait FlagStore: Send + Sync {
	/// All records for one flag key, across every scope.
	async fn records_for_key(&self, key: &str) -> Result<Vec<FlagRecord>>;

	/// Every record in the store, ordered by key then scope.
	async fn all_records(&self) -> Result<Vec<FlagRecord>>;

	/// Overrides targeting one environment.
	async fn overrides_for_environment(&self, environment: &str) -> Result<Vec<ConfigOverride>>;
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteFlagStore {
	pool: SqlitePool,
}

impl SqliteFlagStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Inserts or replaces the record for its (key, scope) slot.
	#[instrument(skip(self, record), fields(flag_key = %record.key))]
	pub async fn upsert_record(&self, record: &FlagRecord) -> Result<()> {
		record.validate()?;

		let variants = serde_json::to_string(&record.variants)?;

		sqlx::query(
			r#"
			INSERT INTO flag_records (
				id, key, scope_type, scope_id, enabled, kill_switch,
				rollout_percentage, variants, default_variant,
				start_at, end_at, is_public, created_at, updated_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT (key, scope_type, scope_id) DO UPDATE SET
				enabled = excluded.enabled,
				kill_switch = excluded.kill_switch,
				rollout_percentage = excluded.rollout_percentage,
				variants = excluded.variants,
				default_variant = excluded.default_variant,
				start_at = excluded.start_at,
				end_at = excluded.end_at,
				is_public = excluded.is_public,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(record.id.to_string())
		.bind(&record.key)
		.bind(record.scope.scope_type().as_str())
		.bind(record.scope.scope_id().unwrap_or(""))
		.bind(record.enabled)
		.bind(record.kill_switch)
		.bind(record.rollout_percentage as i64)
		.bind(variants)
		.bind(&record.default_variant)
		.bind(record.start_at.map(|t| t.to_rfc3339()))
		.bind(record.end_at.map(|t| t.to_rfc3339()))
		.bind(record.is_public)
		.bind(record.created_at.to_rfc3339())
		.bind(record.updated_at.to_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Deletes the record in the (key, scope) slot. Returns whether a row
	/// was removed.
	#[instrument(skip(self), fields(flag_key = %key))]
	pub async fn delete_record(&self, key: &str, scope: &FlagScope) -> Result<bool> {
		let result = sqlx::query(
			r#"
			DELETE FROM flag_records
			WHERE key = ? AND scope_type = ? AND scope_id = ?
			"#,
		)
		.bind(key)
		.bind(scope.scope_type().as_str())
		.bind(scope.scope_id().unwrap_or(""))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	/// Sets one override value for an environment.
	#[instrument(skip(self, value), fields(environment = %environment, section = %section, key = %key))]
	pub async fn set_override(
		&self,
		environment: &str,
		section: OverrideSection,
		key: &str,
		value: &serde_json::Value,
	) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO runtime_overrides (environment, section, key, value, updated_at)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT (environment, section, key) DO UPDATE SET
				value = excluded.value,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(environment)
		.bind(section.as_str())
		.bind(key)
		.bind(serde_json::to_string(value)?)
		.bind(Utc::now().to_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Removes one override. Returns whether a row was removed.
	#[instrument(skip(self), fields(environment = %environment, section = %section, key = %key))]
	pub async fn clear_override(
		&self,
		environment: &str,
		section: OverrideSection,
		key: &str,
	) -> Result<bool> {
		let result = sqlx::query(
			r#"
			DELETE FROM runtime_overrides
			WHERE environment = ? AND section = ? AND key = ?
			"#,
		)
		.bind(environment)
		.bind(section.as_str())
		.bind(key)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}
}

#[async_trait]
impl FlagStore for SqliteFlagStore {
	#[instrument(skip(self), fields(flag_key = %key))]
	async fn records_for_key(&self, key: &str) -> Result<Vec<FlagRecord>> {
		let rows = sqlx::query_as::<_, FlagRecordRow>(
			r#"
			SELECT id, key, scope_type, scope_id, enabled, kill_switch,
			       rollout_percentage, variants, default_variant,
			       start_at, end_at, is_public, created_at, updated_at
			FROM flag_records
			WHERE key = ?
			ORDER BY scope_type, scope_id
			"#,
		)
		.bind(key)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(FlagRecord::try_from).collect()
	}

	#[instrument(skip(self))]
	async fn all_records(&self) -> Result<Vec<FlagRecord>> {
		let rows = sqlx::query_as::<_, FlagRecordRow>(
			r#"
			SELECT id, key, scope_type, scope_id, enabled, kill_switch,
			       rollout_percentage, variants, default_variant,
			       start_at, end_at, is_public, created_at, updated_at
			FROM flag_records
			ORDER BY key, scope_type, scope_id
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(FlagRecord::try_from).collect()
	}

	#[instrument(skip(self), fields(environment = %environment))]
	async fn overrides_for_environment(&self, environment: &str) -> Result<Vec<ConfigOverride>> {
		let rows = sqlx::query_as::<_, ConfigOverrideRow>(
			r#"
			SELECT environment, section, key, value, updated_at
			FROM runtime_overrides
			WHERE environment = ?
			ORDER BY section, key
			"#,
		)
		.bind(environment)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(ConfigOverride::try_from).collect()
	}
}

#[derive(sqlx::FromRow)]
struct FlagRecordRow {
	id: String,
	key: String,
	scope_type: String,
	scope_id: String,
	enabled: bool,
	kill_switch: bool,
	rollout_percentage: i64,
	variants: String,
	default_variant: String,
	start_at: Option<String>,
	end_at: Option<String>,
	is_public: bool,
	created_at: String,
	updated_at: String,
}

impl TryFrom<FlagRecordRow> for FlagRecord {
	type Error = ServerRuntimeError;

	fn try_from(row: FlagRecordRow) -> Result<Self> {
		let variants: Vec<Variant> = serde_json::from_str(&row.variants)?;

		let scope = match row.scope_type.as_str() {
			"global" => FlagScope::Global,
			"organization" if !row.scope_id.is_empty() => {
				FlagScope::Organization(row.scope_id)
			}
			"user" if !row.scope_id.is_empty() => FlagScope::User(row.scope_id),
			_ => {
				return Err(ServerRuntimeError::Internal(format!(
					"Invalid scope for flag {:?}",
					row.key
				)));
			}
		};

		Ok(FlagRecord {
			id: row
				.id
				.parse::<FlagRecordId>()
				.map_err(|_| ServerRuntimeError::Internal("Invalid record ID".to_string()))?,
			key: row.key,
			scope,
			enabled: row.enabled,
			kill_switch: row.kill_switch,
			rollout_percentage: u32::try_from(row.rollout_percentage).map_err(|_| {
				ServerRuntimeError::Internal("Invalid rollout_percentage".to_string())
			})?,
			variants,
			default_variant: row.default_variant,
			start_at: row
				.start_at
				.map(|t| {
					chrono::DateTime::parse_from_rfc3339(&t)
						.map_err(|_| ServerRuntimeError::Internal("Invalid start_at".to_string()))
						.map(|t| t.with_timezone(&chrono::Utc))
				})
				.transpose()?,
			end_at: row
				.end_at
				.map(|t| {
					chrono::DateTime::parse_from_rfc3339(&t)
						.map_err(|_| ServerRuntimeError::Internal("Invalid end_at".to_string()))
						.map(|t| t.with_timezone(&chrono::Utc))
				})
				.transpose()?,
			is_public: row.is_public,
			created_at: chrono::DateTime::parse_from_rfc3339(&row.created_at)
				.map_err(|_| ServerRuntimeError::Internal("Invalid created_at".to_string()))?
				.with_timezone(&chrono::Utc),
			updated_at: chrono::DateTime::parse_from_rfc3339(&row.updated_at)
				.map_err(|_| ServerRuntimeError::Internal("Invalid updated_at".to_string()))?
				.with_timezone(&chrono::Utc),
		})
	}
}

#[derive(sqlx::FromRow)]
struct ConfigOverrideRow {
	environment: String,
	section: String,
	key: String,
	value: String,
	updated_at: String,
}

impl TryFrom<ConfigOverrideRow> for ConfigOverride {
	type Error = ServerRuntimeError;

	fn try_from(row: ConfigOverrideRow) -> Result<Self> {
		Ok(ConfigOverride {
			environment: row.environment,
			section: OverrideSection::parse(&row.section)?,
			key: row.key,
			value: serde_json::from_str(&row.value)?,
			updated_at: chrono::DateTime::parse_from_rfc3339(&row.updated_at)
				.map_err(|_| ServerRuntimeError::Internal("Invalid updated_at".to_string()))?
				.with_timezone(&chrono::Utc),
		})
	}
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryFlagStore {
	records: RwLock<Vec<FlagRecord>>,
	overrides: RwLock<Vec<ConfigOverride>>,
}

impl MemoryFlagStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts or replaces the record for its (key, scope) slot.
	pub async fn upsert_record(&self, record: FlagRecord) -> Result<()> {
		record.validate()?;

		let mut records = self.records.write().await;
		records.retain(|r| !(r.key == record.key && r.scope == record.scope));
		records.push(record);
		Ok(())
	}

	/// Removes the record in the (key, scope) slot.
	pub async fn remove_record(&self, key: &str, scope: &FlagScope) -> bool {
		let mut records = self.records.write().await;
		let before = records.len();
		records.retain(|r| !(r.key == key && &r.scope == scope));
		records.len() != before
	}

	pub async fn set_override(
		&self,
		environment: &str,
		section: OverrideSection,
		key: &str,
		value: serde_json::Value,
	) {
		let mut overrides = self.overrides.write().await;
		overrides.retain(|o| {
			!(o.environment == environment && o.section == section && o.key == key)
		});
		overrides.push(ConfigOverride {
			environment: environment.to_string(),
			section,
			key: key.to_string(),
			value,
			updated_at: Utc::now(),
		});
	}

	pub async fn clear_override(
		&self,
		environment: &str,
		section: OverrideSection,
		key: &str,
	) -> bool {
		let mut overrides = self.overrides.write().await;
		let before = overrides.len();
		overrides.retain(|o| {
			!(o.environment == environment && o.section == section && o.key == key)
		});
		overrides.len() != before
	}
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
	async fn records_for_key(&self, key: &str) -> Result<Vec<FlagRecord>> {
		let records = self.records.read().await;
		Ok(records.iter().filter(|r| r.key == key).cloned().collect())
	}

	async fn all_records(&self) -> Result<Vec<FlagRecord>> {
		let records = self.records.read().await;
		let mut all: Vec<FlagRecord> = records.clone();
		all.sort_by(|a, b| {
			(&a.key, a.scope.scope_type().as_str(), a.scope.scope_id())
				.cmp(&(&b.key, b.scope.scope_type().as_str(), b.scope.scope_id()))
		});
		Ok(all)
	}

	async fn overrides_for_environment(&self, environment: &str) -> Result<Vec<ConfigOverride>> {
		let overrides = self.overrides.read().await;
		let mut matching: Vec<ConfigOverride> = overrides
			.iter()
			.filter(|o| o.environment == environment)
			.cloned()
			.collect();
		matching.sort_by(|a, b| {
			(a.section.as_str(), &a.key).cmp(&(b.section.as_str(), &b.key))
		});
		Ok(matching)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sqlx::sqlite::SqlitePoolOptions;
	use warden_runtime_core::FlagScope;

	async fn setup_test_pool() -> SqlitePool {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect(":memory:")
			.await
			.unwrap();

		sqlx::query(
			r#"
			CREATE TABLE flag_records (
				id TEXT PRIMARY KEY,
				key TEXT NOT NULL,
				scope_type TEXT NOT NULL,
				scope_id TEXT NOT NULL DEFAULT '',
				enabled INTEGER NOT NULL DEFAULT 0,
				kill_switch INTEGER NOT NULL DEFAULT 0,
				rollout_percentage INTEGER NOT NULL DEFAULT 100,
				variants TEXT NOT NULL DEFAULT '[]',
				default_variant TEXT NOT NULL DEFAULT '',
				start_at TEXT,
				end_at TEXT,
				is_public INTEGER NOT NULL DEFAULT 0,
				created_at TEXT NOT NULL,
				updated_at TEXT NOT NULL,
				UNIQUE (key, scope_type, scope_id)
			)
			"#,
		)
		.execute(&pool)
		.await
		.unwrap();

		sqlx::query(
			r#"
			CREATE TABLE runtime_overrides (
				environment TEXT NOT NULL,
				section TEXT NOT NULL,
				key TEXT NOT NULL,
				value TEXT NOT NULL,
				updated_at TEXT NOT NULL,
				PRIMARY KEY (environment, section, key)
			)
			"#,
		)
		.execute(&pool)
		.await
		.unwrap();

		pool
	}

	#[tokio::test]
	async fn test_sqlite_record_roundtrip() {
		let store = SqliteFlagStore::new(setup_test_pool().await);

		let mut record = FlagRecord::new("billing.invoice_v2", FlagScope::Global);
		record.rollout_percentage = 25;
		record.variants = vec![
			Variant {
				name: "control".to_string(),
				weight: 1,
			},
			Variant {
				name: "treatment".to_string(),
				weight: 3,
			},
		];
		record.default_variant = "control".to_string();
		record.is_public = true;

		store.upsert_record(&record).await.unwrap();

		let fetched = store.records_for_key("billing.invoice_v2").await.unwrap();
		assert_eq!(fetched.len(), 1);
		assert_eq!(fetched[0], record);
	}

	#[tokio::test]
	async fn test_sqlite_scoped_records_roundtrip() {
		let store = SqliteFlagStore::new(setup_test_pool().await);

		let global = FlagRecord::new("checkout.v2", FlagScope::Global);
		let org = FlagRecord::new("checkout.v2", FlagScope::Organization("org-a".to_string()));
		let user = FlagRecord::new("checkout.v2", FlagScope::User("user-1".to_string()));

		store.upsert_record(&global).await.unwrap();
		store.upsert_record(&org).await.unwrap();
		store.upsert_record(&user).await.unwrap();

		let fetched = store.records_for_key("checkout.v2").await.unwrap();
		assert_eq!(fetched.len(), 3);

		let scopes: Vec<FlagScope> = fetched.iter().map(|r| r.scope.clone()).collect();
		assert!(scopes.contains(&FlagScope::Global));
		assert!(scopes.contains(&FlagScope::Organization("org-a".to_string())));
		assert!(scopes.contains(&FlagScope::User("user-1".to_string())));
	}

	#[tokio::test]
	async fn test_sqlite_upsert_replaces_slot() {
		let store = SqliteFlagStore::new(setup_test_pool().await);

		let mut record = FlagRecord::new("checkout.v2", FlagScope::Global);
		store.upsert_record(&record).await.unwrap();

		record.enabled = false;
		record.kill_switch = true;
		store.upsert_record(&record).await.unwrap();

		let fetched = store.records_for_key("checkout.v2").await.unwrap();
		assert_eq!(fetched.len(), 1);
		assert!(!fetched[0].enabled);
		assert!(fetched[0].kill_switch);
	}

	#[tokio::test]
	async fn test_sqlite_rejects_invalid_record() {
		let store = SqliteFlagStore::new(setup_test_pool().await);

		let mut record = FlagRecord::new("checkout.v2", FlagScope::Global);
		record.rollout_percentage = 250;

		assert!(store.upsert_record(&record).await.is_err());
	}

	#[tokio::test]
	async fn test_sqlite_delete_record() {
		let store = SqliteFlagStore::new(setup_test_pool().await);

		let record = FlagRecord::new("checkout.v2", FlagScope::Global);
		store.upsert_record(&record).await.unwrap();

		assert!(store
			.delete_record("checkout.v2", &FlagScope::Global)
			.await
			.unwrap());
		assert!(!store
			.delete_record("checkout.v2", &FlagScope::Global)
			.await
			.unwrap());

		let fetched = store.records_for_key("checkout.v2").await.unwrap();
		assert!(fetched.is_empty());
	}

	#[tokio::test]
	async fn test_sqlite_all_records_ordered_by_key() {
		let store = SqliteFlagStore::new(setup_test_pool().await);

		store
			.upsert_record(&FlagRecord::new("zeta.flag", FlagScope::Global))
			.await
			.unwrap();
		store
			.upsert_record(&FlagRecord::new("alpha.flag", FlagScope::Global))
			.await
			.unwrap();

		let all = store.all_records().await.unwrap();
		assert_eq!(all.len(), 2);
		assert_eq!(all[0].key, "alpha.flag");
		assert_eq!(all[1].key, "zeta.flag");
	}

	#[tokio::test]
	async fn test_sqlite_overrides_filtered_by_environment() {
		let store = SqliteFlagStore::new(setup_test_pool().await);

		store
			.set_override(
				"production",
				OverrideSection::Ops,
				"maintenance_mode",
				&serde_json::json!(true),
			)
			.await
			.unwrap();
		store
			.set_override(
				"staging",
				OverrideSection::Marketing,
				"announcement",
				&serde_json::json!("hello"),
			)
			.await
			.unwrap();

		let production = store.overrides_for_environment("production").await.unwrap();
		assert_eq!(production.len(), 1);
		assert_eq!(production[0].section, OverrideSection::Ops);
		assert_eq!(production[0].key, "maintenance_mode");
		assert_eq!(production[0].value, serde_json::json!(true));

		let staging = store.overrides_for_environment("staging").await.unwrap();
		assert_eq!(staging.len(), 1);
		assert_eq!(staging[0].section, OverrideSection::Marketing);
	}

	#[tokio::test]
	async fn test_sqlite_override_upsert_and_clear() {
		let store = SqliteFlagStore::new(setup_test_pool().await);

		store
			.set_override(
				"production",
				OverrideSection::Ops,
				"rate_limit_multiplier",
				&serde_json::json!(0.5),
			)
			.await
			.unwrap();
		store
			.set_override(
				"production",
				OverrideSection::Ops,
				"rate_limit_multiplier",
				&serde_json::json!(2.0),
			)
			.await
			.unwrap();

		let overrides = store.overrides_for_environment("production").await.unwrap();
		assert_eq!(overrides.len(), 1);
		assert_eq!(overrides[0].value, serde_json::json!(2.0));

		assert!(store
			.clear_override("production", OverrideSection::Ops, "rate_limit_multiplier")
			.await
			.unwrap());
		let overrides = store.overrides_for_environment("production").await.unwrap();
		assert!(overrides.is_empty());
	}

	#[tokio::test]
	async fn test_sqlite_rejects_unknown_scope_type() {
		let pool = setup_test_pool().await;
		let store = SqliteFlagStore::new(pool.clone());

		sqlx::query(
			r#"
			INSERT INTO flag_records (id, key, scope_type, scope_id, created_at, updated_at)
			VALUES (?, 'bad.flag', 'galaxy', '', ?, ?)
			"#,
		)
		.bind(uuid::Uuid::new_v4().to_string())
		.bind(Utc::now().to_rfc3339())
		.bind(Utc::now().to_rfc3339())
		.execute(&pool)
		.await
		.unwrap();

		let result = store.records_for_key("bad.flag").await;
		assert!(matches!(result, Err(ServerRuntimeError::Internal(_))));
	}

	#[tokio::test]
	async fn test_memory_store_upsert_and_fetch() {
		let store = MemoryFlagStore::new();

		store
			.upsert_record(FlagRecord::new("checkout.v2", FlagScope::Global))
			.await
			.unwrap();
		store
			.upsert_record(FlagRecord::new(
				"checkout.v2",
				FlagScope::User("user-1".to_string()),
			))
			.await
			.unwrap();

		let fetched = store.records_for_key("checkout.v2").await.unwrap();
		assert_eq!(fetched.len(), 2);

		let mut replacement = FlagRecord::new("checkout.v2", FlagScope::Global);
		replacement.enabled = false;
		store.upsert_record(replacement).await.unwrap();

		let fetched = store.records_for_key("checkout.v2").await.unwrap();
		assert_eq!(fetched.len(), 2);
		let global = fetched
			.iter()
			.find(|r| r.scope == FlagScope::Global)
			.unwrap();
		assert!(!global.enabled);
	}

	#[tokio::test]
	async fn test_memory_store_overrides() {
		let store = MemoryFlagStore::new();

		store
			.set_override(
				"production",
				OverrideSection::Marketing,
				"trial_days",
				serde_json::json!(30),
			)
			.await;

		let overrides = store.overrides_for_environment("production").await.unwrap();
		assert_eq!(overrides.len(), 1);
		assert_eq!(overrides[0].key, "trial_days");

		assert!(
			store
				.clear_override("production", OverrideSection::Marketing, "trial_days")
				.await
		);
		assert!(store
			.overrides_for_environment("production")
			.await
			.unwrap()
			.is_empty());
	}
}
