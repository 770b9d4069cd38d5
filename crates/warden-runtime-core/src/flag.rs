// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag records and their scoping model.
//!
//! A flag key is not unique on its own: the same key may carry one record per
//! scope tier (global, organization, user), and evaluation picks the single
//! applicable record by strict scope priority. The store enforces uniqueness
//! per `(key, scope)` pair; the types here only describe the shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::EvaluationContext;
use crate::error::{Result, RuntimeError};

/// Unique identifier for a flag record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlagRecordId(pub Uuid);

impl FlagRecordId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for FlagRecordId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for FlagRecordId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for FlagRecordId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// The precedence tier a flag record applies to.
///
/// Ordering is by priority: `User` beats `Organization` beats `Global`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
	Global,
	Organization,
	User,
}

impl ScopeType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ScopeType::Global => "global",
			ScopeType::Organization => "organization",
			ScopeType::User => "user",
		}
	}
}

impl std::fmt::Display for ScopeType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// The scope a record is bound to. Non-global scopes always carry the
/// identifier they target, so a record can never claim a tier without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope_type", content = "scope_id", rename_all = "lowercase")]
pub enum FlagScope {
	Global,
	Organization(String),
	User(String),
}

impl FlagScope {
	pub fn scope_type(&self) -> ScopeType {
		match self {
			FlagScope::Global => ScopeType::Global,
			FlagScope::Organization(_) => ScopeType::Organization,
			FlagScope::User(_) => ScopeType::User,
		}
	}

	pub fn scope_id(&self) -> Option<&str> {
		match self {
			FlagScope::Global => None,
			FlagScope::Organization(id) | FlagScope::User(id) => Some(id),
		}
	}

	/// Whether this scope applies to the given context.
	///
	/// A user-scoped record applies only when the context carries the same
	/// user id; likewise for organizations. Global always applies. The scope
	/// must match the context, not merely exist.
	pub fn applies_to(&self, context: &EvaluationContext) -> bool {
		match self {
			FlagScope::Global => true,
			FlagScope::Organization(id) => context.org_id.as_deref() == Some(id.as_str()),
			FlagScope::User(id) => context.user_id.as_deref() == Some(id.as_str()),
		}
	}

	/// Selection priority; lower wins.
	pub fn priority(&self) -> u8 {
		match self {
			FlagScope::User(_) => 0,
			FlagScope::Organization(_) => 1,
			FlagScope::Global => 2,
		}
	}
}

/// One weighted variant of a flag. Weights are relative; they need not sum
/// to 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
	pub name: String,
	pub weight: u32,
}

/// A named, scoped toggle controlling a behavior or experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRecord {
	pub id: FlagRecordId,
	/// e.g., "billing.new_invoice_flow"
	pub key: String,
	#[serde(flatten)]
	pub scope: FlagScope,
	pub enabled: bool,
	/// Forces "disabled" regardless of every other setting.
	pub kill_switch: bool,
	/// 0-100; the share of identifier space that evaluates enabled.
	pub rollout_percentage: u32,
	pub variants: Vec<Variant>,
	/// Must name an entry in `variants` when `variants` is non-empty.
	pub default_variant: String,
	/// Inclusive window bounds; None = unbounded on that side.
	pub start_at: Option<DateTime<Utc>>,
	pub end_at: Option<DateTime<Utc>>,
	/// Whether non-privileged callers may see the evaluated result.
	pub is_public: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl FlagRecord {
	/// A minimal enabled record, useful as a starting point.
	pub fn new(key: impl Into<String>, scope: FlagScope) -> Self {
		let now = Utc::now();
		Self {
			id: FlagRecordId::new(),
			key: key.into(),
			scope,
			enabled: true,
			kill_switch: false,
			rollout_percentage: 100,
			variants: Vec::new(),
			default_variant: String::new(),
			start_at: None,
			end_at: None,
			is_public: false,
			created_at: now,
			updated_at: now,
		}
	}

	/// Validates the flag key format.
	///
	/// Valid keys:
	/// - Lowercase alphanumeric with underscores, dots as namespace separators
	/// - 3-100 characters
	/// - Pattern: `^[a-z][a-z0-9_.]*$`
	pub fn validate_key(key: &str) -> bool {
		if key.len() < 3 || key.len() > 100 {
			return false;
		}

		let mut chars = key.chars();

		// First character must be lowercase letter
		match chars.next() {
			Some(c) if c.is_ascii_lowercase() => {}
			_ => return false,
		}

		chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
	}

	/// Checks the structural invariants the store relies on.
	pub fn validate(&self) -> Result<()> {
		if !Self::validate_key(&self.key) {
			return Err(RuntimeError::InvalidFlagKey(self.key.clone()));
		}

		if self.rollout_percentage > 100 {
			return Err(RuntimeError::InvalidRecord(format!(
				"rollout_percentage {} out of range 0-100",
				self.rollout_percentage
			)));
		}

		if let Some(id) = self.scope.scope_id() {
			if id.is_empty() {
				return Err(RuntimeError::InvalidRecord(
					"non-global scope requires a scope id".to_string(),
				));
			}
		}

		if !self.variants.is_empty()
			&& !self.variants.iter().any(|v| v.name == self.default_variant)
		{
			return Err(RuntimeError::InvalidRecord(format!(
				"default_variant {:?} is not a declared variant",
				self.default_variant
			)));
		}

		if let (Some(start), Some(end)) = (self.start_at, self.end_at) {
			if end < start {
				return Err(RuntimeError::InvalidRecord(
					"end_at precedes start_at".to_string(),
				));
			}
		}

		Ok(())
	}

	/// Whether `now` falls inside the record's schedule window.
	///
	/// Bounds are inclusive; an unset bound is open on that side.
	pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
		if let Some(start) = self.start_at {
			if now < start {
				return false;
			}
		}

		if let Some(end) = self.end_at {
			if now > end {
				return false;
			}
		}

		true
	}
}
