// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Versioned runtime configuration snapshots.
//!
//! A snapshot is immutable once published and is superseded only by a
//! snapshot with a strictly greater version. Clients compare versions to
//! detect staleness; they never merge snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decision::Decision;

/// Which view a snapshot is: public snapshots carry only decisions for
/// flags marked public, privileged snapshots carry everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
	Public,
	Privileged,
}

impl EvaluationMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			EvaluationMode::Public => "public",
			EvaluationMode::Privileged => "privileged",
		}
	}

	pub fn includes_private(&self) -> bool {
		matches!(self, EvaluationMode::Privileged)
	}
}

/// Operator-controlled switches that gate whole surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OpsConfig {
	pub maintenance_mode: bool,
	pub read_only_mode: bool,
	pub emergency_lockdown: bool,
	pub rate_limit_multiplier: f64,
}

impl Default for OpsConfig {
	fn default() -> Self {
		Self {
			maintenance_mode: false,
			read_only_mode: false,
			emergency_lockdown: false,
			rate_limit_multiplier: 1.0,
		}
	}
}

impl OpsConfig {
	/// Applies one stored override onto the defaults. Returns false for
	/// unknown keys or mistyped values, which callers log and skip.
	pub fn apply_override(&mut self, key: &str, value: &Value) -> bool {
		match (key, value) {
			("maintenance_mode", Value::Bool(b)) => {
				self.maintenance_mode = *b;
				true
			}
			("read_only_mode", Value::Bool(b)) => {
				self.read_only_mode = *b;
				true
			}
			("emergency_lockdown", Value::Bool(b)) => {
				self.emergency_lockdown = *b;
				true
			}
			("rate_limit_multiplier", Value::Number(n)) => match n.as_f64() {
				Some(m) if m.is_finite() && m >= 0.0 => {
					self.rate_limit_multiplier = m;
					true
				}
				_ => false,
			},
			_ => false,
		}
	}
}

/// Marketing-facing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MarketingConfig {
	/// Site-wide announcement banner, when set.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub announcement: Option<String>,
	pub signups_open: bool,
	pub trial_days: u32,
	/// Active pricing-page experiment name, when one is running.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pricing_experiment: Option<String>,
}

impl Default for MarketingConfig {
	fn default() -> Self {
		Self {
			announcement: None,
			signups_open: true,
			trial_days: 14,
			pricing_experiment: None,
		}
	}
}

impl MarketingConfig {
	/// Applies one stored override onto the defaults. Returns false for
	/// unknown keys or mistyped values.
	pub fn apply_override(&mut self, key: &str, value: &Value) -> bool {
		match (key, value) {
			("announcement", Value::String(s)) => {
				self.announcement = if s.is_empty() { None } else { Some(s.clone()) };
				true
			}
			("announcement", Value::Null) => {
				self.announcement = None;
				true
			}
			("signups_open", Value::Bool(b)) => {
				self.signups_open = *b;
				true
			}
			("trial_days", Value::Number(n)) => match n.as_u64() {
				Some(d) if d <= u32::MAX as u64 => {
					self.trial_days = d as u32;
					true
				}
				_ => false,
			},
			("pricing_experiment", Value::String(s)) => {
				self.pricing_experiment = if s.is_empty() { None } else { Some(s.clone()) };
				true
			}
			("pricing_experiment", Value::Null) => {
				self.pricing_experiment = None;
				true
			}
			_ => false,
		}
	}
}

/// An immutable, versioned bundle of runtime configuration for one
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RuntimeSnapshot {
	pub environment: String,
	pub version: u64,
	pub generated_at: DateTime<Utc>,
	pub ops: OpsConfig,
	pub marketing: MarketingConfig,
	pub evaluation_mode: EvaluationMode,
	/// Evaluated decisions keyed by flag key. Public snapshots only ever
	/// contain keys whose records are public.
	pub features: BTreeMap<String, Decision>,
}

impl RuntimeSnapshot {
	/// The all-defaults snapshot served when nothing has ever been built
	/// for an environment. Version 0, so any real snapshot supersedes it.
	pub fn defaults(environment: impl Into<String>, evaluation_mode: EvaluationMode) -> Self {
		Self {
			environment: environment.into(),
			version: 0,
			generated_at: Utc::now(),
			ops: OpsConfig::default(),
			marketing: MarketingConfig::default(),
			evaluation_mode,
			features: BTreeMap::new(),
		}
	}

	/// Whether this snapshot supersedes one at `current_version`.
	/// Equal versions do not supersede; clients keep what they hold.
	pub fn supersedes(&self, current_version: u64) -> bool {
		self.version > current_version
	}

	pub fn feature(&self, key: &str) -> Option<&Decision> {
		self.features.get(key)
	}

	/// Enabled state for a key; unknown keys degrade to disabled.
	pub fn feature_enabled(&self, key: &str) -> bool {
		self.features.get(key).map(|d| d.enabled).unwrap_or(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_ops_defaults_are_permissive() {
		let ops = OpsConfig::default();
		assert!(!ops.maintenance_mode);
		assert!(!ops.read_only_mode);
		assert!(!ops.emergency_lockdown);
		assert_eq!(ops.rate_limit_multiplier, 1.0);
	}

	#[test]
	fn test_ops_override_known_keys() {
		let mut ops = OpsConfig::default();
		assert!(ops.apply_override("maintenance_mode", &json!(true)));
		assert!(ops.apply_override("rate_limit_multiplier", &json!(0.5)));
		assert!(ops.maintenance_mode);
		assert_eq!(ops.rate_limit_multiplier, 0.5);
	}

	#[test]
	fn test_ops_override_rejects_unknown_and_mistyped() {
		let mut ops = OpsConfig::default();
		assert!(!ops.apply_override("maintenance_mode", &json!("yes")));
		assert!(!ops.apply_override("unknown_switch", &json!(true)));
		assert!(!ops.apply_override("rate_limit_multiplier", &json!(-1.0)));
		assert_eq!(ops, OpsConfig::default());
	}

	#[test]
	fn test_marketing_override() {
		let mut marketing = MarketingConfig::default();
		assert!(marketing.apply_override("announcement", &json!("Scheduled maintenance Sunday")));
		assert!(marketing.apply_override("signups_open", &json!(false)));
		assert!(marketing.apply_override("trial_days", &json!(30)));
		assert_eq!(
			marketing.announcement.as_deref(),
			Some("Scheduled maintenance Sunday")
		);
		assert!(!marketing.signups_open);
		assert_eq!(marketing.trial_days, 30);

		// Empty string clears the banner
		assert!(marketing.apply_override("announcement", &json!("")));
		assert_eq!(marketing.announcement, None);
	}

	#[test]
	fn test_defaults_snapshot_is_version_zero() {
		let snapshot = RuntimeSnapshot::defaults("production", EvaluationMode::Public);
		assert_eq!(snapshot.version, 0);
		assert!(snapshot.features.is_empty());
		assert_eq!(snapshot.ops, OpsConfig::default());
	}

	#[test]
	fn test_supersedes_is_strict() {
		let mut snapshot = RuntimeSnapshot::defaults("production", EvaluationMode::Public);
		snapshot.version = 5;

		assert!(snapshot.supersedes(4));
		assert!(!snapshot.supersedes(5));
		assert!(!snapshot.supersedes(6));
	}

	#[test]
	fn test_feature_enabled_degrades_to_disabled() {
		let snapshot = RuntimeSnapshot::defaults("production", EvaluationMode::Public);
		assert!(!snapshot.feature_enabled("billing.new_invoice_flow"));
	}

	#[test]
	fn test_snapshot_roundtrip() {
		let mut snapshot = RuntimeSnapshot::defaults("staging", EvaluationMode::Privileged);
		snapshot.version = 3;
		snapshot.features.insert(
			"billing.new_invoice_flow".to_string(),
			Decision::not_configured(),
		);

		let json = serde_json::to_string(&snapshot).unwrap();
		assert!(json.contains(r#""evaluation_mode":"privileged""#));

		let back: RuntimeSnapshot = serde_json::from_str(&json).unwrap();
		assert_eq!(back, snapshot);
	}
}
