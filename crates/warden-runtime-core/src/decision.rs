// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The single output shape of flag evaluation.
//!
//! A `Decision` is the only flag detail that ever reaches callers; raw
//! records (scope ids, rollout percentages, schedules) stay server-side.

use serde::{Deserialize, Serialize};

use crate::flag::ScopeType;

/// Why a decision came out the way it did.
///
/// `NotConfigured` covers two paths that tests must tell apart: no record
/// applied at all (`scope_type` absent), or a record applied but was
/// disabled (`scope_type` present).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
	NotConfigured,
	KillSwitch,
	OutsideSchedule,
	OutsideRollout,
	Ok,
}

impl ReasonCode {
	pub fn as_str(&self) -> &'static str {
		match self {
			ReasonCode::NotConfigured => "not-configured",
			ReasonCode::KillSwitch => "kill-switch",
			ReasonCode::OutsideSchedule => "outside-schedule",
			ReasonCode::OutsideRollout => "outside-rollout",
			ReasonCode::Ok => "ok",
		}
	}
}

impl std::fmt::Display for ReasonCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// The evaluated outcome for one flag key and one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Decision {
	pub enabled: bool,
	pub reason: ReasonCode,
	/// The tier of the record the decision derived from; absent when no
	/// record applied.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub scope_type: Option<ScopeType>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub variant: Option<String>,
}

impl Decision {
	/// No record applied to this key and context.
	pub fn not_configured() -> Self {
		Self {
			enabled: false,
			reason: ReasonCode::NotConfigured,
			scope_type: None,
			variant: None,
		}
	}

	/// A record applied but was switched off; not-configured-equivalent for
	/// its scope.
	pub fn disabled(scope_type: ScopeType) -> Self {
		Self {
			enabled: false,
			reason: ReasonCode::NotConfigured,
			scope_type: Some(scope_type),
			variant: None,
		}
	}

	pub fn killed(scope_type: ScopeType) -> Self {
		Self {
			enabled: false,
			reason: ReasonCode::KillSwitch,
			scope_type: Some(scope_type),
			variant: None,
		}
	}

	pub fn outside_schedule(scope_type: ScopeType) -> Self {
		Self {
			enabled: false,
			reason: ReasonCode::OutsideSchedule,
			scope_type: Some(scope_type),
			variant: None,
		}
	}

	pub fn outside_rollout(scope_type: ScopeType) -> Self {
		Self {
			enabled: false,
			reason: ReasonCode::OutsideRollout,
			scope_type: Some(scope_type),
			variant: None,
		}
	}

	pub fn enabled(scope_type: ScopeType, variant: Option<String>) -> Self {
		Self {
			enabled: true,
			reason: ReasonCode::Ok,
			scope_type: Some(scope_type),
			variant,
		}
	}
}
