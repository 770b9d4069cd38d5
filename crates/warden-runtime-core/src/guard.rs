// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ops guard: derives surface restrictions from the current snapshot.
//!
//! The guard fails open on absence of data: before the first snapshot
//! arrives nothing is restricted. It fails closed only on an explicit
//! lockdown signal in a snapshot that was actually received.

use serde::{Deserialize, Serialize};

use crate::snapshot::RuntimeSnapshot;

/// How exposed a surface is to a lockdown.
///
/// Sensitive surfaces (billing mutations, evidence uploads, admin panels)
/// are hard-blocked under emergency lockdown; standard surfaces only show
/// a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceSensitivity {
	Standard,
	Sensitive,
}

/// A banner-level condition the surface should announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpsNotice {
	Maintenance,
	ReadOnly,
	Lockdown,
}

/// What the surface should do right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardAction {
	Allow,
	/// Proceed, but announce the listed conditions.
	Notice(Vec<OpsNotice>),
	Block,
}

/// The ops switches in effect, extracted from a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpsPosture {
	pub maintenance_mode: bool,
	pub read_only_mode: bool,
	pub emergency_lockdown: bool,
}

impl OpsPosture {
	/// No snapshot yet means no restriction.
	pub fn from_snapshot(snapshot: Option<&RuntimeSnapshot>) -> Self {
		match snapshot {
			Some(s) => Self {
				maintenance_mode: s.ops.maintenance_mode,
				read_only_mode: s.ops.read_only_mode,
				emergency_lockdown: s.ops.emergency_lockdown,
			},
			None => Self::default(),
		}
	}

	/// Whether a surface of the given sensitivity is hard-blocked.
	pub fn blocks(&self, surface: SurfaceSensitivity) -> bool {
		self.emergency_lockdown && surface == SurfaceSensitivity::Sensitive
	}

	/// Whether writes should be refused (read-only mode or lockdown).
	pub fn refuses_writes(&self) -> bool {
		self.read_only_mode || self.emergency_lockdown
	}

	pub fn notices(&self) -> Vec<OpsNotice> {
		let mut notices = Vec::new();
		if self.emergency_lockdown {
			notices.push(OpsNotice::Lockdown);
		}
		if self.maintenance_mode {
			notices.push(OpsNotice::Maintenance);
		}
		if self.read_only_mode {
			notices.push(OpsNotice::ReadOnly);
		}
		notices
	}

	pub fn assess(&self, surface: SurfaceSensitivity) -> GuardAction {
		if self.blocks(surface) {
			return GuardAction::Block;
		}

		let notices = self.notices();
		if notices.is_empty() {
			GuardAction::Allow
		} else {
			GuardAction::Notice(notices)
		}
	}
}

/// Effective rate limit multiplier; 1.0 until a snapshot arrives.
pub fn rate_limit_multiplier(snapshot: Option<&RuntimeSnapshot>) -> f64 {
	snapshot.map(|s| s.ops.rate_limit_multiplier).unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::snapshot::EvaluationMode;

	fn snapshot_with(
		maintenance: bool,
		read_only: bool,
		lockdown: bool,
	) -> RuntimeSnapshot {
		let mut snapshot = RuntimeSnapshot::defaults("production", EvaluationMode::Public);
		snapshot.ops.maintenance_mode = maintenance;
		snapshot.ops.read_only_mode = read_only;
		snapshot.ops.emergency_lockdown = lockdown;
		snapshot
	}

	#[test]
	fn test_no_snapshot_fails_open() {
		let posture = OpsPosture::from_snapshot(None);
		assert_eq!(posture.assess(SurfaceSensitivity::Standard), GuardAction::Allow);
		assert_eq!(
			posture.assess(SurfaceSensitivity::Sensitive),
			GuardAction::Allow
		);
		assert!(!posture.refuses_writes());
		assert_eq!(rate_limit_multiplier(None), 1.0);
	}

	#[test]
	fn test_lockdown_blocks_sensitive_only() {
		let snapshot = snapshot_with(false, false, true);
		let posture = OpsPosture::from_snapshot(Some(&snapshot));

		assert_eq!(
			posture.assess(SurfaceSensitivity::Sensitive),
			GuardAction::Block
		);
		assert_eq!(
			posture.assess(SurfaceSensitivity::Standard),
			GuardAction::Notice(vec![OpsNotice::Lockdown])
		);
		assert!(posture.refuses_writes());
	}

	#[test]
	fn test_maintenance_and_read_only_notice_never_block() {
		let snapshot = snapshot_with(true, true, false);
		let posture = OpsPosture::from_snapshot(Some(&snapshot));

		assert_eq!(
			posture.assess(SurfaceSensitivity::Sensitive),
			GuardAction::Notice(vec![OpsNotice::Maintenance, OpsNotice::ReadOnly])
		);
		assert!(posture.refuses_writes());
		assert!(!posture.blocks(SurfaceSensitivity::Sensitive));
	}

	#[test]
	fn test_quiet_snapshot_allows() {
		let snapshot = snapshot_with(false, false, false);
		let posture = OpsPosture::from_snapshot(Some(&snapshot));

		assert_eq!(posture.assess(SurfaceSensitivity::Standard), GuardAction::Allow);
		assert!(!posture.refuses_writes());
	}

	#[test]
	fn test_rate_limit_multiplier_from_snapshot() {
		let mut snapshot = snapshot_with(false, false, false);
		snapshot.ops.rate_limit_multiplier = 0.25;
		assert_eq!(rate_limit_multiplier(Some(&snapshot)), 0.25);
	}
}
