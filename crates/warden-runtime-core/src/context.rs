// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-request evaluation context.

use serde::{Deserialize, Serialize};

/// Identifiers supplied with a request; both are optional.
///
/// The evaluation engine uses `user_id` (falling back to `org_id`) as the
/// stable identity for rollout bucketing, and matches scoped records against
/// whichever identifiers are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationContext {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub org_id: Option<String>,
}

impl EvaluationContext {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}

	pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
		self.org_id = Some(org_id.into());
		self
	}

	/// The best available identity for deterministic bucketing: user id,
	/// else org id, else a fixed anonymous constant so bucketing stays
	/// stable for identity-less callers too.
	pub fn bucketing_identity(&self) -> &str {
		self.user_id
			.as_deref()
			.or(self.org_id.as_deref())
			.unwrap_or(Self::ANONYMOUS_IDENTITY)
	}

	pub const ANONYMOUS_IDENTITY: &'static str = "anonymous";

	pub fn is_anonymous(&self) -> bool {
		self.user_id.is_none() && self.org_id.is_none()
	}
}
