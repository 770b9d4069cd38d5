// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Environment names.
//!
//! Environments are plain names ("dev", "staging", "production") that scope
//! snapshots and stored overrides. There is no environment registry: an
//! unknown name is simply an environment nothing has been configured for.

/// The environment assumed when a caller does not name one.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Validates an environment name.
///
/// Valid names:
/// - Lowercase alphanumeric with underscores
/// - 2-50 characters
/// - First character a lowercase letter
pub fn validate_name(name: &str) -> bool {
	if name.len() < 2 || name.len() > 50 {
		return false;
	}

	let mut chars = name.chars();

	// First character must be lowercase letter
	match chars.next() {
		Some(c) if c.is_ascii_lowercase() => {}
		_ => return false,
	}

	chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
