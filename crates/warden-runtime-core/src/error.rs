// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the control plane core.

use thiserror::Error;

/// Result type for control plane operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur in control plane core operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
	#[error("invalid flag key: {0}")]
	InvalidFlagKey(String),

	#[error("invalid environment name: {0}")]
	InvalidEnvironment(String),

	#[error("invalid flag record: {0}")]
	InvalidRecord(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("internal error: {0}")]
	Internal(String),
}
