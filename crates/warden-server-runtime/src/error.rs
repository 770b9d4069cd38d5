// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for runtime server operations.

use thiserror::Error;

/// Result type for runtime server operations.
pub type Result<T> = std::result::Result<T, ServerRuntimeError>;

/// Errors that can occur in runtime server operations.
#[derive(Debug, Error)]
pub enum ServerRuntimeError {
	#[error("invalid environment: {0}")]
	InvalidEnvironment(String),

	#[error("invalid stream key")]
	InvalidStreamKey,

	#[error("core error: {0}")]
	Core(#[from] warden_runtime_core::RuntimeError),

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("internal error: {0}")]
	Internal(String),
}
