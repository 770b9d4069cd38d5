// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("runtime error: {0}")]
	Runtime(#[from] warden_server_runtime::ServerRuntimeError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
