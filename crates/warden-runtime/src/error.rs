// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the runtime configuration client.

use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the runtime configuration client.
#[derive(Debug, Error)]
pub enum ClientError {
	/// The client was constructed with missing or invalid settings.
	#[error("configuration error: {0}")]
	Configuration(String),

	/// The HTTP request could not be sent or completed.
	#[error("connection failed: {0}")]
	ConnectionFailed(reqwest::Error),

	/// The server answered with a non-success status.
	#[error("server returned {status}: {message}")]
	ServerError { status: u16, message: String },

	/// The event stream broke mid-flight.
	#[error("stream error: {0}")]
	StreamError(String),

	/// A server payload failed to deserialize.
	#[error("failed to parse server response: {0}")]
	ParseFailed(String),
}
