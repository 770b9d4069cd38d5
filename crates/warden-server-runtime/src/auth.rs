// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stream key authentication for the privileged snapshot stream.
//!
//! Keys are opaque bearer tokens with a `wsk_` prefix. Only Argon2 hashes
//! are stored server-side; the plaintext exists once, at mint time. Any
//! failure while verifying counts as not authorized.

use argon2::{
	password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
	Argon2,
};
use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, ServerRuntimeError};

/// Prefix identifying a Warden stream key.
pub const STREAM_KEY_PREFIX: &str = "wsk_";

/// Mints a new stream key. The caller is responsible for showing it exactly
/// once and persisting only the hash.
pub fn generate_stream_key() -> String {
	let random = Uuid::new_v4().to_string().replace('-', "");
	format!("{}{}", STREAM_KEY_PREFIX, random)
}

/// Hashes a stream key using Argon2.
pub fn hash_stream_key(key: &str) -> Result<String> {
	let salt = SaltString::generate(&mut OsRng);
	let argon2 = Argon2::default();

	argon2
		.hash_password(key.as_bytes(), &salt)
		.map(|hash| hash.to_string())
		.map_err(|_| ServerRuntimeError::Internal("Failed to hash stream key".to_string()))
}

/// Verifies a stream key against a stored hash.
pub fn verify_stream_key(key: &str, hash: &str) -> Result<bool> {
	let parsed_hash = PasswordHash::new(hash)
		.map_err(|_| ServerRuntimeError::Internal("Invalid stream key hash format".to_string()))?;

	Ok(
		Argon2::default()
			.verify_password(key.as_bytes(), &parsed_hash)
			.is_ok(),
	)
}

/// Decides whether a presented credential may open the privileged stream.
#[async_trait]
pub trait StreamAuthorizer: Send + Sync {
	/// `true` only for a positively verified credential; every failure mode
	/// is a plain `false`.
	async fn authorize(&self, presented: &str) -> bool;
}

/// Authorizer backed by a fixed set of stream key hashes from configuration.
pub struct StreamKeyAuthorizer {
	key_hashes: Vec<String>,
}

impl StreamKeyAuthorizer {
	/// An authorizer over the configured hashes. An empty set denies
	/// everything.
	pub fn new(key_hashes: Vec<String>) -> Self {
		Self { key_hashes }
	}

	pub fn is_empty(&self) -> bool {
		self.key_hashes.is_empty()
	}
}

#[async_trait]
impl StreamAuthorizer for StreamKeyAuthorizer {
	async fn authorize(&self, presented: &str) -> bool {
		if !presented.starts_with(STREAM_KEY_PREFIX) {
			return false;
		}

		// O(n) over configured keys; key sets are tiny and this runs once
		// per connection establishment.
		for hash in &self.key_hashes {
			match verify_stream_key(presented, hash) {
				Ok(true) => return true,
				Ok(false) => {}
				Err(err) => {
					warn!(error = %err, "Skipping malformed stream key hash");
				}
			}
		}

		false
	}
}
