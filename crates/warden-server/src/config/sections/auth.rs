// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stream authorization configuration.
//!
//! Only Argon2 hashes of stream keys live in configuration. An empty hash
//! set is valid and denies every stream connection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthConfigLayer {
	pub stream_key_hashes: Option<Vec<String>>,
}

impl AuthConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.stream_key_hashes.is_some() {
			self.stream_key_hashes = other.stream_key_hashes;
		}
	}

	pub fn finalize(self) -> AuthConfig {
		AuthConfig {
			stream_key_hashes: self.stream_key_hashes.unwrap_or_default(),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
	pub stream_key_hashes: Vec<String>,
}
