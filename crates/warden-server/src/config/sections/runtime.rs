// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runtime distribution configuration section.
//!
//! Pacing for the snapshot publishing machinery: how often heartbeats go
//! out, how often the store is re-read for changes, and how the broadcast
//! channels are sized.

use serde::{Deserialize, Serialize};

use warden_runtime_core::DEFAULT_ENVIRONMENT;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfigLayer {
	pub default_environment: Option<String>,
	pub heartbeat_interval_secs: Option<u64>,
	pub refresh_interval_secs: Option<u64>,
	pub cleanup_interval_secs: Option<u64>,
	pub channel_capacity: Option<usize>,
}

impl RuntimeConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.default_environment.is_some() {
			self.default_environment = other.default_environment;
		}
		if other.heartbeat_interval_secs.is_some() {
			self.heartbeat_interval_secs = other.heartbeat_interval_secs;
		}
		if other.refresh_interval_secs.is_some() {
			self.refresh_interval_secs = other.refresh_interval_secs;
		}
		if other.cleanup_interval_secs.is_some() {
			self.cleanup_interval_secs = other.cleanup_interval_secs;
		}
		if other.channel_capacity.is_some() {
			self.channel_capacity = other.channel_capacity;
		}
	}

	pub fn finalize(self) -> RuntimeConfig {
		RuntimeConfig {
			default_environment: self
				.default_environment
				.unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
			heartbeat_interval_secs: self.heartbeat_interval_secs.unwrap_or(30),
			refresh_interval_secs: self.refresh_interval_secs.unwrap_or(5),
			cleanup_interval_secs: self.cleanup_interval_secs.unwrap_or(60),
			channel_capacity: self.channel_capacity.unwrap_or(256),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
	/// Environment assumed when a request does not name one.
	pub default_environment: String,
	pub heartbeat_interval_secs: u64,
	pub refresh_interval_secs: u64,
	pub cleanup_interval_secs: u64,
	pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		RuntimeConfigLayer::default().finalize()
	}
}
