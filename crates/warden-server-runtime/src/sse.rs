// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SSE (Server-Sent Events) streaming infrastructure for snapshot delivery.
//!
//! The broadcaster fans freshly published snapshots out to every stream
//! subscriber of an environment. Channels are created lazily on first
//! subscribe and torn down by periodic cleanup once the last receiver goes
//! away. A slow consumer only lags its own broadcast receiver; reconnecting
//! replaces whatever it missed with the then-current snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use warden_runtime_core::RuntimeStreamEvent;

/// Default channel capacity per environment.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default heartbeat interval in seconds.
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Configuration for the runtime broadcaster.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
	/// Capacity of each broadcast channel.
	pub channel_capacity: usize,
	/// Heartbeat interval for keep-alive.
	pub heartbeat_interval: Duration,
}

impl Default for BroadcasterConfig {
	fn default() -> Self {
		Self {
			channel_capacity: DEFAULT_CHANNEL_CAPACITY,
			heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
		}
	}
}

/// Statistics for a broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelStats {
	/// Number of active receivers.
	pub receiver_count: usize,
	/// When the channel was created.
	pub created_at: DateTime<Utc>,
}

/// Internal channel state.
struct ChannelState {
	sender: broadcast::Sender<RuntimeStreamEvent>,
	created_at: DateTime<Utc>,
}

/// Broadcasts runtime snapshot updates to connected SSE clients.
///
/// This is the central hub for real-time snapshot streaming. It manages
/// per-environment broadcast channels and tracks connection statistics.
pub struct RuntimeBroadcaster {
	config: BroadcasterConfig,
	channels: RwLock<HashMap<String, ChannelState>>,
	total_events: AtomicU64,
	total_connections: AtomicU64,
}

impl RuntimeBroadcaster {
	/// Create a new broadcaster with the given configuration.
	pub fn new(config: BroadcasterConfig) -> Self {
		Self {
			config,
			channels: RwLock::new(HashMap::new()),
			total_events: AtomicU64::new(0),
			total_connections: AtomicU64::new(0),
		}
	}

	/// Create a new broadcaster with default configuration.
	pub fn with_defaults() -> Self {
		Self::new(BroadcasterConfig::default())
	}

	/// Subscribe to snapshot updates for a specific environment.
	pub async fn subscribe(&self, environment: &str) -> broadcast::Receiver<RuntimeStreamEvent> {
		// First, try to get an existing channel with a read lock
		{
			let channels = self.channels.read().await;
			if let Some(state) = channels.get(environment) {
				self.total_connections.fetch_add(1, Ordering::Relaxed);
				debug!(
					environment = %environment,
					receiver_count = state.sender.receiver_count(),
					"Client subscribed to existing runtime channel"
				);
				return state.sender.subscribe();
			}
		}

		// Channel doesn't exist, create it with a write lock
		let mut channels = self.channels.write().await;

		// Double-check in case another task created it while we were waiting
		if let Some(state) = channels.get(environment) {
			self.total_connections.fetch_add(1, Ordering::Relaxed);
			return state.sender.subscribe();
		}

		let (sender, receiver) = broadcast::channel(self.config.channel_capacity);
		channels.insert(
			environment.to_string(),
			ChannelState {
				sender,
				created_at: Utc::now(),
			},
		);
		self.total_connections.fetch_add(1, Ordering::Relaxed);

		info!(
			environment = %environment,
			"Created new broadcast channel for runtime snapshots"
		);

		receiver
	}

	/// Broadcast an event to all subscribers of a specific environment.
	///
	/// Returns the number of clients that received the event.
	pub async fn broadcast(&self, environment: &str, event: RuntimeStreamEvent) -> usize {
		let channels = self.channels.read().await;

		if let Some(state) = channels.get(environment) {
			let receiver_count = state.sender.receiver_count();
			if receiver_count == 0 {
				debug!(
					environment = %environment,
					event_type = event.event_type(),
					"No receivers for runtime broadcast"
				);
				return 0;
			}

			match state.sender.send(event.clone()) {
				Ok(count) => {
					self.total_events.fetch_add(1, Ordering::Relaxed);
					debug!(
						environment = %environment,
						event_type = event.event_type(),
						version = ?event.version(),
						receiver_count = count,
						"Broadcast runtime event to receivers"
					);
					count
				}
				Err(e) => {
					warn!(
						environment = %environment,
						error = %e,
						"Failed to broadcast runtime event"
					);
					0
				}
			}
		} else {
			debug!(
				environment = %environment,
				event_type = event.event_type(),
				"No channel exists for environment"
			);
			0
		}
	}

	/// Broadcast a heartbeat to all connected clients.
	pub async fn broadcast_heartbeat(&self) {
		let event = RuntimeStreamEvent::heartbeat();
		let channels = self.channels.read().await;

		for (_key, state) in channels.iter() {
			let _ = state.sender.send(event.clone());
		}

		debug!(
			channel_count = channels.len(),
			"Broadcast heartbeat to all runtime channels"
		);
	}

	/// Get statistics for a specific channel.
	pub async fn channel_stats(&self, environment: &str) -> Option<ChannelStats> {
		let channels = self.channels.read().await;

		channels.get(environment).map(|state| ChannelStats {
			receiver_count: state.sender.receiver_count(),
			created_at: state.created_at,
		})
	}

	/// Get total number of active channels.
	pub async fn channel_count(&self) -> usize {
		self.channels.read().await.len()
	}

	/// Environments that currently have a broadcast channel.
	pub async fn active_environments(&self) -> Vec<String> {
		self.channels.read().await.keys().cloned().collect()
	}

	/// Get total number of connected receivers across all channels.
	pub async fn total_receiver_count(&self) -> usize {
		let channels = self.channels.read().await;
		channels.values().map(|s| s.sender.receiver_count()).sum()
	}

	/// Get total events sent across all channels.
	pub fn total_events_sent(&self) -> u64 {
		self.total_events.load(Ordering::Relaxed)
	}

	/// Get total connections ever made.
	pub fn total_connections(&self) -> u64 {
		self.total_connections.load(Ordering::Relaxed)
	}

	/// Get the heartbeat interval.
	pub fn heartbeat_interval(&self) -> Duration {
		self.config.heartbeat_interval
	}

	/// Clean up channels with no active receivers.
	pub async fn cleanup_empty_channels(&self) -> usize {
		let mut channels = self.channels.write().await;
		let initial_count = channels.len();

		channels.retain(|key, state| {
			let keep = state.sender.receiver_count() > 0;
			if !keep {
				debug!(
					environment = %key,
					"Removing empty runtime broadcast channel"
				);
			}
			keep
		});

		let removed = initial_count - channels.len();
		if removed > 0 {
			info!(
				removed_channels = removed,
				"Cleaned up empty runtime broadcast channels"
			);
		}
		removed
	}
}

/// Global broadcaster stats for monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcasterStats {
	/// Total number of active channels.
	pub channel_count: usize,
	/// Total number of connected receivers.
	pub total_receivers: usize,
	/// Total events sent since start.
	pub total_events_sent: u64,
	/// Total connections ever made.
	pub total_connections: u64,
}

impl RuntimeBroadcaster {
	/// Get global broadcaster statistics.
	pub async fn stats(&self) -> BroadcasterStats {
		BroadcasterStats {
			channel_count: self.channel_count().await,
			total_receivers: self.total_receiver_count().await,
			total_events_sent: self.total_events_sent(),
			total_connections: self.total_connections(),
		}
	}
}
