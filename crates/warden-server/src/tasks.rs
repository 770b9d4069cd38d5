// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background loops: heartbeats, store refresh, and channel cleanup.
//!
//! Each loop runs on its own task and listens on a shared shutdown channel
//! so `shutdown()` can stop all of them and wait for completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use warden_runtime_core::RuntimeStreamEvent;
use warden_server_runtime::{RuntimeBroadcaster, SnapshotBuilder};

use crate::api::AppState;

/// Handle for the server's background loops.
pub struct BackgroundTasks {
	shutdown_tx: broadcast::Sender<()>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
	pub fn new() -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			shutdown_tx,
			handles: Mutex::new(Vec::new()),
		}
	}

	/// Spawn the heartbeat, refresh, and cleanup loops.
	pub async fn spawn_all(&self, state: &AppState) {
		let mut handles = self.handles.lock().await;

		handles.push(tokio::spawn(heartbeat_loop(
			Arc::clone(&state.broadcaster),
			self.shutdown_tx.subscribe(),
		)));

		handles.push(tokio::spawn(refresh_loop(
			Arc::clone(&state.builder),
			Arc::clone(&state.broadcaster),
			state.runtime.default_environment.clone(),
			Duration::from_secs(state.runtime.refresh_interval_secs),
			self.shutdown_tx.subscribe(),
		)));

		handles.push(tokio::spawn(cleanup_loop(
			Arc::clone(&state.broadcaster),
			Duration::from_secs(state.runtime.cleanup_interval_secs),
			self.shutdown_tx.subscribe(),
		)));

		info!(tasks = handles.len(), "Background tasks started");
	}

	/// Signal all loops to stop and wait for them to finish.
	pub async fn shutdown(&self) {
		info!("Shutting down background tasks");
		let _ = self.shutdown_tx.send(());

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			if let Err(e) = handle.await {
				warn!(error = %e, "Background task panicked during shutdown");
			}
		}
		info!("Background tasks stopped");
	}
}

impl Default for BackgroundTasks {
	fn default() -> Self {
		Self::new()
	}
}

/// Sends a heartbeat on every active channel at the broadcaster's configured
/// interval so stream clients can distinguish "no changes" from a dead
/// connection.
async fn heartbeat_loop(
	broadcaster: Arc<RuntimeBroadcaster>,
	mut shutdown_rx: broadcast::Receiver<()>,
) {
	let mut ticker = tokio::time::interval(broadcaster.heartbeat_interval());
	ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				broadcaster.broadcast_heartbeat().await;
			}
			_ = shutdown_rx.recv() => {
				info!("Heartbeat loop stopped");
				break;
			}
		}
	}
}

/// Re-reads the store and publishes a snapshot event whenever the state for
/// an environment changed. The default environment is always refreshed so
/// its version advances even with no stream subscribers.
async fn refresh_loop(
	builder: Arc<SnapshotBuilder>,
	broadcaster: Arc<RuntimeBroadcaster>,
	default_environment: String,
	interval: Duration,
	mut shutdown_rx: broadcast::Receiver<()>,
) {
	let mut ticker = tokio::time::interval(interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				let mut environments = broadcaster.active_environments().await;
				if !environments.contains(&default_environment) {
					environments.push(default_environment.clone());
				}

				for environment in environments {
					if let Some(snapshot) = builder.refresh(&environment).await {
						let version = snapshot.version;
						let receivers = broadcaster
							.broadcast(&environment, RuntimeStreamEvent::snapshot(snapshot))
							.await;
						info!(
							environment = %environment,
							version,
							receivers,
							"Published runtime snapshot"
						);
					}
				}
			}
			_ = shutdown_rx.recv() => {
				info!("Refresh loop stopped");
				break;
			}
		}
	}
}

/// Drops broadcast channels that no longer have any receivers.
async fn cleanup_loop(
	broadcaster: Arc<RuntimeBroadcaster>,
	interval: Duration,
	mut shutdown_rx: broadcast::Receiver<()>,
) {
	let mut ticker = tokio::time::interval(interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				let removed = broadcaster.cleanup_empty_channels().await;
				if removed > 0 {
					debug!(removed, "Cleaned up idle stream channels");
				}
			}
			_ = shutdown_rx.recv() => {
				info!("Cleanup loop stopped");
				break;
			}
		}
	}
}
