// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Live subscription for runtime configuration updates.
//!
//! With a stream key the subscription holds an SSE connection to the
//! server and reconnects with exponential backoff when it drops. While
//! the stream is down it polls the public snapshot endpoint so consumers
//! are never left on arbitrarily stale data. Without a stream key it
//! polls on a fixed interval instead.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eventsource_stream::{Event, Eventsource};
use futures::StreamExt;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_runtime_core::RuntimeStreamEvent;

use crate::cache::SnapshotCache;
use crate::error::{ClientError, Result};

/// Configuration for subscription behavior.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
	/// Base delay for reconnection attempts.
	pub reconnect_base_delay: Duration,
	/// Maximum delay for reconnection attempts.
	pub reconnect_max_delay: Duration,
	/// Maximum number of reconnection attempts (0 = unlimited).
	pub max_reconnect_attempts: u32,
	/// Whether to use exponential backoff for reconnection.
	pub use_exponential_backoff: bool,
	/// Interval between snapshot polls when the stream is unavailable.
	pub poll_interval: Duration,
}

impl Default for SubscriptionConfig {
	fn default() -> Self {
		Self {
			reconnect_base_delay: Duration::from_secs(1),
			reconnect_max_delay: Duration::from_secs(30),
			max_reconnect_attempts: 0, // Unlimited
			use_exponential_backoff: true,
			poll_interval: Duration::from_secs(30),
		}
	}
}

/// Lifecycle state of the live stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
	/// Not started, or stopped.
	#[default]
	Idle,
	/// Opening the stream connection.
	Connecting,
	/// Connection open, no event seen yet.
	Connected,
	/// Events are flowing.
	Receiving,
	/// Connection lost.
	Disconnected,
	/// Waiting out the backoff before the next connection attempt.
	Reconnecting,
	/// Polling-only mode; no stream key was configured.
	Polling,
}

impl StreamStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			StreamStatus::Idle => "idle",
			StreamStatus::Connecting => "connecting",
			StreamStatus::Connected => "connected",
			StreamStatus::Receiving => "receiving",
			StreamStatus::Disconnected => "disconnected",
			StreamStatus::Reconnecting => "reconnecting",
			StreamStatus::Polling => "polling",
		}
	}
}

impl std::fmt::Display for StreamStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Stream health written by the driver task and read by accessors.
#[derive(Debug, Default)]
struct StreamTelemetry {
	status: RwLock<StreamStatus>,
	last_event_at: RwLock<Option<DateTime<Utc>>>,
	last_heartbeat_at: RwLock<Option<DateTime<Utc>>>,
}

impl StreamTelemetry {
	async fn set_status(&self, status: StreamStatus) {
		*self.status.write().await = status;
	}

	async fn status(&self) -> StreamStatus {
		*self.status.read().await
	}

	async fn record_event(&self) {
		*self.status.write().await = StreamStatus::Receiving;
		*self.last_event_at.write().await = Some(Utc::now());
	}

	async fn record_heartbeat(&self) {
		*self.last_heartbeat_at.write().await = Some(Utc::now());
	}

	async fn last_event_at(&self) -> Option<DateTime<Utc>> {
		*self.last_event_at.read().await
	}

	async fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
		*self.last_heartbeat_at.read().await
	}
}

/// A running driver task plus its shutdown channel.
#[derive(Debug)]
struct DriverHandle {
	task: JoinHandle<()>,
	shutdown_tx: mpsc::Sender<()>,
}

/// Manages the background subscription for runtime configuration
/// updates.
#[derive(Debug)]
pub struct RuntimeSubscription {
	/// Whether the stream connection is currently open.
	connected: Arc<AtomicBool>,
	/// Number of reconnection attempts.
	reconnect_attempts: Arc<AtomicU64>,
	/// Number of stream events received.
	events_received: Arc<AtomicU64>,
	/// Stream health visible to accessors.
	telemetry: Arc<StreamTelemetry>,
	/// The running driver, when started.
	driver: Mutex<Option<DriverHandle>>,
}

impl RuntimeSubscription {
	/// Creates a new, stopped subscription.
	pub fn new() -> Self {
		Self {
			connected: Arc::new(AtomicBool::new(false)),
			reconnect_attempts: Arc::new(AtomicU64::new(0)),
			events_received: Arc::new(AtomicU64::new(0)),
			telemetry: Arc::new(StreamTelemetry::default()),
			driver: Mutex::new(None),
		}
	}

	/// Starts the subscription driver in a background task.
	///
	/// With `stream_key` set the driver streams from `stream_url`,
	/// reconnecting with exponential backoff and polling `poll_url`
	/// while disconnected. Without one it polls `poll_url` on the
	/// configured interval. A running driver is stopped first.
	pub async fn start(
		&self,
		stream_url: Url,
		poll_url: Url,
		stream_key: Option<String>,
		cache: SnapshotCache,
		config: SubscriptionConfig,
	) {
		let mut guard = self.driver.lock().await;

		// If already running, stop first
		if let Some(driver) = guard.take() {
			shutdown_driver(driver).await;
		}
		self.connected.store(false, Ordering::SeqCst);

		let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

		let connected = Arc::clone(&self.connected);
		let reconnect_attempts = Arc::clone(&self.reconnect_attempts);
		let events_received = Arc::clone(&self.events_received);
		let telemetry = Arc::clone(&self.telemetry);

		let task = tokio::spawn(async move {
			match stream_key {
				Some(key) => {
					run_stream_loop(
						stream_url,
						poll_url,
						key,
						cache,
						config,
						connected,
						reconnect_attempts,
						events_received,
						telemetry,
						shutdown_rx,
					)
					.await;
				}
				None => {
					run_poll_loop(poll_url, cache, config.poll_interval, telemetry, shutdown_rx)
						.await;
				}
			}
		});

		*guard = Some(DriverHandle { task, shutdown_tx });
	}

	/// Stops the subscription and waits for the driver task to exit.
	/// Safe to call when not running.
	pub async fn stop(&self) {
		let mut guard = self.driver.lock().await;
		if let Some(driver) = guard.take() {
			shutdown_driver(driver).await;
		}
		self.connected.store(false, Ordering::SeqCst);
		self.telemetry.set_status(StreamStatus::Idle).await;
	}

	/// Returns true while the stream connection is open.
	pub fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	/// Returns the number of reconnection attempts since the
	/// subscription was started.
	pub fn reconnect_attempts(&self) -> u64 {
		self.reconnect_attempts.load(Ordering::SeqCst)
	}

	/// Returns the number of stream events received since the
	/// subscription was started.
	pub fn events_received(&self) -> u64 {
		self.events_received.load(Ordering::SeqCst)
	}

	/// Current lifecycle state of the stream.
	pub async fn status(&self) -> StreamStatus {
		self.telemetry.status().await
	}

	/// When the last stream event arrived, if any has.
	pub async fn last_event_at(&self) -> Option<DateTime<Utc>> {
		self.telemetry.last_event_at().await
	}

	/// When the last heartbeat arrived, if any has.
	pub async fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
		self.telemetry.last_heartbeat_at().await
	}
}

impl Default for RuntimeSubscription {
	fn default() -> Self {
		Self::new()
	}
}

impl Drop for RuntimeSubscription {
	fn drop(&mut self) {
		if let Some(driver) = self.driver.get_mut().take() {
			driver.task.abort();
		}
	}
}

/// Signals the driver to stop and waits for it to exit.
async fn shutdown_driver(driver: DriverHandle) {
	let _ = driver.shutdown_tx.send(()).await;
	driver.task.abort();
	let _ = driver.task.await;
}

/// Runs the stream connection loop with reconnection and polling
/// fallback.
#[allow(clippy::too_many_arguments)]
async fn run_stream_loop(
	stream_url: Url,
	poll_url: Url,
	stream_key: String,
	cache: SnapshotCache,
	config: SubscriptionConfig,
	connected: Arc<AtomicBool>,
	reconnect_attempts: Arc<AtomicU64>,
	events_received: Arc<AtomicU64>,
	telemetry: Arc<StreamTelemetry>,
	mut shutdown_rx: mpsc::Receiver<()>,
) {
	let mut consecutive_failures: u32 = 0;

	loop {
		// Check for shutdown signal
		if shutdown_rx.try_recv().is_ok() {
			info!("Runtime stream received shutdown signal");
			break;
		}

		telemetry.set_status(StreamStatus::Connecting).await;
		info!(url = %stream_url, "Connecting to runtime stream");

		let events_before = events_received.load(Ordering::SeqCst);
		match connect_and_stream(
			&stream_url,
			&stream_key,
			&cache,
			&connected,
			&events_received,
			&telemetry,
		)
		.await
		{
			Ok(()) => {
				// Normal disconnect (e.g., server closed the stream)
				debug!("Runtime stream ended normally");
				consecutive_failures = 0;
			}
			Err(e) => {
				// Events that made it through reset the backoff schedule.
				if events_received.load(Ordering::SeqCst) > events_before {
					consecutive_failures = 0;
				}
				error!(error = %e, "Runtime stream error");
				consecutive_failures += 1;
			}
		}

		connected.store(false, Ordering::SeqCst);
		telemetry.set_status(StreamStatus::Disconnected).await;

		// Catch up over HTTP so consumers are not left stale while the
		// stream is down.
		if let Err(e) = poll_once(&poll_url, &cache).await {
			warn!(error = %e, "Snapshot poll failed");
		}

		// Check max reconnect attempts
		if config.max_reconnect_attempts > 0 && consecutive_failures >= config.max_reconnect_attempts
		{
			error!(
				attempts = consecutive_failures,
				"Max reconnection attempts reached, stopping stream"
			);
			break;
		}

		// Calculate backoff delay
		let delay = if config.use_exponential_backoff {
			let factor = 2u64.saturating_pow(consecutive_failures.min(10));
			let delay_ms = config.reconnect_base_delay.as_millis() as u64 * factor;
			Duration::from_millis(delay_ms.min(config.reconnect_max_delay.as_millis() as u64))
		} else {
			config.reconnect_base_delay
		};

		reconnect_attempts.fetch_add(1, Ordering::SeqCst);
		telemetry.set_status(StreamStatus::Reconnecting).await;
		warn!(
			delay_ms = delay.as_millis(),
			attempts = consecutive_failures,
			"Reconnecting to runtime stream"
		);

		if wait_with_polling(delay, config.poll_interval, &poll_url, &cache, &mut shutdown_rx).await
		{
			info!("Runtime stream received shutdown signal during reconnect wait");
			break;
		}
	}

	telemetry.set_status(StreamStatus::Idle).await;
}

/// Waits out a backoff delay, polling the snapshot endpoint whenever
/// the delay spans more than one poll interval. Returns true if a
/// shutdown signal arrived during the wait.
async fn wait_with_polling(
	delay: Duration,
	poll_interval: Duration,
	poll_url: &Url,
	cache: &SnapshotCache,
	shutdown_rx: &mut mpsc::Receiver<()>,
) -> bool {
	let mut remaining = delay;
	loop {
		let wait = remaining.min(poll_interval);
		tokio::select! {
			_ = tokio::time::sleep(wait) => {}
			_ = shutdown_rx.recv() => return true,
		}

		remaining = remaining.saturating_sub(wait);
		if remaining.is_zero() {
			return false;
		}

		if let Err(e) = poll_once(poll_url, cache).await {
			warn!(error = %e, "Snapshot poll failed during reconnect wait");
		}
	}
}

/// Runs the polling-only loop used when no stream key is configured.
async fn run_poll_loop(
	poll_url: Url,
	cache: SnapshotCache,
	poll_interval: Duration,
	telemetry: Arc<StreamTelemetry>,
	mut shutdown_rx: mpsc::Receiver<()>,
) {
	info!(
		url = %poll_url,
		interval_ms = poll_interval.as_millis(),
		"Starting snapshot polling"
	);
	telemetry.set_status(StreamStatus::Polling).await;

	// The first tick fires immediately, giving an initial fetch.
	let mut ticker = tokio::time::interval(poll_interval);
	ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				match poll_once(&poll_url, &cache).await {
					Ok(true) => debug!(version = cache.version(), "Snapshot applied from poll"),
					Ok(false) => {}
					Err(e) => warn!(error = %e, "Snapshot poll failed"),
				}
			}
			_ = shutdown_rx.recv() => {
				info!("Snapshot polling received shutdown signal");
				break;
			}
		}
	}

	telemetry.set_status(StreamStatus::Idle).await;
}

/// Fetches the current snapshot once and applies it to the cache.
/// Returns whether the snapshot superseded the held one.
async fn poll_once(poll_url: &Url, cache: &SnapshotCache) -> Result<bool> {
	let client = crate::http::builder()
		.build()
		.map_err(ClientError::ConnectionFailed)?;

	let response = client
		.get(poll_url.clone())
		.send()
		.await
		.map_err(ClientError::ConnectionFailed)?;

	if !response.status().is_success() {
		return Err(ClientError::ServerError {
			status: response.status().as_u16(),
			message: response.text().await.unwrap_or_default(),
		});
	}

	let snapshot = response
		.json()
		.await
		.map_err(|e| ClientError::ParseFailed(e.to_string()))?;

	Ok(cache.apply(snapshot))
}

/// Connects to the stream and processes events until disconnection.
async fn connect_and_stream(
	stream_url: &Url,
	stream_key: &str,
	cache: &SnapshotCache,
	connected: &Arc<AtomicBool>,
	events_received: &Arc<AtomicU64>,
	telemetry: &Arc<StreamTelemetry>,
) -> Result<()> {
	let client = crate::http::builder()
		.build()
		.map_err(ClientError::ConnectionFailed)?;

	let request = client
		.get(stream_url.clone())
		.header("Authorization", format!("Bearer {}", stream_key))
		.header("Accept", "text/event-stream")
		.header("Cache-Control", "no-cache");

	let response = request.send().await.map_err(ClientError::ConnectionFailed)?;

	if !response.status().is_success() {
		return Err(ClientError::ServerError {
			status: response.status().as_u16(),
			message: response.text().await.unwrap_or_default(),
		});
	}

	connected.store(true, Ordering::SeqCst);
	telemetry.set_status(StreamStatus::Connected).await;
	info!("Runtime stream established");

	let stream = response.bytes_stream();
	let mut event_stream = stream.eventsource();

	while let Some(event_result) = event_stream.next().await {
		match event_result {
			Ok(event) => {
				events_received.fetch_add(1, Ordering::SeqCst);
				telemetry.record_event().await;
				if let Err(e) = process_event(event, cache, telemetry).await {
					warn!(error = %e, "Failed to process stream event");
				}
			}
			Err(e) => {
				return Err(ClientError::StreamError(e.to_string()));
			}
		}
	}

	Ok(())
}

/// Processes a single stream event, applying snapshots to the cache.
async fn process_event(
	event: Event,
	cache: &SnapshotCache,
	telemetry: &StreamTelemetry,
) -> Result<()> {
	// Skip comment events and empty data
	if event.data.is_empty() {
		return Ok(());
	}

	let stream_event: RuntimeStreamEvent = serde_json::from_str(&event.data).map_err(|e| {
		warn!(data = %event.data, error = %e, "Failed to parse stream event");
		ClientError::ParseFailed(e.to_string())
	})?;

	debug!(event_type = %stream_event.event_type(), "Processing stream event");

	match stream_event {
		RuntimeStreamEvent::Snapshot(data) => {
			let version = data.snapshot.version;
			if cache.apply(data.snapshot) {
				info!(version = version, "Snapshot applied from stream");
			} else {
				debug!(
					version = version,
					held = cache.version(),
					"Stale snapshot discarded"
				);
			}
		}
		RuntimeStreamEvent::Heartbeat(_) => {
			telemetry.record_heartbeat().await;
			debug!("Heartbeat received");
		}
	}

	Ok(())
}
