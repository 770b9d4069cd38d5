// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The runtime configuration client.
//!
//! [`RuntimeClient`] holds the latest snapshot for one environment and
//! keeps it fresh through a background subscription (live stream with
//! polling fallback, or polling only). All reads are local and
//! non-blocking; flag checks fail closed while no snapshot is held, the
//! ops posture fails open.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use tokio::sync::watch;
use tracing::warn;
use warden_runtime_core::{
	rate_limit_multiplier, Decision, EvaluationContext, OpsPosture, RuntimeSnapshot,
	DEFAULT_ENVIRONMENT,
};

use crate::cache::SnapshotCache;
use crate::error::{ClientError, Result};
use crate::sse::{RuntimeSubscription, StreamStatus, SubscriptionConfig};

/// Default timeout for snapshot fetches. The stream connection is
/// exempt; it stays open indefinitely.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for consuming runtime configuration from a Warden server.
#[derive(Debug)]
pub struct RuntimeClient {
	http: Client,
	snapshot_url: Url,
	stream_url: Url,
	environment: String,
	stream_key: Option<String>,
	config: SubscriptionConfig,
	cache: SnapshotCache,
	subscription: RuntimeSubscription,
}

impl RuntimeClient {
	/// Creates a builder for configuring a client.
	pub fn builder() -> RuntimeClientBuilder {
		RuntimeClientBuilder::new()
	}

	/// Fetches the current snapshot over HTTP and applies it to the
	/// local cache.
	///
	/// Returns the fetched snapshot even when it was stale and the
	/// cache kept what it held.
	pub async fn fetch_snapshot(&self) -> Result<RuntimeSnapshot> {
		let response = self
			.http
			.get(self.snapshot_url.clone())
			.send()
			.await
			.map_err(ClientError::ConnectionFailed)?;

		if !response.status().is_success() {
			return Err(ClientError::ServerError {
				status: response.status().as_u16(),
				message: response.text().await.unwrap_or_default(),
			});
		}

		let snapshot: RuntimeSnapshot = response
			.json()
			.await
			.map_err(|e| ClientError::ParseFailed(e.to_string()))?;

		self.cache.apply(snapshot.clone());
		Ok(snapshot)
	}

	/// Starts the background subscription.
	///
	/// With a stream key the client streams live updates and falls back
	/// to polling while disconnected; without one it polls on the
	/// configured interval.
	pub async fn start(&self) {
		self.subscription
			.start(
				self.stream_url.clone(),
				self.snapshot_url.clone(),
				self.stream_key.clone(),
				self.cache.clone(),
				self.config.clone(),
			)
			.await;
	}

	/// Stops the background subscription. Idempotent.
	pub async fn stop(&self) {
		self.subscription.stop().await;
	}

	/// The currently held snapshot, if any has been received.
	pub fn snapshot(&self) -> Option<RuntimeSnapshot> {
		self.cache.current()
	}

	/// The version of the held snapshot; 0 before the first one arrives.
	pub fn version(&self) -> u64 {
		self.cache.version()
	}

	/// Enabled state for a flag key.
	///
	/// Fails closed: unknown keys and a missing snapshot both report
	/// disabled.
	pub fn feature_enabled(&self, key: &str) -> bool {
		self.cache
			.with_current(|s| s.map(|s| s.feature_enabled(key)).unwrap_or(false))
	}

	/// The full decision recorded for a flag key.
	pub fn feature(&self, key: &str) -> Option<Decision> {
		self.cache
			.with_current(|s| s.and_then(|s| s.feature(key)).cloned())
	}

	/// The selected variant for a flag key, when its decision carries
	/// one.
	pub fn variant(&self, key: &str) -> Option<String> {
		self.cache
			.with_current(|s| s.and_then(|s| s.feature(key)).and_then(|d| d.variant.clone()))
	}

	/// Ops switches currently in effect. Fails open before the first
	/// snapshot arrives.
	pub fn posture(&self) -> OpsPosture {
		self.cache.with_current(OpsPosture::from_snapshot)
	}

	/// Effective rate limit multiplier; 1.0 until a snapshot arrives.
	pub fn rate_limit_multiplier(&self) -> f64 {
		self.cache.with_current(rate_limit_multiplier)
	}

	/// Subscribes to snapshot changes via a watch channel.
	pub fn subscribe_changes(&self) -> watch::Receiver<Option<RuntimeSnapshot>> {
		self.cache.subscribe()
	}

	/// True while the stream connection is open.
	pub fn stream_connected(&self) -> bool {
		self.subscription.is_connected()
	}

	/// Current lifecycle state of the stream.
	pub async fn stream_status(&self) -> StreamStatus {
		self.subscription.status().await
	}

	/// Number of stream events received since the subscription started.
	pub fn events_received(&self) -> u64 {
		self.subscription.events_received()
	}

	/// Number of reconnection attempts since the subscription started.
	pub fn reconnect_attempts(&self) -> u64 {
		self.subscription.reconnect_attempts()
	}

	/// When the last stream event arrived, if any has.
	pub async fn last_stream_event_at(&self) -> Option<DateTime<Utc>> {
		self.subscription.last_event_at().await
	}

	/// When the last heartbeat arrived, if any has.
	pub async fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
		self.subscription.last_heartbeat_at().await
	}

	/// The environment this client is subscribed to.
	pub fn environment(&self) -> &str {
		&self.environment
	}
}

/// Builder for [`RuntimeClient`].
#[derive(Debug, Clone)]
pub struct RuntimeClientBuilder {
	base_url: Option<String>,
	environment: String,
	stream_key: Option<String>,
	context: EvaluationContext,
	config: SubscriptionConfig,
	timeout: Duration,
}

impl RuntimeClientBuilder {
	pub fn new() -> Self {
		Self {
			base_url: None,
			environment: DEFAULT_ENVIRONMENT.to_string(),
			stream_key: None,
			context: EvaluationContext::new(),
			config: SubscriptionConfig::default(),
			timeout: DEFAULT_REQUEST_TIMEOUT,
		}
	}

	/// Server base URL, e.g. `https://warden.example.com`. Required.
	pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = Some(base_url.into());
		self
	}

	/// Environment to subscribe to. Defaults to `production`.
	pub fn environment(mut self, environment: impl Into<String>) -> Self {
		self.environment = environment.into();
		self
	}

	/// Stream key for the privileged live stream. Without one the
	/// client polls the public snapshot endpoint instead.
	pub fn stream_key(mut self, stream_key: impl Into<String>) -> Self {
		self.stream_key = Some(stream_key.into());
		self
	}

	/// Identifiers sent with snapshot fetches for scoped evaluation.
	pub fn context(mut self, context: EvaluationContext) -> Self {
		self.context = context;
		self
	}

	/// Interval between snapshot polls when falling back to polling.
	pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
		self.config.poll_interval = poll_interval;
		self
	}

	/// Full subscription tuning (reconnect backoff, poll interval).
	pub fn subscription_config(mut self, config: SubscriptionConfig) -> Self {
		self.config = config;
		self
	}

	/// Timeout for snapshot fetches.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	/// Builds the client and warms the cache with an initial fetch.
	///
	/// A failed initial fetch is not fatal: the subscription retries and
	/// consumers fall back to defaults until data arrives.
	pub async fn build(self) -> Result<RuntimeClient> {
		let base_url = self
			.base_url
			.ok_or_else(|| ClientError::Configuration("base_url is required".to_string()))?;

		let (snapshot_url, stream_url) = build_urls(&base_url, &self.environment, &self.context)?;

		let http = crate::http::builder()
			.timeout(self.timeout)
			.build()
			.map_err(ClientError::ConnectionFailed)?;

		let client = RuntimeClient {
			http,
			snapshot_url,
			stream_url,
			environment: self.environment,
			stream_key: self.stream_key,
			config: self.config,
			cache: SnapshotCache::new(),
			subscription: RuntimeSubscription::new(),
		};

		if let Err(e) = client.fetch_snapshot().await {
			warn!(error = %e, "Initial snapshot fetch failed");
		}

		Ok(client)
	}
}

impl Default for RuntimeClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Builds the public snapshot URL and the privileged stream URL for an
/// environment, encoding context identifiers as query parameters.
fn build_urls(
	base_url: &str,
	environment: &str,
	context: &EvaluationContext,
) -> Result<(Url, Url)> {
	let base = base_url.trim_end_matches('/');

	let mut params: Vec<(&str, &str)> = vec![("environment", environment)];
	if let Some(user_id) = context.user_id.as_deref() {
		params.push(("user_id", user_id));
	}
	if let Some(org_id) = context.org_id.as_deref() {
		params.push(("org_id", org_id));
	}

	let snapshot_url = Url::parse_with_params(&format!("{}/runtime-config", base), &params)
		.map_err(|e| ClientError::Configuration(format!("invalid base URL: {}", e)))?;
	let stream_url = Url::parse_with_params(
		&format!("{}/admin/runtime-config/stream", base),
		[("environment", environment)],
	)
	.map_err(|e| ClientError::Configuration(format!("invalid base URL: {}", e)))?;

	Ok((snapshot_url, stream_url))
}
