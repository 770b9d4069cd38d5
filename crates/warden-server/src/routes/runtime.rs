// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runtime-config HTTP handlers: the public snapshot endpoint and the
//! authenticated SSE stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
	extract::{Query, State},
	http::{header, HeaderMap, StatusCode},
	response::{
		sse::{Event, KeepAlive, Sse},
		IntoResponse, Response,
	},
	Json,
};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

use warden_runtime_core::{
	environment::validate_name, EvaluationContext, EvaluationMode, RuntimeSnapshot,
	RuntimeStreamEvent,
};

use crate::api::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct RuntimeConfigParams {
	/// Environment to evaluate against. Defaults to the configured default.
	pub environment: Option<String>,
	/// Stable user identifier, used for user scoping and rollout bucketing.
	pub user_id: Option<String>,
	/// Organization identifier, used for organization scoping.
	pub org_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StreamParams {
	/// Environment to stream. Defaults to the configured default.
	pub environment: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RuntimeErrorResponse {
	pub error: String,
}

fn invalid_environment() -> Response {
	(
		StatusCode::BAD_REQUEST,
		Json(RuntimeErrorResponse {
			error: "invalid_environment".to_string(),
		}),
	)
		.into_response()
}

#[utoipa::path(
	get,
	path = "/runtime-config",
	params(RuntimeConfigParams),
	responses(
		(status = 200, description = "Public runtime snapshot", body = RuntimeSnapshot),
		(status = 400, description = "Invalid environment name", body = RuntimeErrorResponse),
		(status = 500, description = "Snapshot could not be produced", body = RuntimeErrorResponse)
	),
	tag = "runtime"
)]
#[tracing::instrument(skip(state, params))]
/// GET /runtime-config - Public snapshot for one caller.
///
/// Unauthenticated. The snapshot is evaluated in public mode, so internal
/// flags and privileged ops fields never appear in the body regardless of
/// the query parameters.
pub async fn get_runtime_config(
	State(state): State<AppState>,
	Query(params): Query<RuntimeConfigParams>,
) -> Response {
	let environment = params
		.environment
		.unwrap_or_else(|| state.runtime.default_environment.clone());

	if !validate_name(&environment) {
		return invalid_environment();
	}

	let mut context = EvaluationContext::new();
	if let Some(user_id) = params.user_id {
		context = context.with_user_id(user_id);
	}
	if let Some(org_id) = params.org_id {
		context = context.with_org_id(org_id);
	}

	let snapshot = state
		.builder
		.build(&environment, &context, EvaluationMode::Public)
		.await;

	let body = match serde_json::to_string(&snapshot) {
		Ok(body) => body,
		Err(e) => {
			error!(
				error = %e,
				environment = %environment,
				"Failed to serialize runtime snapshot"
			);
			return (
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(RuntimeErrorResponse {
					error: "runtime_unavailable".to_string(),
				}),
			)
				.into_response();
		}
	};

	// Snapshots are per-caller (rollout buckets differ by identity), so
	// shared caches must never store them.
	(
		StatusCode::OK,
		[
			(header::CACHE_CONTROL, "private, no-store, max-age=0"),
			(header::CONTENT_TYPE, "application/json"),
		],
		body,
	)
		.into_response()
}

#[utoipa::path(
	get,
	path = "/admin/runtime-config/stream",
	params(StreamParams),
	responses(
		(status = 200, description = "SSE stream of snapshot and heartbeat events"),
		(status = 400, description = "Invalid environment name", body = RuntimeErrorResponse),
		(status = 403, description = "Missing or unrecognized stream key")
	),
	tag = "runtime"
)]
#[tracing::instrument(skip(state, headers, params))]
/// GET /admin/runtime-config/stream - Live snapshot stream.
///
/// Requires a stream key as a bearer token. On connect the current
/// privileged snapshot is sent immediately, then every published snapshot
/// and heartbeat for the environment follows.
pub async fn stream_runtime_config(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(params): Query<StreamParams>,
) -> Response {
	let authorized = match bearer_token(&headers) {
		Some(token) => state.authorizer.authorize(token).await,
		None => false,
	};
	if !authorized {
		info!("Stream connection rejected, missing or unrecognized stream key");
		return (StatusCode::FORBIDDEN, "forbidden").into_response();
	}

	let environment = params
		.environment
		.unwrap_or_else(|| state.runtime.default_environment.clone());

	if !validate_name(&environment) {
		return invalid_environment();
	}

	// Subscribe before building so a publish between the two cannot be
	// missed; a duplicate version on connect is reconciled client-side.
	let receiver = state.broadcaster.subscribe(&environment).await;
	let snapshot = state
		.builder
		.build(
			&environment,
			&EvaluationContext::new(),
			EvaluationMode::Privileged,
		)
		.await;

	info!(
		environment = %environment,
		version = snapshot.version,
		"Stream subscriber connected"
	);

	let initial = tokio_stream::iter(sse_event(&RuntimeStreamEvent::snapshot(snapshot)));
	let live = BroadcastStream::new(receiver).filter_map(|result| match result {
		Ok(event) => sse_event(&event),
		Err(e) => {
			// A lagged receiver drops events; the next snapshot or heartbeat
			// resynchronizes the client.
			debug!(error = %e, "Stream receiver lagged");
			None
		}
	});

	Sse::new(initial.chain(live))
		.keep_alive(
			KeepAlive::new()
				.interval(Duration::from_secs(15))
				.text("keep-alive"),
		)
		.into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
	headers
		.get(header::AUTHORIZATION)?
		.to_str()
		.ok()?
		.strip_prefix("Bearer ")
}

fn sse_event(event: &RuntimeStreamEvent) -> Option<Result<Event, Infallible>> {
	match serde_json::to_string(event) {
		Ok(json) => Some(Ok(Event::default().event(event.event_type()).data(json))),
		Err(e) => {
			error!(error = %e, "Failed to serialize stream event");
			None
		}
	}
}
