// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Health check HTTP handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::api::AppState;

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
	Ok,
	Degraded,
}

/// Stream distribution statistics.
#[derive(Debug, Serialize, ToSchema)]
pub struct StreamHealth {
	/// Environments with an active broadcast channel.
	pub environments: usize,
	/// Currently connected stream subscribers.
	pub subscribers: usize,
	/// Events published since startup.
	pub events_sent: u64,
	/// Stream connections accepted since startup.
	pub connections_total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
	pub status: HealthStatus,
	pub version: String,
	pub timestamp: String,
	/// Whether the flag store answered a ping.
	pub database: bool,
	pub stream: StreamHealth,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server is serving traffic", body = HealthResponse)
    ),
    tag = "health"
)]
/// GET /health - Liveness plus stream distribution statistics.
///
/// A failed store ping degrades the status but does not fail the check:
/// snapshot serving continues from defaults while the store is away.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
	let database = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
	if !database {
		warn!("health check: flag store unreachable, serving fallback snapshots");
	}

	let stats = state.broadcaster.stats().await;

	let response = HealthResponse {
		status: if database {
			HealthStatus::Ok
		} else {
			HealthStatus::Degraded
		},
		version: env!("CARGO_PKG_VERSION").to_string(),
		timestamp: chrono::Utc::now().to_rfc3339(),
		database,
		stream: StreamHealth {
			environments: stats.channel_count,
			subscribers: stats.total_receivers,
			events_sent: stats.total_events_sent,
			connections_total: stats.total_connections,
		},
	};

	(StatusCode::OK, Json(response))
}
