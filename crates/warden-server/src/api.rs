// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use sqlx::SqlitePool;
use tracing::warn;
use utoipa::OpenApi;

use warden_server_runtime::{
	BroadcasterConfig, FlagStore, RuntimeBroadcaster, SnapshotBuilder, SqliteFlagStore,
	StreamAuthorizer, StreamKeyAuthorizer,
};

use crate::api_docs::ApiDoc;
use crate::config::{RuntimeConfig, WardenConfig};
use crate::routes;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
	pub pool: SqlitePool,
	/// Management surface for embedders; handlers only read through the
	/// builder.
	pub store: Arc<SqliteFlagStore>,
	pub builder: Arc<SnapshotBuilder>,
	pub broadcaster: Arc<RuntimeBroadcaster>,
	pub authorizer: Arc<dyn StreamAuthorizer>,
	pub runtime: RuntimeConfig,
}

/// Build the application state from a connected pool and resolved config.
pub fn create_app_state(pool: SqlitePool, config: &WardenConfig) -> AppState {
	let store = Arc::new(SqliteFlagStore::new(pool.clone()));
	let builder = Arc::new(SnapshotBuilder::new(
		Arc::clone(&store) as Arc<dyn FlagStore>
	));
	let broadcaster = Arc::new(RuntimeBroadcaster::new(BroadcasterConfig {
		channel_capacity: config.runtime.channel_capacity,
		heartbeat_interval: Duration::from_secs(config.runtime.heartbeat_interval_secs),
	}));

	let authorizer = StreamKeyAuthorizer::new(config.auth.stream_key_hashes.clone());
	if authorizer.is_empty() {
		warn!("No stream keys configured, all stream connections will be rejected");
	}

	AppState {
		pool,
		store,
		builder,
		broadcaster,
		authorizer: Arc::new(authorizer),
		runtime: config.runtime.clone(),
	}
}

/// Build the router with all routes.
pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/runtime-config", get(routes::runtime::get_runtime_config))
		.route(
			"/admin/runtime-config/stream",
			get(routes::runtime::stream_runtime_config),
		)
		.route("/health", get(routes::health::health_check))
		.route("/api/openapi.json", get(openapi_spec))
		.with_state(state)
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
	Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
	use super::*;

	use axum::body::Body;
	use axum::http::{header, Request, StatusCode};
	use tokio_stream::StreamExt;
	use tower::ServiceExt;

	use warden_runtime_core::{FlagRecord, FlagScope};
	use warden_server_runtime::{generate_stream_key, hash_stream_key};

	use crate::config::sections::{AuthConfig, DatabaseConfig, HttpConfig, LoggingConfig};
	use crate::db::{create_pool, run_migrations};

	async fn create_test_app(
		stream_key_hashes: Vec<String>,
	) -> (Router, AppState, tempfile::TempDir) {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("api.db").display());
		let pool = create_pool(&url).await.unwrap();
		run_migrations(&pool).await.unwrap();

		let config = WardenConfig {
			http: HttpConfig::default(),
			database: DatabaseConfig { url },
			runtime: RuntimeConfig::default(),
			auth: AuthConfig { stream_key_hashes },
			logging: LoggingConfig::default(),
		};

		let state = create_app_state(pool, &config);
		(create_router(state.clone()), state, dir)
	}

	async fn body_json(response: axum::response::Response) -> serde_json::Value {
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	#[tokio::test]
	async fn test_health_reports_status_and_stream_stats() {
		let (app, _state, _dir) = create_test_app(vec![]).await;

		let response = app
			.oneshot(
				Request::builder()
					.uri("/health")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::OK);
		let json = body_json(response).await;
		assert_eq!(json["status"], "ok");
		assert_eq!(json["database"], true);
		assert_eq!(json["stream"]["subscribers"], 0);
		assert!(json["version"].is_string());
	}

	#[tokio::test]
	async fn test_runtime_config_serves_public_snapshot() {
		let (app, state, _dir) = create_test_app(vec![]).await;

		let mut public_flag = FlagRecord::new("ui.new_nav", FlagScope::Global);
		public_flag.enabled = true;
		public_flag.is_public = true;
		state.store.upsert_record(&public_flag).await.unwrap();

		let mut internal_flag = FlagRecord::new("billing.debug", FlagScope::Global);
		internal_flag.enabled = true;
		state.store.upsert_record(&internal_flag).await.unwrap();

		let response = app
			.oneshot(
				Request::builder()
					.uri("/runtime-config?environment=production&user_id=u_1")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(
			response.headers().get(header::CACHE_CONTROL).unwrap(),
			"private, no-store, max-age=0"
		);

		let json = body_json(response).await;
		assert_eq!(json["environment"], "production");
		assert_eq!(json["version"], 1);
		assert_eq!(json["evaluation_mode"], "public");
		assert_eq!(json["features"]["ui.new_nav"]["enabled"], true);
		// Internal flags never leak through the public endpoint.
		assert!(json["features"].get("billing.debug").is_none());
	}

	#[tokio::test]
	async fn test_runtime_config_defaults_the_environment() {
		let (app, _state, _dir) = create_test_app(vec![]).await;

		let response = app
			.oneshot(
				Request::builder()
					.uri("/runtime-config")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::OK);
		let json = body_json(response).await;
		assert_eq!(json["environment"], "production");
	}

	#[tokio::test]
	async fn test_runtime_config_rejects_invalid_environment() {
		let (app, _state, _dir) = create_test_app(vec![]).await;

		let response = app
			.oneshot(
				Request::builder()
					.uri("/runtime-config?environment=PROD")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		let json = body_json(response).await;
		assert_eq!(json["error"], "invalid_environment");
	}

	#[tokio::test]
	async fn test_stream_rejects_missing_key_with_plain_forbidden() {
		let (app, _state, _dir) = create_test_app(vec![]).await;

		let response = app
			.oneshot(
				Request::builder()
					.uri("/admin/runtime-config/stream")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::FORBIDDEN);
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		assert_eq!(&bytes[..], b"forbidden");
	}

	#[tokio::test]
	async fn test_stream_rejects_unrecognized_key() {
		let configured = generate_stream_key();
		let (app, _state, _dir) =
			create_test_app(vec![hash_stream_key(&configured).unwrap()]).await;

		let response = app
			.oneshot(
				Request::builder()
					.uri("/admin/runtime-config/stream")
					.header(
						header::AUTHORIZATION,
						format!("Bearer {}", generate_stream_key()),
					)
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::FORBIDDEN);
	}

	#[tokio::test]
	async fn test_stream_sends_initial_snapshot() {
		let key = generate_stream_key();
		let (app, _state, _dir) = create_test_app(vec![hash_stream_key(&key).unwrap()]).await;

		let response = app
			.oneshot(
				Request::builder()
					.uri("/admin/runtime-config/stream?environment=production")
					.header(header::AUTHORIZATION, format!("Bearer {key}"))
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(
			response.headers().get(header::CONTENT_TYPE).unwrap(),
			"text/event-stream"
		);

		let mut stream = response.into_body().into_data_stream();
		let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
			.await
			.unwrap()
			.unwrap()
			.unwrap();
		let frame = String::from_utf8(chunk.to_vec()).unwrap();
		assert!(frame.contains("event: snapshot"));
		assert!(frame.contains(r#""event":"snapshot""#));
	}

	#[tokio::test]
	async fn test_stream_rejects_invalid_environment_after_auth() {
		let key = generate_stream_key();
		let (app, _state, _dir) = create_test_app(vec![hash_stream_key(&key).unwrap()]).await;

		let response = app
			.oneshot(
				Request::builder()
					.uri("/admin/runtime-config/stream?environment=PROD")
					.header(header::AUTHORIZATION, format!("Bearer {key}"))
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		let json = body_json(response).await;
		assert_eq!(json["error"], "invalid_environment");
	}

	#[tokio::test]
	async fn test_openapi_document_is_served() {
		let (app, _state, _dir) = create_test_app(vec![]).await;

		let response = app
			.oneshot(
				Request::builder()
					.uri("/api/openapi.json")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::OK);
		let json = body_json(response).await;
		assert!(json["paths"]["/runtime-config"].is_object());
	}
}
