// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! OpenAPI documentation, served at `/api/openapi.json`.

use utoipa::OpenApi;

use warden_runtime_core::{
	Decision, EvaluationMode, MarketingConfig, OpsConfig, ReasonCode, RuntimeSnapshot, ScopeType,
};

use crate::routes::health::{HealthResponse, HealthStatus, StreamHealth};
use crate::routes::runtime::RuntimeErrorResponse;

#[derive(OpenApi)]
#[openapi(
	paths(
		crate::routes::runtime::get_runtime_config,
		crate::routes::runtime::stream_runtime_config,
		crate::routes::health::health_check,
	),
	components(schemas(
		RuntimeSnapshot,
		Decision,
		ReasonCode,
		ScopeType,
		EvaluationMode,
		OpsConfig,
		MarketingConfig,
		RuntimeErrorResponse,
		HealthResponse,
		HealthStatus,
		StreamHealth,
	)),
	tags(
		(name = "runtime", description = "Runtime configuration distribution"),
		(name = "health", description = "Service health")
	),
	info(
		title = "Warden Control Plane",
		description = "Feature flag and runtime configuration distribution API"
	)
)]
pub struct ApiDoc;
