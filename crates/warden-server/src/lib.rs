// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Warden control plane server.
//!
//! HTTP host for runtime-config distribution: a public snapshot endpoint,
//! an authenticated SSE stream, background publishing loops, and layered
//! configuration. The evaluation and distribution machinery lives in
//! `warden-server-runtime`; this crate wires it to axum, SQLite, and the
//! process lifecycle.

pub mod api;
pub mod api_docs;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod tasks;

pub use api::{create_app_state, create_router, AppState};
pub use api_docs::ApiDoc;
pub use config::{load_config, load_config_with_file, WardenConfig};
pub use error::{Result, ServerError};
pub use tasks::BackgroundTasks;
