// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runtime configuration server implementation for Warden.
//!
//! This crate provides the server-side implementation for the runtime
//! control plane: flag persistence, deterministic evaluation, versioned
//! snapshot assembly, SSE fan-out, and stream key authentication.
//!
//! # Architecture
//!
//! - `store` - Persistence for flag records and runtime overrides
//! - `evaluation` - Deterministic flag evaluation engine
//! - `snapshot` - Versioned snapshot builder with last-known-good fallback
//! - `sse` - Per-environment broadcast channels for snapshot streaming
//! - `auth` - Stream key minting and verification
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use warden_server_runtime::{FlagStore, SnapshotBuilder, SqliteFlagStore};
//! use warden_runtime_core::{EvaluationContext, EvaluationMode};
//!
//! // Create store and builder
//! let store = Arc::new(SqliteFlagStore::new(pool));
//! let builder = SnapshotBuilder::new(store);
//!
//! // Build a snapshot for one caller
//! let context = EvaluationContext::new().with_user_id("user123");
//! let snapshot = builder
//!     .build("production", &context, EvaluationMode::Public)
//!     .await;
//! ```

pub mod auth;
pub mod error;
pub mod evaluation;
pub mod snapshot;
pub mod sse;
pub mod store;

pub use auth::{
	generate_stream_key, hash_stream_key, verify_stream_key, StreamAuthorizer,
	StreamKeyAuthorizer, STREAM_KEY_PREFIX,
};
pub use error::{Result, ServerRuntimeError};
pub use evaluation::{evaluate_feature_decision, evaluate_feature_decision_at};
pub use snapshot::SnapshotBuilder;
pub use sse::{BroadcasterConfig, BroadcasterStats, ChannelStats, RuntimeBroadcaster};
pub use store::{ConfigOverride, FlagStore, MemoryFlagStore, OverrideSection, SqliteFlagStore};

// Re-export core types for convenience
pub use warden_runtime_core::*;
