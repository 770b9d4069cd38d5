// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runtime configuration Rust SDK for Warden.
//!
//! This crate provides a client for consuming versioned runtime
//! configuration snapshots from a Warden server. It supports live
//! updates over SSE with automatic polling fallback, fail-closed flag
//! checks, and ops posture derivation.
//!
//! # Features
//!
//! - **Live Updates**: SSE streaming with exponential-backoff reconnect
//! - **Polling Fallback**: Snapshot fetches whenever the stream is down
//! - **Version Reconciliation**: Stale or duplicate snapshots are discarded
//! - **Fail-closed Flags**: Unknown flags and missing data read as disabled
//! - **Ops Guard**: Maintenance, read-only and lockdown posture from the snapshot
//!
//! # Example
//!
//! ```ignore
//! use warden_runtime::{EvaluationContext, RuntimeClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RuntimeClient::builder()
//!         .base_url("https://warden.example.com")
//!         .environment("production")
//!         .context(EvaluationContext::new().with_user_id("user123"))
//!         .build()
//!         .await?;
//!
//!     // Keep the snapshot fresh in the background
//!     client.start().await;
//!
//!     if client.feature_enabled("billing.new_invoice_flow") {
//!         // ...
//!     }
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```

mod cache;
mod client;
mod error;
mod http;
mod sse;

pub use cache::SnapshotCache;
pub use client::{RuntimeClient, RuntimeClientBuilder};
pub use error::{ClientError, Result};
pub use sse::{RuntimeSubscription, StreamStatus, SubscriptionConfig};

// Re-export core types for convenience
pub use warden_runtime_core::{
	Decision, EvaluationContext, EvaluationMode, GuardAction, OpsNotice, OpsPosture, ReasonCode,
	RuntimeSnapshot, RuntimeStreamEvent, SurfaceSensitivity, DEFAULT_ENVIRONMENT,
};
