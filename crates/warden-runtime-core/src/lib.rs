// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Warden control plane.
//!
//! This crate provides shared types for flag records, evaluation decisions,
//! runtime snapshots, and the stream protocol. It is used by both the
//! server-side engine (`warden-server-runtime`) and the client SDK
//! (`warden-runtime`).
//!
//! # Overview
//!
//! The control plane supports:
//! - Layered flag scoping (user beats organization beats global)
//! - Kill switches, schedule windows, percentage rollouts, weighted variants
//! - Immutable versioned snapshots per environment
//! - Real-time distribution via SSE with polling fallback
//! - Ops switches (maintenance, read-only, emergency lockdown)
//!
//! # Example
//!
//! ```
//! use warden_runtime_core::{Decision, EvaluationContext, ReasonCode};
//!
//! let ctx = EvaluationContext::new()
//!     .with_user_id("u_1")
//!     .with_org_id("o_1");
//!
//! // Decisions are the only flag detail callers ever see
//! let decision = Decision::not_configured();
//! assert_eq!(decision.reason, ReasonCode::NotConfigured);
//! ```

pub mod context;
pub mod decision;
pub mod environment;
pub mod error;
pub mod flag;
pub mod guard;
pub mod snapshot;
pub mod sse;

pub use context::EvaluationContext;
pub use decision::{Decision, ReasonCode};
pub use environment::DEFAULT_ENVIRONMENT;
pub use error::{Result, RuntimeError};
pub use flag::{FlagRecord, FlagRecordId, FlagScope, ScopeType, Variant};
pub use guard::{rate_limit_multiplier, GuardAction, OpsNotice, OpsPosture, SurfaceSensitivity};
pub use snapshot::{EvaluationMode, MarketingConfig, OpsConfig, RuntimeSnapshot};
pub use sse::{HeartbeatData, RuntimeStreamEvent, SnapshotData};
