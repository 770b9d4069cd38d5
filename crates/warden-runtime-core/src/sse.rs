// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stream event types for live runtime-config distribution.
//!
//! Events flow server -> client over SSE. The envelope is tagged so clients
//! can dispatch without peeking into payloads:
//!
//! ```json
//! {"event": "snapshot", "data": {"snapshot": {...}, "timestamp": "..."}}
//! {"event": "heartbeat", "data": {"timestamp": "..."}}
//! ```
//!
//! A `snapshot` event carries the full new snapshot (clients reconcile by
//! version, never merge). A `heartbeat` says "channel alive, nothing
//! changed" and carries no version, so it can never move a client's state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::RuntimeSnapshot;

/// Events published on the runtime-config stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RuntimeStreamEvent {
	/// A new snapshot version was published (also sent once on connect
	/// with the current snapshot).
	#[serde(rename = "snapshot")]
	Snapshot(SnapshotData),

	/// Periodic liveness signal, independent of version changes.
	#[serde(rename = "heartbeat")]
	Heartbeat(HeartbeatData),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
	pub snapshot: RuntimeSnapshot,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatData {
	pub timestamp: DateTime<Utc>,
}

impl RuntimeStreamEvent {
	pub fn snapshot(snapshot: RuntimeSnapshot) -> Self {
		Self::Snapshot(SnapshotData {
			snapshot,
			timestamp: Utc::now(),
		})
	}

	pub fn heartbeat() -> Self {
		Self::Heartbeat(HeartbeatData {
			timestamp: Utc::now(),
		})
	}

	/// The wire event type, matching the serialized `event` tag.
	pub fn event_type(&self) -> &'static str {
		match self {
			RuntimeStreamEvent::Snapshot(_) => "snapshot",
			RuntimeStreamEvent::Heartbeat(_) => "heartbeat",
		}
	}

	/// The snapshot version this event carries, if any. Heartbeats carry
	/// none, so they can never advance or regress a client.
	pub fn version(&self) -> Option<u64> {
		match self {
			RuntimeStreamEvent::Snapshot(data) => Some(data.snapshot.version),
			RuntimeStreamEvent::Heartbeat(_) => None,
		}
	}
}
