// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Local snapshot cache with version reconciliation.
//!
//! The cache holds at most one snapshot and only ever moves forward: an
//! incoming snapshot replaces the held one when its version is strictly
//! greater and is discarded otherwise. Observers therefore see a
//! monotonically non-decreasing version sequence regardless of delivery
//! order.

use tokio::sync::watch;
use tracing::debug;
use warden_runtime_core::RuntimeSnapshot;

/// Shared snapshot holder backed by a watch channel.
///
/// Clones share the same underlying state; [`SnapshotCache::subscribe`]
/// hands out watch receivers for change notification without polling.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
	tx: watch::Sender<Option<RuntimeSnapshot>>,
}

impl SnapshotCache {
	/// Creates an empty cache. [`SnapshotCache::current`] returns `None`
	/// until the first snapshot is applied.
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(None);
		Self { tx }
	}

	/// The currently held snapshot, if any.
	pub fn current(&self) -> Option<RuntimeSnapshot> {
		self.tx.borrow().clone()
	}

	/// Reads the held snapshot without cloning it.
	pub fn with_current<R>(&self, f: impl FnOnce(Option<&RuntimeSnapshot>) -> R) -> R {
		f(self.tx.borrow().as_ref())
	}

	/// The version of the held snapshot; 0 when nothing has been applied.
	pub fn version(&self) -> u64 {
		self.tx.borrow().as_ref().map(|s| s.version).unwrap_or(0)
	}

	/// Applies a snapshot if it supersedes the held one.
	///
	/// Returns true when the snapshot was stored and observers were
	/// notified, false when it was stale (version less than or equal to
	/// the held version) and discarded.
	pub fn apply(&self, snapshot: RuntimeSnapshot) -> bool {
		self.tx.send_if_modified(move |held| match held {
			Some(current) if !snapshot.supersedes(current.version) => {
				debug!(
					incoming = snapshot.version,
					held = current.version,
					"Discarding stale snapshot"
				);
				false
			}
			_ => {
				*held = Some(snapshot);
				true
			}
		})
	}

	/// Subscribes to snapshot changes.
	///
	/// The value held at subscription time counts as seen;
	/// `changed().await` resolves on each snapshot applied after that.
	pub fn subscribe(&self) -> watch::Receiver<Option<RuntimeSnapshot>> {
		self.tx.subscribe()
	}
}

impl Default for SnapshotCache {
	fn default() -> Self {
		Self::new()
	}
}


#[cfg(test)]
mod proptest_tests {
	use super::*;
	use proptest::prelude::*;
	use warden_runtime_core::EvaluationMode;

	proptest! {
		#[test]
		fn cache_converges_on_max_version(versions in proptest::collection::vec(0u64..500, 1..40)) {
			// Whatever order snapshots arrive in, the cache ends up
			// holding the highest version it ever saw.
			let cache = SnapshotCache::new();
			for &version in &versions {
				let mut snapshot =
					RuntimeSnapshot::defaults("production", EvaluationMode::Public);
				snapshot.version = version;
				cache.apply(snapshot);
			}
			prop_assert_eq!(cache.version(), *versions.iter().max().unwrap());
		}

		#[test]
		fn apply_reports_progress_exactly(versions in proptest::collection::vec(0u64..100, 1..30)) {
			// apply() returns true iff the cache version actually moved
			// (or the cache was empty).
			let cache = SnapshotCache::new();
			let mut held: Option<u64> = None;
			for &version in &versions {
				let mut snapshot =
					RuntimeSnapshot::defaults("production", EvaluationMode::Public);
				snapshot.version = version;

				let expected = match held {
					Some(h) => version > h,
					None => true,
				};
				prop_assert_eq!(cache.apply(snapshot), expected);
				if expected {
					held = Some(version);
				}
			}
		}
	}
}
