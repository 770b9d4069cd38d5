// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Versioned snapshot assembly.
//!
//! The builder turns the raw store state (flag records plus per-environment
//! overrides) into a [`RuntimeSnapshot`] for one caller. Versions are
//! per-environment and advance only when the underlying state actually
//! changed, detected by fingerprinting the loaded state. A store outage never
//! fails a build: the last loaded state is re-served at its existing version,
//! and before any successful load the compiled-in defaults go out as
//! version 0.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use warden_runtime_core::{
	EvaluationContext, EvaluationMode, MarketingConfig, OpsConfig, RuntimeSnapshot,
};

use crate::error::Result;
use crate::evaluation::evaluate_feature_decision;
use crate::store::{ConfigOverride, FlagStore, OverrideSection};

/// One loaded view of the store.
struct StoreState {
	records: Vec<warden_runtime_core::FlagRecord>,
	overrides: Vec<ConfigOverride>,
}

/// Per-environment version bookkeeping plus the last state that loaded
/// cleanly.
struct EnvState {
	version: u64,
	fingerprint: String,
	state: Arc<StoreState>,
}

/// Builds versioned runtime snapshots from a [`FlagStore`].
pub struct SnapshotBuilder {
	store: Arc<dyn FlagStore>,
	environments: Mutex<HashMap<String, EnvState>>,
}

impl SnapshotBuilder {
	pub fn new(store: Arc<dyn FlagStore>) -> Self {
		Self {
			store,
			environments: Mutex::new(HashMap::new()),
		}
	}

	/// Builds a snapshot for one caller.
	///
	/// Never fails: a store error degrades to the last known-good state at
	/// its existing version, or to the all-defaults snapshot (version 0)
	/// when nothing has ever loaded for this environment.
	pub async fn build(
		&self,
		environment: &str,
		context: &EvaluationContext,
		mode: EvaluationMode,
	) -> RuntimeSnapshot {
		let state = match self.load_state(environment).await {
			Ok(state) => state,
			Err(err) => {
				warn!(
					environment = %environment,
					error = %err,
					"Failed to load runtime state, serving fallback snapshot"
				);
				return self.fallback(environment, context, mode).await;
			}
		};

		let fingerprint = match fingerprint_state(&state) {
			Ok(fingerprint) => fingerprint,
			Err(err) => {
				error!(
					environment = %environment,
					error = %err,
					"Failed to fingerprint runtime state"
				);
				return self.fallback(environment, context, mode).await;
			}
		};

		let state = Arc::new(state);
		let (version, changed) = self
			.advance(environment, fingerprint, Arc::clone(&state))
			.await;
		if changed {
			debug!(
				environment = %environment,
				version,
				"Runtime state changed, snapshot version advanced"
			);
		}

		self.assemble(environment, version, &state, context, mode)
	}

	/// Reloads the store and, when the state changed, returns the new
	/// privileged snapshot for publishing. `None` means nothing to publish.
	pub async fn refresh(&self, environment: &str) -> Option<RuntimeSnapshot> {
		let state = match self.load_state(environment).await {
			Ok(state) => state,
			Err(err) => {
				warn!(
					environment = %environment,
					error = %err,
					"Failed to refresh runtime state"
				);
				return None;
			}
		};

		let fingerprint = match fingerprint_state(&state) {
			Ok(fingerprint) => fingerprint,
			Err(err) => {
				error!(
					environment = %environment,
					error = %err,
					"Failed to fingerprint runtime state"
				);
				return None;
			}
		};

		let state = Arc::new(state);
		let (version, changed) = self
			.advance(environment, fingerprint, Arc::clone(&state))
			.await;
		if !changed {
			return None;
		}

		debug!(
			environment = %environment,
			version,
			"Publishing refreshed runtime snapshot"
		);

		Some(self.assemble(
			environment,
			version,
			&state,
			&EvaluationContext::new(),
			EvaluationMode::Privileged,
		))
	}

	/// The version last assigned for an environment; 0 before any
	/// successful build.
	pub async fn current_version(&self, environment: &str) -> u64 {
		let environments = self.environments.lock().await;
		environments
			.get(environment)
			.map(|state| state.version)
			.unwrap_or(0)
	}

	async fn load_state(&self, environment: &str) -> Result<StoreState> {
		let records = self.store.all_records().await?;
		let overrides = self.store.overrides_for_environment(environment).await?;
		Ok(StoreState { records, overrides })
	}

	/// Assigns the version for a freshly loaded state. Serialized through the
	/// map lock so concurrent builds cannot both claim the same version.
	async fn advance(
		&self,
		environment: &str,
		fingerprint: String,
		state: Arc<StoreState>,
	) -> (u64, bool) {
		let mut environments = self.environments.lock().await;
		match environments.get_mut(environment) {
			Some(env_state) => {
				if env_state.fingerprint == fingerprint {
					(env_state.version, false)
				} else {
					env_state.version += 1;
					env_state.fingerprint = fingerprint;
					env_state.state = state;
					(env_state.version, true)
				}
			}
			None => {
				environments.insert(
					environment.to_string(),
					EnvState {
						version: 1,
						fingerprint,
						state,
					},
				);
				(1, true)
			}
		}
	}

	async fn fallback(
		&self,
		environment: &str,
		context: &EvaluationContext,
		mode: EvaluationMode,
	) -> RuntimeSnapshot {
		let cached = {
			let environments = self.environments.lock().await;
			environments
				.get(environment)
				.map(|env_state| (env_state.version, Arc::clone(&env_state.state)))
		};

		match cached {
			Some((version, state)) => {
				debug!(
					environment = %environment,
					version,
					"Serving last known-good runtime state"
				);
				self.assemble(environment, version, &state, context, mode)
			}
			None => RuntimeSnapshot::defaults(environment, mode),
		}
	}

	fn assemble(
		&self,
		environment: &str,
		version: u64,
		state: &StoreState,
		context: &EvaluationContext,
		mode: EvaluationMode,
	) -> RuntimeSnapshot {
		let mut ops = OpsConfig::default();
		let mut marketing = MarketingConfig::default();

		for entry in &state.overrides {
			let applied = match entry.section {
				OverrideSection::Ops => ops.apply_override(&entry.key, &entry.value),
				OverrideSection::Marketing => marketing.apply_override(&entry.key, &entry.value),
			};
			if !applied {
				warn!(
					environment = %environment,
					section = %entry.section,
					key = %entry.key,
					"Skipping unrecognized runtime override"
				);
			}
		}

		let mut snapshot = RuntimeSnapshot {
			environment: environment.to_string(),
			version,
			generated_at: Utc::now(),
			ops,
			marketing,
			evaluation_mode: mode,
			features: Default::default(),
		};

		// Records arrive sorted by key; evaluate one key group at a time.
		let records = &state.records;
		let mut index = 0;
		while index < records.len() {
			let key = &records[index].key;
			let mut end = index + 1;
			while end < records.len() && &records[end].key == key {
				end += 1;
			}

			let group = &records[index..end];
			// A key is publicly visible only when every record agrees.
			if mode.includes_private() || group.iter().all(|record| record.is_public) {
				snapshot
					.features
					.insert(key.clone(), evaluate_feature_decision(key, group, context));
			}

			index = end;
		}

		snapshot
	}
}

fn fingerprint_state(state: &StoreState) -> Result<String> {
	let mut hasher = Sha256::new();
	hasher.update(serde_json::to_vec(&state.records)?);
	hasher.update(serde_json::to_vec(&state.overrides)?);
	Ok(hex::encode(hasher.finalize()))
}
