// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the Warden server.
//!
//! Configuration is assembled from sources in precedence order (defaults,
//! then TOML files, then environment variables). Each source produces a
//! [`WardenConfigLayer`] where every field is optional; layers are merged
//! and then finalized into a fully-resolved [`WardenConfig`].

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

use std::path::Path;

use tracing::{debug, info};

pub use error::ConfigError;
pub use layer::WardenConfigLayer;
pub use sections::{AuthConfig, DatabaseConfig, HttpConfig, LoggingConfig, RuntimeConfig};
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use warden_runtime_core::environment::validate_name;

/// Fully-resolved server configuration.
#[derive(Debug, Clone)]
pub struct WardenConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub runtime: RuntimeConfig,
	pub auth: AuthConfig,
	pub logging: LoggingConfig,
}

impl WardenConfig {
	/// Bind address for the HTTP listener.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from the default source chain.
///
/// Sources, lowest precedence first: built-in defaults, the system config
/// file (`/etc/warden/server.toml`), a `warden.toml` in the working
/// directory, then `WARDEN_SERVER_*` environment variables.
pub fn load_config() -> Result<WardenConfig, ConfigError> {
	load_config_with_file(None)
}

/// Load configuration, replacing the file sources with an explicit path.
///
/// Unlike the default chain, an explicitly-given file must exist.
pub fn load_config_with_file(path: Option<&Path>) -> Result<WardenConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource)];

	match path {
		Some(path) => {
			if !path.exists() {
				return Err(ConfigError::Validation(format!(
					"config file not found: {}",
					path.display()
				)));
			}
			sources.push(Box::new(TomlSource::new(path)));
		}
		None => {
			sources.push(Box::new(TomlSource::system()));
			sources.push(Box::new(TomlSource::new("warden.toml")));
		}
	}

	sources.push(Box::new(EnvSource));
	load_config_from_sources(sources)
}

/// Merge the given sources in precedence order and resolve the result.
pub fn load_config_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<WardenConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = WardenConfigLayer::default();
	for source in &sources {
		debug!(source = source.name(), "merging config source");
		merged.merge(source.load()?);
	}

	let config = finalize(merged);
	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		database_url = %config.database.url,
		default_environment = %config.runtime.default_environment,
		stream_keys = config.auth.stream_key_hashes.len(),
		"configuration loaded"
	);

	Ok(config)
}

fn finalize(layer: WardenConfigLayer) -> WardenConfig {
	WardenConfig {
		http: layer.http.unwrap_or_default().finalize(),
		database: layer.database.unwrap_or_default().finalize(),
		runtime: layer.runtime.unwrap_or_default().finalize(),
		auth: layer.auth.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	}
}

fn validate_config(config: &WardenConfig) -> Result<(), ConfigError> {
	if config.runtime.channel_capacity == 0 {
		return Err(ConfigError::Validation(
			"runtime.channel_capacity must be at least 1".to_string(),
		));
	}

	// Zero-period intervals are rejected by the tokio timer at runtime.
	if config.runtime.heartbeat_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"runtime.heartbeat_interval_secs must be at least 1".to_string(),
		));
	}
	if config.runtime.refresh_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"runtime.refresh_interval_secs must be at least 1".to_string(),
		));
	}
	if config.runtime.cleanup_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"runtime.cleanup_interval_secs must be at least 1".to_string(),
		));
	}

	if !validate_name(&config.runtime.default_environment) {
		return Err(ConfigError::Validation(format!(
			"runtime.default_environment '{}' is not a valid environment name",
			config.runtime.default_environment
		)));
	}

	Ok(())
}
