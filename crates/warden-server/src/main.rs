// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Warden control plane server binary.

use clap::{Parser, Subcommand};
use tower_http::{
	cors::{Any, CorsLayer},
	trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warden_server::{create_app_state, create_router, BackgroundTasks};
use warden_server_runtime::{generate_stream_key, hash_stream_key};

mod version;

/// Warden server - feature flag and runtime configuration control plane.
#[derive(Parser, Debug)]
#[command(
	name = "warden-server",
	about = "Warden runtime configuration control plane",
	version
)]
struct Args {
	/// Path to a TOML config file (replaces the default file chain)
	#[arg(long, global = true)]
	config: Option<std::path::PathBuf>,

	/// Subcommands for warden-server (e.g., `version`)
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the server (the default when no subcommand is given)
	Serve,
	/// Show version and build information
	Version,
	/// Mint a stream key and print the hash to put in the config
	GenerateStreamKey,
}

#[tokio::main]
async fn main() -> warden_server::Result<()> {
	// Parse CLI arguments
	let args = Args::parse();

	// Handle subcommands that should not start the server
	match args.command {
		Some(Command::Version) => {
			println!("{}", version::format_version_info());
			return Ok(());
		}
		Some(Command::GenerateStreamKey) => {
			let key = generate_stream_key();
			let hash = hash_stream_key(&key)?;
			println!("stream key:  {key}");
			println!("config hash: {hash}");
			return Ok(());
		}
		Some(Command::Serve) | None => {}
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	// Load configuration
	let config = warden_server::load_config_with_file(args.config.as_deref())?;

	// Setup tracing
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	tracing::info!(
			host = %config.http.host,
			port = config.http.port,
			database = %config.database.url,
			"starting warden-server"
	);

	// Create database pool and run migrations
	let pool = warden_server::db::create_pool(&config.database.url).await?;
	warden_server::db::run_migrations(&pool).await?;

	let state = create_app_state(pool, &config);

	// Start background publishing loops
	let tasks = BackgroundTasks::new();
	tasks.spawn_all(&state).await;

	let app = create_router(state)
		.layer(TraceLayer::new_for_http())
		.layer(
			CorsLayer::new()
				.allow_origin(Any)
				.allow_methods(Any)
				.allow_headers(Any),
		);

	// Start server
	let addr = config.socket_addr();
	tracing::info!("listening on {}", addr);

	let listener = tokio::net::TcpListener::bind(&addr).await?;

	// Run server with graceful shutdown
	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "Server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received shutdown signal");
			tasks.shutdown().await;
		}
	}

	tracing::info!("Server shutdown complete");
	Ok(())
}
