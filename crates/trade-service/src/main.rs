//! Main entry point for the tradeflow service.
//!
//! Loads configuration, wires the trade engine from the registered
//! implementations and runs the periodic SLA sweep next to the REST API.

use clap::Parser;
use std::path::PathBuf;
use trade_config::Config;
use trade_core::{EngineBuilder, TradeEngine};

mod apis;
mod factory_registry;
mod server;

/// Command-line arguments for the tradeflow service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/tradeflow.toml", env = "TRADEFLOW_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started tradeflow");

	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!("Loaded configuration [{}]", config.engine.id);

	let engine = build_engine(config.clone()).await?;

	let monitor = run_monitor(engine.clone());
	let shutdown = tokio::signal::ctrl_c();

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			let api_task = server::start_server(api_config, engine);
			tokio::select! {
				_ = monitor => {
					tracing::info!("SLA monitor finished");
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
				_ = shutdown => {
					tracing::info!("Shutdown requested");
				}
			}
		},
		None => {
			tracing::info!("API disabled, running the SLA monitor only");
			tokio::select! {
				_ = monitor => {
					tracing::info!("SLA monitor finished");
				}
				_ = shutdown => {
					tracing::info!("Shutdown requested");
				}
			}
		},
	}

	tracing::info!("Stopped tradeflow");
	Ok(())
}

/// Runs the SLA sweep, or idles forever when it is disabled so that the
/// process keeps serving requests.
async fn run_monitor(engine: TradeEngine) {
	if engine.config().sla.monitor_enabled {
		engine.run_sla_monitor().await;
	} else {
		tracing::info!("SLA monitor disabled");
		std::future::pending::<()>().await;
	}
}

/// Builds the trade engine from every registered implementation.
async fn build_engine(config: Config) -> Result<TradeEngine, Box<dyn std::error::Error>> {
	let factories = factory_registry::initialize_registry();
	Ok(EngineBuilder::new(config).build(factories).await?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_build_engine_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let config_path = dir.path().join("tradeflow.toml");
		let storage_path = dir.path().join("data");
		tokio::fs::write(
			&config_path,
			format!(
				r#"
[engine]
id = "tradeflow-file-test"

[storage]
primary = "file"

[storage.implementations.file]
storage_path = "{}"

[sla]
monitor_enabled = false

[notifications.implementations.log]
"#,
				storage_path.to_string_lossy()
			),
		)
		.await
		.unwrap();

		let config = Config::from_file(&config_path.to_string_lossy())
			.await
			.unwrap();
		let engine = build_engine(config).await.unwrap();
		assert_eq!(engine.config().engine.id, "tradeflow-file-test");
		assert!(!engine.config().sla.monitor_enabled);
	}
}
