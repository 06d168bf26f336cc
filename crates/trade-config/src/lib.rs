//! Configuration module for the tradeflow system.
//!
//! Configuration is read from TOML. String values may reference environment
//! variables as `${VAR}` or `${VAR:-default}`.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

#[cfg(any(test, feature = "testing"))]
pub mod builders;
mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep only the message, not the input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub engine: EngineConfig,
	pub storage: StorageConfig,
	#[serde(default)]
	pub sla: SlaConfig,
	pub notifications: NotificationsConfig,
	#[serde(default)]
	pub collaborators: CollaboratorsConfig,
	pub api: Option<ApiConfig>,
}

/// Settings of the state engine itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Identifier of this engine instance, used in logs.
	pub id: String,
	/// Optional TOML transition catalog replacing the built-in one.
	#[serde(default)]
	pub catalog_path: Option<String>,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration of the periodic SLA sweep.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlaConfig {
	/// Whether the background monitor runs at all.
	#[serde(default = "default_true")]
	pub monitor_enabled: bool,
	/// Seconds between two sweeps.
	#[serde(default = "default_monitor_interval_seconds")]
	pub monitor_interval_seconds: u64,
}

impl Default for SlaConfig {
	fn default() -> Self {
		Self {
			monitor_enabled: true,
			monitor_interval_seconds: default_monitor_interval_seconds(),
		}
	}
}

fn default_true() -> bool {
	true
}

/// Five minutes.
fn default_monitor_interval_seconds() -> u64 {
	300
}

/// Configuration for notification senders. Every configured implementation
/// receives every notification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationsConfig {
	pub implementations: HashMap<String, toml::Value>,
}

/// One pluggable collaborator: the implementation in use and the settings of
/// every known implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceSelection {
	pub primary: String,
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

impl ServiceSelection {
	/// A selection of one implementation with an empty settings table.
	pub fn single(name: &str) -> Self {
		let mut implementations = HashMap::new();
		implementations.insert(
			name.to_string(),
			toml::Value::Table(toml::value::Table::new()),
		);
		Self {
			primary: name.to_string(),
			implementations,
		}
	}

	/// Settings table of the primary implementation.
	pub fn primary_config(&self) -> Option<&toml::Value> {
		self.implementations.get(&self.primary)
	}
}

/// External business services consulted by transition validations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollaboratorsConfig {
	#[serde(default = "default_credit")]
	pub credit: ServiceSelection,
	#[serde(default = "default_compliance")]
	pub compliance: ServiceSelection,
	#[serde(default = "default_quantity")]
	pub quantity: ServiceSelection,
}

impl Default for CollaboratorsConfig {
	fn default() -> Self {
		Self {
			credit: default_credit(),
			compliance: default_compliance(),
			quantity: default_quantity(),
		}
	}
}

fn default_credit() -> ServiceSelection {
	ServiceSelection::single("static")
}

fn default_compliance() -> ServiceSelection {
	ServiceSelection::single("denylist")
}

fn default_quantity() -> ServiceSelection {
	ServiceSelection::single("bounds")
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request body size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	pub allowed_origins: Vec<String>,
	#[serde(default)]
	pub allowed_headers: Vec<String>,
	#[serde(default)]
	pub allowed_methods: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable and
/// supports defaults with `${VAR_NAME:-default_value}`. Input is limited to
/// 1MB to bound regex work.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};
		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

fn require_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl Config {
	/// Loads configuration from a file, following include directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Checks cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.engine.id.trim().is_empty() {
			return Err(ConfigError::Validation("Engine ID cannot be empty".into()));
		}
		if let Some(path) = &self.engine.catalog_path {
			if path.trim().is_empty() {
				return Err(ConfigError::Validation(
					"engine.catalog_path cannot be empty when set".into(),
				));
			}
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		require_primary("storage", &self.storage.primary, &self.storage.implementations)?;

		if self.sla.monitor_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"sla.monitor_interval_seconds must be greater than 0".into(),
			));
		}
		if self.sla.monitor_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"sla.monitor_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		if self.notifications.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one notification implementation required".into(),
			));
		}

		let collaborators = &self.collaborators;
		require_primary(
			"credit",
			&collaborators.credit.primary,
			&collaborators.credit.implementations,
		)?;
		require_primary(
			"compliance",
			&collaborators.compliance.primary,
			&collaborators.compliance.implementations,
		)?;
		require_primary(
			"quantity",
			&collaborators.quantity.primary,
			&collaborators.quantity.implementations,
		)?;

		if let Some(api) = &self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation(
					"api.port must be set when the API is enabled".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses a TOML string, resolving environment variables and validating the
/// result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[engine]
id = "tradeflow-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[notifications]
[notifications.implementations.log]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TRADEFLOW_TEST_HOST", "localhost");
		std::env::set_var("TRADEFLOW_TEST_PORT", "5432");

		let input = "host = \"${TRADEFLOW_TEST_HOST}:${TRADEFLOW_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("TRADEFLOW_TEST_HOST");
		std::env::remove_var("TRADEFLOW_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${TRADEFLOW_MISSING_VAR:-fallback}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"fallback\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${TRADEFLOW_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.unwrap_err().to_string().contains("TRADEFLOW_MISSING_VAR"));
	}

	#[test]
	fn test_minimal_config_defaults() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.engine.id, "tradeflow-test");
		assert!(config.sla.monitor_enabled);
		assert_eq!(config.sla.monitor_interval_seconds, 300);
		assert_eq!(config.collaborators.credit.primary, "static");
		assert!(config.collaborators.quantity.primary_config().is_some());
		assert!(config.api.is_none());
	}

	#[test]
	fn test_full_config_with_env() {
		std::env::set_var("TRADEFLOW_TEST_ENGINE_ID", "plant-7");
		let config_str = r#"
[engine]
id = "${TRADEFLOW_TEST_ENGINE_ID}"
catalog_path = "catalog.toml"

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "${TRADEFLOW_TEST_STORAGE:-./data/storage}"

[sla]
monitor_enabled = false
monitor_interval_seconds = 60

[notifications]
[notifications.implementations.log]
[notifications.implementations.webhook]
url = "http://localhost:9000/hooks"

[collaborators.credit]
primary = "static"
[collaborators.credit.implementations.static]
default_limit = "100000"

[api]
enabled = true
port = 8080
"#;
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.engine.id, "plant-7");
		assert_eq!(config.engine.catalog_path.as_deref(), Some("catalog.toml"));
		assert!(!config.sla.monitor_enabled);
		assert_eq!(config.notifications.implementations.len(), 2);
		assert_eq!(
			config.storage.implementations["file"]
				.get("storage_path")
				.and_then(|v| v.as_str()),
			Some("./data/storage")
		);
		// Sections not given keep their defaults.
		assert_eq!(config.collaborators.compliance.primary, "denylist");
		let api = config.api.unwrap();
		assert_eq!(api.host, "127.0.0.1");
		assert_eq!(api.port, 8080);
		std::env::remove_var("TRADEFLOW_TEST_ENGINE_ID");
	}

	#[test]
	fn test_primary_must_be_configured() {
		let config_str = MINIMAL.replace("primary = \"memory\"", "primary = \"redis\"");
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Primary storage 'redis'"));
	}

	#[test]
	fn test_zero_monitor_interval_rejected() {
		let config_str = format!("{}\n[sla]\nmonitor_interval_seconds = 0\n", MINIMAL);
		assert!(matches!(
			config_str.parse::<Config>(),
			Err(ConfigError::Validation(_))
		));
	}
}
