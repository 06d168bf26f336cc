//! Configuration builder with in-memory defaults.

use crate::{
	ApiConfig, CollaboratorsConfig, Config, EngineConfig, NotificationsConfig, ServiceSelection,
	SlaConfig, StorageConfig,
};
use std::collections::HashMap;

/// Builds a [`Config`] that works without any files: memory storage, log
/// notifications and the default collaborators.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	engine_id: String,
	catalog_path: Option<String>,
	storage_primary: String,
	storage_implementations: HashMap<String, toml::Value>,
	sla: SlaConfig,
	collaborators: CollaboratorsConfig,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::value::Table::new())
}

impl ConfigBuilder {
	pub fn new() -> Self {
		let mut storage_implementations = HashMap::new();
		storage_implementations.insert("memory".to_string(), empty_table());
		Self {
			engine_id: "tradeflow-test".to_string(),
			catalog_path: None,
			storage_primary: "memory".to_string(),
			storage_implementations,
			sla: SlaConfig::default(),
			collaborators: CollaboratorsConfig::default(),
			api: None,
		}
	}

	pub fn engine_id(mut self, id: impl Into<String>) -> Self {
		self.engine_id = id.into();
		self
	}

	pub fn catalog_path(mut self, path: impl Into<String>) -> Self {
		self.catalog_path = Some(path.into());
		self
	}

	/// Switches the primary storage to the file backend rooted at `path`.
	pub fn file_storage(mut self, path: impl Into<String>) -> Self {
		let mut table = toml::value::Table::new();
		table.insert("storage_path".to_string(), toml::Value::String(path.into()));
		self.storage_implementations
			.insert("file".to_string(), toml::Value::Table(table));
		self.storage_primary = "file".to_string();
		self
	}

	pub fn sla_monitor(mut self, enabled: bool, interval_seconds: u64) -> Self {
		self.sla = SlaConfig {
			monitor_enabled: enabled,
			monitor_interval_seconds: interval_seconds,
		};
		self
	}

	/// Replaces the credit collaborator with the given implementation settings.
	pub fn credit(mut self, name: &str, settings: toml::Value) -> Self {
		self.collaborators.credit = selection(name, settings);
		self
	}

	pub fn compliance(mut self, name: &str, settings: toml::Value) -> Self {
		self.collaborators.compliance = selection(name, settings);
		self
	}

	pub fn quantity(mut self, name: &str, settings: toml::Value) -> Self {
		self.collaborators.quantity = selection(name, settings);
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	pub fn build(self) -> Config {
		let mut notification_implementations = HashMap::new();
		notification_implementations.insert("log".to_string(), empty_table());
		Config {
			engine: EngineConfig {
				id: self.engine_id,
				catalog_path: self.catalog_path,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: self.storage_implementations,
			},
			sla: self.sla,
			notifications: NotificationsConfig {
				implementations: notification_implementations,
			},
			collaborators: self.collaborators,
			api: self.api,
		}
	}
}

fn selection(name: &str, settings: toml::Value) -> ServiceSelection {
	let mut implementations = HashMap::new();
	implementations.insert(name.to_string(), settings);
	ServiceSelection {
		primary: name.to_string(),
		implementations,
	}
}
