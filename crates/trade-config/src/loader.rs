//! Multi-file configuration loading.
//!
//! The entry file may name other files with `include`. Included files are
//! merged into the entry file at the top level; a section defined in two files
//! is an error rather than a silent override.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub struct ConfigLoader {
	/// Directory that relative include paths are resolved against.
	base_path: PathBuf,
	/// Canonical paths already read, used to detect include cycles.
	visited: HashSet<PathBuf>,
	/// Top-level section name to the file that defined it.
	owners: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			visited: HashSet::new(),
			owners: HashMap::new(),
		}
	}

	/// Loads the entry file and every file it includes, then parses and
	/// validates the merged result.
	pub async fn load_config(&mut self, entry: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let entry_path = self.resolve_path(entry)?;
		let mut merged = self.read_toml(&entry_path)?;

		let includes = match merged.as_table_mut() {
			Some(table) => parse_includes(table.remove("include"))?,
			None => Vec::new(),
		};
		self.claim_sections(&merged, &entry_path)?;

		for include in includes {
			let include_path = self.resolve_path(&include)?;
			let included = self.read_toml(&include_path)?;
			self.claim_sections(&included, &include_path)?;
			if let (Some(target), Some(source)) = (merged.as_table_mut(), included.as_table()) {
				for (key, value) in source {
					target.insert(key.clone(), value.clone());
				}
			}
		}

		let rendered = toml::to_string(&merged).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		rendered.parse()
	}

	/// Reads one file, resolving environment variables before parsing.
	fn read_toml(&mut self, path: &Path) -> Result<toml::Value, ConfigError> {
		let canonical = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = std::fs::read_to_string(path)?;
		let resolved = resolve_env_vars(&content)?;
		Ok(toml::from_str(&resolved)?)
	}

	/// Records the top-level sections of `value` as coming from `source`.
	fn claim_sections(&mut self, value: &toml::Value, source: &Path) -> Result<(), ConfigError> {
		let Some(table) = value.as_table() else {
			return Ok(());
		};
		for key in table.keys() {
			if key == "include" {
				return Err(ConfigError::Validation(format!(
					"Nested include in {} is not supported",
					source.display()
				)));
			}
			if let Some(previous) = self.owners.insert(key.clone(), source.to_path_buf()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}. \
					Each top-level section must be unique across all configuration files.",
					key,
					previous.display(),
					source.display()
				)));
			}
		}
		Ok(())
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

/// Accepts `include = "a.toml"` or `include = ["a.toml", "b.toml"]`.
fn parse_includes(value: Option<toml::Value>) -> Result<Vec<PathBuf>, ConfigError> {
	match value {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(ConfigError::Validation(
					"Include array must contain only strings".into(),
				)),
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const ENGINE: &str = r#"
[engine]
id = "tradeflow-test"
"#;

	const BACKENDS: &str = r#"
[storage]
primary = "memory"
[storage.implementations.memory]

[notifications]
[notifications.implementations.log]
"#;

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		fs::write(&config_path, format!("{}{}", ENGINE, BACKENDS)).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config(&config_path).await.unwrap();
		assert_eq!(config.engine.id, "tradeflow-test");
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!("include = [\"backends.toml\"]\n{}", ENGINE),
		)
		.unwrap();
		fs::write(temp_dir.path().join("backends.toml"), BACKENDS).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();
		assert_eq!(config.engine.id, "tradeflow-test");
		assert_eq!(config.storage.primary, "memory");
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!("include = \"dup.toml\"\n{}", ENGINE),
		)
		.unwrap();
		fs::write(temp_dir.path().join("dup.toml"), ENGINE).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader.load_config("main.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("Duplicate section 'engine'"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("self.toml"),
			format!("include = [\"self.toml\"]\n{}", ENGINE),
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader.load_config("self.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("already loaded"));
	}

	#[tokio::test]
	async fn test_missing_include() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!("include = [\"absent.toml\"]\n{}", ENGINE),
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		assert!(matches!(
			loader.load_config("main.toml").await,
			Err(ConfigError::Io(_))
		));
	}
}
