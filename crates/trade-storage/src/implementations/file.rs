//! File-based storage backend.
//!
//! Each namespace is a subdirectory of the base path and each value a JSON
//! file named after its id. Writes go to a temporary file that is renamed into
//! place, so readers never observe a partial value. Every write in a namespace
//! holds an exclusive `fs2` lock on that namespace's lock file, which makes
//! compare-and-swap atomic across threads and across processes sharing the
//! directory.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use trade_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};

const LOCK_FILE: &str = ".lock";
const EXTENSION: &str = "json";
const DEFAULT_NAMESPACE: &str = "default";

fn backend_err(e: impl std::fmt::Display) -> StorageError {
	StorageError::Backend(e.to_string())
}

/// Makes a key segment safe to use as a single path component.
fn sanitize(segment: &str) -> String {
	let cleaned: String = segment
		.chars()
		.map(|c| match c {
			'/' | '\\' | ':' | '\0' => '_',
			other => other,
		})
		.collect();
	if cleaned.starts_with('.') {
		format!("_{}", &cleaned[1..])
	} else {
		cleaned
	}
}

pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	fn namespace_dir(&self, namespace: &str) -> PathBuf {
		self.base_path.join(sanitize(namespace))
	}

	/// Splits `namespace:id` into the namespace directory and the value path.
	fn locate(&self, key: &str) -> (PathBuf, PathBuf) {
		let (namespace, id) = key.split_once(':').unwrap_or((DEFAULT_NAMESPACE, key));
		let dir = self.namespace_dir(namespace);
		let path = dir.join(format!("{}.{}", sanitize(id), EXTENSION));
		(dir, path)
	}

	/// Runs a blocking write under the namespace lock on the blocking pool.
	async fn locked<R, F>(&self, dir: PathBuf, op: F) -> Result<R, StorageError>
	where
		R: Send + 'static,
		F: FnOnce() -> Result<R, StorageError> + Send + 'static,
	{
		tokio::task::spawn_blocking(move || with_namespace_lock(&dir, op))
			.await
			.map_err(backend_err)?
	}
}

fn with_namespace_lock<R>(
	dir: &Path,
	op: impl FnOnce() -> Result<R, StorageError>,
) -> Result<R, StorageError> {
	fs::create_dir_all(dir).map_err(backend_err)?;
	let lock = OpenOptions::new()
		.create(true)
		.truncate(false)
		.read(true)
		.write(true)
		.open(dir.join(LOCK_FILE))
		.map_err(backend_err)?;
	lock.lock_exclusive().map_err(backend_err)?;

	let result = op();

	if let Err(e) = FileExt::unlock(&lock) {
		tracing::warn!(dir = ?dir, error = %e, "Failed to release namespace lock");
	}
	result
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
	match fs::read(path) {
		Ok(data) => Ok(Some(data)),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => Err(backend_err(e)),
	}
}

fn write_atomic(path: &Path, value: &[u8]) -> Result<(), StorageError> {
	let temp_path = path.with_extension("tmp");
	fs::write(&temp_path, value).map_err(backend_err)?;
	fs::rename(&temp_path, path).map_err(backend_err)
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let (_, path) = self.locate(key);
		match tokio::fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(backend_err(e)),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let (dir, path) = self.locate(key);
		self.locked(dir, move || write_atomic(&path, &value)).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let (dir, path) = self.locate(key);
		if !dir.exists() {
			return Ok(());
		}
		self.locked(dir, move || match fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend_err(e)),
		})
		.await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let (_, path) = self.locate(key);
		tokio::fs::try_exists(&path).await.map_err(backend_err)
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Vec<u8>,
	) -> Result<bool, StorageError> {
		let (dir, path) = self.locate(key);
		let expected = expected.map(<[u8]>::to_vec);
		self.locked(dir, move || {
			let current = read_optional(&path)?;
			if current != expected {
				return Ok(false);
			}
			write_atomic(&path, &new)?;
			Ok(true)
		})
		.await
	}

	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let dir = self.namespace_dir(namespace);
		let mut entries = match tokio::fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(backend_err(e)),
		};

		let mut ids = Vec::new();
		while let Some(entry) = entries.next_entry().await.map_err(backend_err)? {
			let path = entry.path();
			if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
				continue;
			}
			if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
				ids.push(stem.to_string());
			}
		}
		ids.sort();
		Ok(ids)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(path) if !path.trim().is_empty() => Ok(()),
					_ => Err("storage_path cannot be empty".to_string()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use tempfile::TempDir;

	fn storage() -> (TempDir, FileStorage) {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());
		(dir, storage)
	}

	#[tokio::test]
	async fn test_basic_operations() {
		let (dir, storage) = storage();
		let key = "order_items:item-1";

		storage.set_bytes(key, b"{}".to_vec()).await.unwrap();
		assert!(dir.path().join("order_items").join("item-1.json").exists());
		assert_eq!(storage.get_bytes(key).await.unwrap(), b"{}".to_vec());
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
		// Deleting a missing key is not an error.
		storage.delete("nowhere:x").await.unwrap();
	}

	#[tokio::test]
	async fn test_compare_and_swap() {
		let (_dir, storage) = storage();
		let key = "revision_numbers:item-1#1";

		assert!(storage.compare_and_swap(key, None, b"a".to_vec()).await.unwrap());
		assert!(!storage.compare_and_swap(key, None, b"b".to_vec()).await.unwrap());
		assert!(!storage
			.compare_and_swap(key, Some(&b"b"[..]), b"c".to_vec())
			.await
			.unwrap());
		assert!(storage
			.compare_and_swap(key, Some(&b"a"[..]), b"c".to_vec())
			.await
			.unwrap());
		assert_eq!(storage.get_bytes(key).await.unwrap(), b"c".to_vec());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_insert_single_winner() {
		let (_dir, storage) = storage();
		let storage = Arc::new(storage);
		let mut handles = Vec::new();
		for n in 0..8u8 {
			let storage = storage.clone();
			handles.push(tokio::spawn(async move {
				storage
					.compare_and_swap("revision_numbers:item-9#1", None, vec![n])
					.await
					.unwrap()
			}));
		}
		let mut wins = 0;
		for handle in handles {
			if handle.await.unwrap() {
				wins += 1;
			}
		}
		assert_eq!(wins, 1);
	}

	#[tokio::test]
	async fn test_list_keys_and_persistence() {
		let (dir, storage) = storage();
		storage.set_bytes("audit_logs:b", vec![1]).await.unwrap();
		storage.set_bytes("audit_logs:a", vec![2]).await.unwrap();
		storage.set_bytes("revisions:c", vec![3]).await.unwrap();

		let reopened = FileStorage::new(dir.path().to_path_buf());
		assert_eq!(
			reopened.list_keys("audit_logs").await.unwrap(),
			vec!["a".to_string(), "b".to_string()]
		);
		assert!(reopened.list_keys("rfq_items").await.unwrap().is_empty());
		assert_eq!(reopened.get_bytes("revisions:c").await.unwrap(), vec![3]);
	}

	#[test]
	fn test_factory_validates_config() {
		let bad: toml::Value = toml::from_str("storage_path = \"\"").unwrap();
		assert!(matches!(
			create_storage(&bad),
			Err(StorageError::Configuration(_))
		));
		let good: toml::Value = toml::from_str("storage_path = \"./tmp-store\"").unwrap();
		assert!(create_storage(&good).is_ok());
	}
}
