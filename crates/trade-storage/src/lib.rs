//! Storage module for the tradeflow system.
//!
//! Backends implement a small byte-level key-value contract with an atomic
//! compare-and-swap. [`StorageService`] layers typed JSON access and the two
//! optimistic-concurrency helpers used by the engine on top of it:
//! version-conditioned updates for business mutations and SLA-field updates
//! that never touch the version.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use trade_types::{ConfigSchema, ImplementationRegistry, Versioned};

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Upper bound on compare-and-swap retries caused by writes that do not
/// conflict logically (another writer touched non-versioned fields).
const MAX_CAS_ATTEMPTS: usize = 32;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Already exists: {0}")]
	AlreadyExists(String),
	/// The stored version is not the one the caller expected.
	#[error("Version conflict: expected {expected}, found {actual}")]
	Conflict { expected: u64, actual: u64 },
	/// Compare-and-swap kept losing without a version change.
	#[error("Write contention on {0}")]
	Contention(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Keys have the form `namespace:id`.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, overwriting any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Atomically replaces the value at `key` with `new` if the current value
	/// equals `expected`. `expected = None` means "key must be absent".
	///
	/// Returns `Ok(false)` without writing when the current value differs.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Vec<u8>,
	) -> Result<bool, StorageError>;

	/// Lists the ids stored under `namespace`, sorted.
	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

fn storage_key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn to_bytes<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// High-level storage service that provides typed operations.
///
/// Values are stored as JSON under `namespace:id`.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value, overwriting any previous value.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes = to_bytes(data)?;
		self.backend.set_bytes(&storage_key(namespace, id), bytes).await
	}

	/// Stores a value only if nothing is stored under the key yet.
	///
	/// Used for append-only records and for claiming unique indexes.
	pub async fn insert_new<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = storage_key(namespace, id);
		let bytes = to_bytes(data)?;
		if self.backend.compare_and_swap(&key, None, bytes).await? {
			Ok(())
		} else {
			Err(StorageError::AlreadyExists(key))
		}
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&storage_key(namespace, id)).await?;
		from_bytes(&bytes)
	}

	/// Like [`retrieve`](Self::retrieve) but maps a missing key to `None`.
	pub async fn find<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&storage_key(namespace, id)).await
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&storage_key(namespace, id)).await
	}

	/// Lists the ids stored under a namespace.
	pub async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		self.backend.list_keys(namespace).await
	}

	/// Loads every value in a namespace. Keys removed between listing and
	/// reading are skipped.
	pub async fn list<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<T>, StorageError> {
		let mut values = Vec::new();
		for id in self.backend.list_keys(namespace).await? {
			if let Some(value) = self.find(namespace, &id).await? {
				values.push(value);
			}
		}
		Ok(values)
	}

	/// Applies a business mutation under optimistic concurrency.
	///
	/// The row is re-read; if its version differs from `expected_version` the
	/// update fails with [`StorageError::Conflict`]. Otherwise `mutate` runs on
	/// the fresh row, the version is set to `expected_version + 1` and the
	/// result is written with compare-and-swap. A lost swap where the version
	/// is unchanged (a concurrent SLA-field write) is retried on the new bytes.
	pub async fn update_versioned<T, F, E>(
		&self,
		namespace: &str,
		id: &str,
		expected_version: u64,
		mut mutate: F,
	) -> Result<T, E>
	where
		T: Versioned + Serialize + DeserializeOwned,
		F: FnMut(&mut T) -> Result<(), E>,
		E: From<StorageError>,
	{
		let key = storage_key(namespace, id);
		for attempt in 0..MAX_CAS_ATTEMPTS {
			let current_bytes = self.backend.get_bytes(&key).await?;
			let mut row: T = from_bytes(&current_bytes)?;
			if row.version() != expected_version {
				return Err(StorageError::Conflict {
					expected: expected_version,
					actual: row.version(),
				}
				.into());
			}

			mutate(&mut row)?;
			row.set_version(expected_version + 1);
			let new_bytes = to_bytes(&row)?;

			if self
				.backend
				.compare_and_swap(&key, Some(&current_bytes), new_bytes)
				.await?
			{
				return Ok(row);
			}
			tracing::debug!(key = %key, attempt, "Versioned write lost a swap, re-reading");
		}
		Err(StorageError::Contention(key).into())
	}

	/// Updates non-versioned fields of a row without changing its version.
	///
	/// `mutate` returns `false` when the fresh row needs no change, in which
	/// case nothing is written and `Ok(None)` is returned. A lost swap re-reads
	/// the row and runs `mutate` again so the decision is always made against
	/// the latest state.
	pub async fn update_unversioned<T, F>(
		&self,
		namespace: &str,
		id: &str,
		mut mutate: F,
	) -> Result<Option<T>, StorageError>
	where
		T: Versioned + Serialize + DeserializeOwned,
		F: FnMut(&mut T) -> bool,
	{
		let key = storage_key(namespace, id);
		for attempt in 0..MAX_CAS_ATTEMPTS {
			let current_bytes = self.backend.get_bytes(&key).await?;
			let mut row: T = from_bytes(&current_bytes)?;
			let version = row.version();

			if !mutate(&mut row) {
				return Ok(None);
			}
			if row.version() != version {
				return Err(StorageError::Backend(format!(
					"Unversioned update of {} attempted to change the version",
					key
				)));
			}

			let new_bytes = to_bytes(&row)?;
			if self
				.backend
				.compare_and_swap(&key, Some(&current_bytes), new_bytes)
				.await?
			{
				return Ok(Some(row));
			}
			tracing::debug!(key = %key, attempt, "Unversioned write lost a swap, re-evaluating");
		}
		Err(StorageError::Contention(key))
	}
}

#[cfg(test)]
mod tests {
	use super::implementations::memory::MemoryStorage;
	use super::*;
	use serde::Deserialize;
	use std::sync::atomic::{AtomicBool, Ordering};
	use std::sync::Arc;
	use trade_types::{ConfigSchema, Schema, ValidationError};

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Row {
		version: u64,
		flag: bool,
		value: String,
	}

	impl Versioned for Row {
		fn version(&self) -> u64 {
			self.version
		}

		fn set_version(&mut self, version: u64) {
			self.version = version;
		}
	}

	fn row() -> Row {
		Row {
			version: 1,
			flag: false,
			value: "initial".into(),
		}
	}

	async fn service_with_row() -> StorageService {
		let service = StorageService::new(Box::new(MemoryStorage::new()));
		service.insert_new("rows", "r1", &row()).await.unwrap();
		service
	}

	#[tokio::test]
	async fn test_insert_new_rejects_existing_key() {
		let service = service_with_row().await;
		let result = service.insert_new("rows", "r1", &row()).await;
		assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
	}

	#[tokio::test]
	async fn test_update_versioned_bumps_version() {
		let service = service_with_row().await;
		let updated: Row = service
			.update_versioned("rows", "r1", 1, |r: &mut Row| {
				r.value = "changed".into();
				Ok::<_, StorageError>(())
			})
			.await
			.unwrap();
		assert_eq!(updated.version, 2);

		let stored: Row = service.retrieve("rows", "r1").await.unwrap();
		assert_eq!(stored, updated);
	}

	#[tokio::test]
	async fn test_update_versioned_stale_version_conflicts() {
		let service = service_with_row().await;
		let result: Result<Row, StorageError> = service
			.update_versioned("rows", "r1", 7, |_: &mut Row| Ok(()))
			.await;
		assert!(matches!(
			result,
			Err(StorageError::Conflict {
				expected: 7,
				actual: 1
			})
		));
		let stored: Row = service.retrieve("rows", "r1").await.unwrap();
		assert_eq!(stored, row());
	}

	#[tokio::test]
	async fn test_update_unversioned_keeps_version() {
		let service = service_with_row().await;
		let updated = service
			.update_unversioned("rows", "r1", |r: &mut Row| {
				if r.flag {
					return false;
				}
				r.flag = true;
				true
			})
			.await
			.unwrap();
		assert_eq!(updated.map(|r| (r.version, r.flag)), Some((1, true)));

		// Second pass sees the flag already set and writes nothing.
		let again = service
			.update_unversioned("rows", "r1", |r: &mut Row| !r.flag)
			.await
			.unwrap();
		assert!(again.is_none());

		let bumped = service
			.update_unversioned("rows", "r1", |r: &mut Row| {
				r.version += 1;
				true
			})
			.await;
		assert!(matches!(bumped, Err(StorageError::Backend(_))));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_versioned_updates_single_winner() {
		let service = Arc::new(service_with_row().await);
		let mut handles = Vec::new();
		for n in 0..8 {
			let service = service.clone();
			handles.push(tokio::spawn(async move {
				service
					.update_versioned("rows", "r1", 1, |r: &mut Row| {
						r.value = format!("writer-{}", n);
						Ok::<_, StorageError>(())
					})
					.await
			}));
		}

		let mut wins = 0;
		let mut conflicts = 0;
		for result in futures::future::join_all(handles).await {
			match result.unwrap() {
				Ok(_) => wins += 1,
				Err(StorageError::Conflict { .. }) => conflicts += 1,
				Err(e) => panic!("unexpected error: {}", e),
			}
		}
		assert_eq!(wins, 1);
		assert_eq!(conflicts, 7);
		let stored: Row = service.retrieve("rows", "r1").await.unwrap();
		assert_eq!(stored.version, 2);
	}

	/// Backend that simulates an SLA-field write landing between the read and
	/// the swap of the first compare-and-swap call.
	struct InterleavedFlagWrite {
		inner: MemoryStorage,
		fired: AtomicBool,
	}

	struct NoSchema;

	impl ConfigSchema for NoSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	#[async_trait]
	impl StorageInterface for InterleavedFlagWrite {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.inner.get_bytes(key).await
		}

		async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
			self.inner.set_bytes(key, value).await
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.inner.delete(key).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.exists(key).await
		}

		async fn compare_and_swap(
			&self,
			key: &str,
			expected: Option<&[u8]>,
			new: Vec<u8>,
		) -> Result<bool, StorageError> {
			if expected.is_some() && !self.fired.swap(true, Ordering::SeqCst) {
				let mut current: serde_json::Value =
					serde_json::from_slice(&self.inner.get_bytes(key).await?).unwrap();
				current["flag"] = serde_json::Value::Bool(true);
				self.inner
					.set_bytes(key, serde_json::to_vec(&current).unwrap())
					.await?;
			}
			self.inner.compare_and_swap(key, expected, new).await
		}

		async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
			self.inner.list_keys(namespace).await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}
	}

	#[tokio::test]
	async fn test_versioned_update_retries_over_sla_write() {
		let service = StorageService::new(Box::new(InterleavedFlagWrite {
			inner: MemoryStorage::new(),
			fired: AtomicBool::new(false),
		}));
		service.insert_new("rows", "r1", &row()).await.unwrap();

		let updated: Row = service
			.update_versioned("rows", "r1", 1, |r: &mut Row| {
				r.value = "changed".into();
				Ok::<_, StorageError>(())
			})
			.await
			.unwrap();

		// Both the concurrent flag and the business change survive.
		assert_eq!(updated.version, 2);
		assert!(updated.flag);
		assert_eq!(updated.value, "changed");
	}

	#[tokio::test]
	async fn test_list_skips_other_namespaces() {
		let service = service_with_row().await;
		service.store("rows", "r2", &row()).await.unwrap();
		service.store("other", "x", &row()).await.unwrap();

		let ids = service.list_ids("rows").await.unwrap();
		assert_eq!(ids, vec!["r1".to_string(), "r2".to_string()]);
		let rows: Vec<Row> = service.list("rows").await.unwrap();
		assert_eq!(rows.len(), 2);
		assert!(service.find::<Row>("rows", "missing").await.unwrap().is_none());
	}
}
