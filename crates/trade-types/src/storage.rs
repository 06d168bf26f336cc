//! Storage-related types for the tradeflow system.

use std::str::FromStr;

/// Storage namespaces for the different record collections.
///
/// Keys are built as `namespace:id` by the storage service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// RFQ line items
	RfqItems,
	/// Order line items
	OrderItems,
	/// Append-only audit trail
	AuditLogs,
	/// Revision records
	Revisions,
	/// Claimed `(item, revision number)` pairs, written insert-if-absent
	RevisionNumbers,
	/// Documents created by CREATE_RECORD side effects
	RelatedRecords,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::RfqItems => "rfq_items",
			StorageKey::OrderItems => "order_items",
			StorageKey::AuditLogs => "audit_logs",
			StorageKey::Revisions => "revisions",
			StorageKey::RevisionNumbers => "revision_numbers",
			StorageKey::RelatedRecords => "related_records",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::RfqItems,
			Self::OrderItems,
			Self::AuditLogs,
			Self::Revisions,
			Self::RevisionNumbers,
			Self::RelatedRecords,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

/// Records carrying an optimistic-concurrency version counter.
///
/// The storage service owns the increment: a versioned update sets the new
/// version to exactly one more than the version it read.
pub trait Versioned {
	fn version(&self) -> u64;
	fn set_version(&mut self, version: u64);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_storage_key_round_trips_through_str() {
		for key in StorageKey::all() {
			assert_eq!(key.as_str().parse::<StorageKey>(), Ok(key));
		}
		assert!("quotes".parse::<StorageKey>().is_err());
	}
}
