//! Typed persistence for items, audit entries, revisions and related records.
//!
//! All access goes through [`StorageService`]; rows of the same item are
//! serialized by its compare-and-swap helpers, never by an in-process lock.

use serde_json::json;
use std::sync::Arc;
use trade_storage::{StorageError, StorageService};
use trade_types::{
	Actor, AuditEntityType, AuditLogEntry, ItemKind, RelatedRecord, RevisionRecord, StorageKey,
	WorkflowItem,
};

use crate::WorkflowError;

/// Upper bound on revision-number claims lost to concurrent requests.
const MAX_REVISION_CLAIMS: u32 = 64;

/// Row id of an item inside its kind's namespace.
///
/// Client-chosen ids are only unique within an organization. The
/// organization is length-prefixed so no pair of ids can collide.
fn item_row_id(organization_id: &str, item_id: &str) -> String {
	format!("{}~{}~{}", organization_id.len(), organization_id, item_id)
}

/// Prefix of the revision-number index entries of one item.
fn revision_number_prefix(kind: ItemKind, organization_id: &str, item_id: &str) -> String {
	format!("{}~{}#", kind.as_str(), item_row_id(organization_id, item_id))
}

pub struct ItemRepository {
	storage: Arc<StorageService>,
}

impl ItemRepository {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	pub async fn find_item(
		&self,
		kind: ItemKind,
		organization_id: &str,
		item_id: &str,
	) -> Result<Option<WorkflowItem>, WorkflowError> {
		Ok(self
			.storage
			.find(kind.storage_key().as_str(), &item_row_id(organization_id, item_id))
			.await?)
	}

	/// Loads an item as seen by `actor` through `header_id`.
	///
	/// Absent, soft-deleted, foreign-organization and foreign-header items are
	/// all reported as not found.
	pub async fn load_visible(
		&self,
		kind: ItemKind,
		header_id: &str,
		item_id: &str,
		actor: &Actor,
	) -> Result<WorkflowItem, WorkflowError> {
		match self.find_item(kind, &actor.organization_id, item_id).await? {
			Some(item)
				if !item.is_deleted
					&& item.organization_id == actor.organization_id
					&& item.header_id == header_id =>
			{
				Ok(item)
			},
			_ => Err(WorkflowError::ItemNotFound(item_id.to_string())),
		}
	}

	pub async fn insert_item(&self, item: &WorkflowItem) -> Result<(), WorkflowError> {
		match self
			.storage
			.insert_new(
				item.kind.storage_key().as_str(),
				&item_row_id(&item.organization_id, &item.id),
				item,
			)
			.await
		{
			Ok(()) => Ok(()),
			Err(StorageError::AlreadyExists(_)) => Err(WorkflowError::InvalidRequest(format!(
				"Item {} already exists",
				item.id
			))),
			Err(e) => Err(e.into()),
		}
	}

	/// Applies a business mutation conditioned on the version `item` was
	/// read at.
	pub async fn update_item<F>(
		&self,
		item: &WorkflowItem,
		mutate: F,
	) -> Result<WorkflowItem, WorkflowError>
	where
		F: FnMut(&mut WorkflowItem) -> Result<(), WorkflowError>,
	{
		self.storage
			.update_versioned(
				item.kind.storage_key().as_str(),
				&item_row_id(&item.organization_id, &item.id),
				item.version,
				mutate,
			)
			.await
	}

	/// Updates SLA fields without touching the version.
	pub async fn update_sla_fields<F>(
		&self,
		kind: ItemKind,
		organization_id: &str,
		item_id: &str,
		mutate: F,
	) -> Result<Option<WorkflowItem>, WorkflowError>
	where
		F: FnMut(&mut WorkflowItem) -> bool,
	{
		Ok(self
			.storage
			.update_unversioned(
				kind.storage_key().as_str(),
				&item_row_id(organization_id, item_id),
				mutate,
			)
			.await?)
	}

	pub async fn list_items(&self, kind: ItemKind) -> Result<Vec<WorkflowItem>, WorkflowError> {
		Ok(self.storage.list(kind.storage_key().as_str()).await?)
	}

	/// Appends an audit entry. Entries are never overwritten.
	pub async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), WorkflowError> {
		Ok(self
			.storage
			.insert_new(StorageKey::AuditLogs.as_str(), &entry.id, entry)
			.await?)
	}

	/// Audit trail of an item, oldest first. Includes entries written against
	/// the item's revisions, which carry `itemId` and `itemKind` in their new
	/// value.
	pub async fn audit_trail(
		&self,
		item: &WorkflowItem,
	) -> Result<Vec<AuditLogEntry>, WorkflowError> {
		let entries: Vec<AuditLogEntry> = self.storage.list(StorageKey::AuditLogs.as_str()).await?;
		let item_entity = item.kind.entity_type();
		let item_kind = json!(item.kind);
		let mut trail: Vec<AuditLogEntry> = entries
			.into_iter()
			.filter(|entry| entry.organization_id == item.organization_id)
			.filter(|entry| {
				(entry.entity_type == item_entity && entry.entity_id == item.id)
					|| (entry.entity_type == AuditEntityType::Revision
						&& entry.new_value.get("itemId").and_then(|v| v.as_str())
							== Some(item.id.as_str())
						&& entry.new_value.get("itemKind") == Some(&item_kind))
			})
			.collect();
		trail.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
		Ok(trail)
	}

	pub async fn insert_related_record(&self, record: &RelatedRecord) -> Result<(), WorkflowError> {
		Ok(self
			.storage
			.insert_new(StorageKey::RelatedRecords.as_str(), &record.id, record)
			.await?)
	}

	pub async fn related_records(
		&self,
		item: &WorkflowItem,
	) -> Result<Vec<RelatedRecord>, WorkflowError> {
		let records: Vec<RelatedRecord> =
			self.storage.list(StorageKey::RelatedRecords.as_str()).await?;
		Ok(records
			.into_iter()
			.filter(|r| {
				r.item_id == item.id
					&& r.item_kind == item.kind
					&& r.organization_id == item.organization_id
			})
			.collect())
	}

	/// Claims the next revision number of an item.
	///
	/// Numbers are claimed through an insert-if-absent index entry, so two
	/// concurrent requests can never receive the same number.
	pub async fn claim_revision_number(
		&self,
		item: &WorkflowItem,
		revision_id: &str,
	) -> Result<u32, WorkflowError> {
		let prefix = revision_number_prefix(item.kind, &item.organization_id, &item.id);
		let highest = self
			.storage
			.list_ids(StorageKey::RevisionNumbers.as_str())
			.await?
			.iter()
			.filter_map(|key| key.strip_prefix(&prefix))
			.filter_map(|n| n.parse::<u32>().ok())
			.max()
			.unwrap_or(0);

		let mut candidate = highest + 1;
		for _ in 0..MAX_REVISION_CLAIMS {
			let key = format!("{}{}", prefix, candidate);
			match self
				.storage
				.insert_new(StorageKey::RevisionNumbers.as_str(), &key, &revision_id)
				.await
			{
				Ok(()) => return Ok(candidate),
				Err(StorageError::AlreadyExists(_)) => candidate += 1,
				Err(e) => return Err(e.into()),
			}
		}
		Err(WorkflowError::VersionConflict(format!(
			"Could not claim a revision number for {}",
			item.id
		)))
	}

	/// Gives back a claimed revision number whose revision was never stored.
	pub async fn release_revision_number(
		&self,
		item: &WorkflowItem,
		revision_number: u32,
	) -> Result<(), WorkflowError> {
		let key = format!(
			"{}{}",
			revision_number_prefix(item.kind, &item.organization_id, &item.id),
			revision_number
		);
		Ok(self
			.storage
			.remove(StorageKey::RevisionNumbers.as_str(), &key)
			.await?)
	}

	pub async fn insert_revision(&self, revision: &RevisionRecord) -> Result<(), WorkflowError> {
		Ok(self
			.storage
			.insert_new(StorageKey::Revisions.as_str(), &revision.id, revision)
			.await?)
	}

	pub async fn find_revision(
		&self,
		revision_id: &str,
	) -> Result<Option<RevisionRecord>, WorkflowError> {
		Ok(self
			.storage
			.find(StorageKey::Revisions.as_str(), revision_id)
			.await?)
	}

	pub async fn update_revision<F>(
		&self,
		revision_id: &str,
		expected_version: u64,
		mutate: F,
	) -> Result<RevisionRecord, WorkflowError>
	where
		F: FnMut(&mut RevisionRecord) -> Result<(), WorkflowError>,
	{
		self.storage
			.update_versioned(
				StorageKey::Revisions.as_str(),
				revision_id,
				expected_version,
				mutate,
			)
			.await
	}

	pub async fn list_revisions(&self) -> Result<Vec<RevisionRecord>, WorkflowError> {
		Ok(self.storage.list(StorageKey::Revisions.as_str()).await?)
	}
}
