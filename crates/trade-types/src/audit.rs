//! Append-only audit records.
//!
//! Every mutating engine operation writes exactly one [`AuditLogEntry`]. Entries
//! are inserted with insert-if-absent semantics and never updated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{Actor, RequestMetadata, Role};

/// The kind of entity an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntityType {
	RfqItem,
	OrderItem,
	Revision,
}

impl AuditEntityType {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditEntityType::RfqItem => "RFQ_ITEM",
			AuditEntityType::OrderItem => "ORDER_ITEM",
			AuditEntityType::Revision => "REVISION",
		}
	}
}

impl fmt::Display for AuditEntityType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
	StateTransition,
	RevisionCreated,
	/// Revision created and merged in one step (no approval needed).
	RevisionAutoApplied,
	RevisionApproved,
	RevisionRejected,
	ItemCreated,
	ItemDeleted,
}

impl AuditAction {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditAction::StateTransition => "STATE_TRANSITION",
			AuditAction::RevisionCreated => "REVISION_CREATED",
			AuditAction::RevisionAutoApplied => "REVISION_AUTO_APPLIED",
			AuditAction::RevisionApproved => "REVISION_APPROVED",
			AuditAction::RevisionRejected => "REVISION_REJECTED",
			AuditAction::ItemCreated => "ITEM_CREATED",
			AuditAction::ItemDeleted => "ITEM_DELETED",
		}
	}
}

impl fmt::Display for AuditAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One immutable audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
	pub id: String,
	pub organization_id: String,
	pub entity_type: AuditEntityType,
	pub entity_id: String,
	pub action: AuditAction,
	pub actor_id: String,
	pub actor_roles: Vec<Role>,
	#[serde(default)]
	pub old_value: Value,
	#[serde(default)]
	pub new_value: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ip_address: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_agent: Option<String>,
	pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
	/// Starts an entry for `actor` acting on an entity. Snapshots, reason and
	/// notes are filled in with the `with_*` methods.
	pub fn new(
		id: impl Into<String>,
		entity_type: AuditEntityType,
		entity_id: impl Into<String>,
		action: AuditAction,
		actor: &Actor,
		metadata: &RequestMetadata,
		created_at: DateTime<Utc>,
	) -> Self {
		Self {
			id: id.into(),
			organization_id: actor.organization_id.clone(),
			entity_type,
			entity_id: entity_id.into(),
			action,
			actor_id: actor.user_id.clone(),
			actor_roles: actor.roles.iter().copied().collect(),
			old_value: Value::Null,
			new_value: Value::Null,
			reason: None,
			notes: None,
			ip_address: metadata.ip_address.clone(),
			user_agent: metadata.user_agent.clone(),
			created_at,
		}
	}

	pub fn with_values(mut self, old_value: Value, new_value: Value) -> Self {
		self.old_value = old_value;
		self.new_value = new_value;
		self
	}

	/// Blank strings are stored as absent.
	pub fn with_reason(mut self, reason: Option<String>) -> Self {
		self.reason = reason.filter(|r| !r.trim().is_empty());
		self
	}

	pub fn with_notes(mut self, notes: Option<String>) -> Self {
		self.notes = notes.filter(|n| !n.trim().is_empty());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_entry_captures_actor_and_metadata() {
		let actor = Actor::new("u-7", [Role::Director, Role::Admin], "org-9");
		let metadata = RequestMetadata {
			ip_address: Some("10.0.0.1".into()),
			user_agent: None,
		};
		let entry = AuditLogEntry::new(
			"a-1",
			AuditEntityType::RfqItem,
			"item-1",
			AuditAction::StateTransition,
			&actor,
			&metadata,
			Utc::now(),
		)
		.with_reason(Some("  ".into()))
		.with_notes(Some("expedite".into()));

		assert_eq!(entry.organization_id, "org-9");
		assert_eq!(entry.actor_roles, vec![Role::Admin, Role::Director]);
		assert_eq!(entry.reason, None);
		assert_eq!(entry.notes.as_deref(), Some("expedite"));
		assert_eq!(entry.ip_address.as_deref(), Some("10.0.0.1"));

		let json = serde_json::to_value(&entry).unwrap();
		assert_eq!(json["action"], "STATE_TRANSITION");
		assert_eq!(json["entityType"], "RFQ_ITEM");
	}
}
