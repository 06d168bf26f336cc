//! Revision governance types.
//!
//! A revision is a governed amendment to an in-flight item. How a change is
//! handled depends on the item's current state; see [`RevisionStrategy`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::{ItemKind, Role, Versioned};

/// How a proposed change to an item is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevisionStrategy {
	/// Early stage: the change is merged immediately.
	DirectOverwrite,
	/// Technically approved: a tech lead must approve.
	NewRevisionTech,
	/// Price frozen or order released: a director must approve.
	NewRevisionDirector,
	/// Quote already with the customer: the customer must re-accept.
	CustomerReaccept,
	/// An order exists for this RFQ item; changes need a new RFQ.
	NewRfq,
	/// Closed or shipped: no change is possible.
	Immutable,
}

impl RevisionStrategy {
	pub fn as_str(&self) -> &'static str {
		match self {
			RevisionStrategy::DirectOverwrite => "DIRECT_OVERWRITE",
			RevisionStrategy::NewRevisionTech => "NEW_REVISION_TECH",
			RevisionStrategy::NewRevisionDirector => "NEW_REVISION_DIRECTOR",
			RevisionStrategy::CustomerReaccept => "CUSTOMER_REACCEPT",
			RevisionStrategy::NewRfq => "NEW_RFQ",
			RevisionStrategy::Immutable => "IMMUTABLE",
		}
	}

	pub fn is_allowed(&self) -> bool {
		!matches!(self, RevisionStrategy::NewRfq | RevisionStrategy::Immutable)
	}

	/// The role whose approval is required, if any.
	pub fn approval_role(&self) -> Option<Role> {
		match self {
			RevisionStrategy::NewRevisionTech => Some(Role::TechLead),
			RevisionStrategy::NewRevisionDirector => Some(Role::Director),
			RevisionStrategy::CustomerReaccept => Some(Role::Customer),
			RevisionStrategy::DirectOverwrite
			| RevisionStrategy::NewRfq
			| RevisionStrategy::Immutable => None,
		}
	}

	pub fn requires_approval(&self) -> bool {
		self.approval_role().is_some()
	}

	/// Human-readable explanation returned with a revision check.
	pub fn message(&self) -> &'static str {
		match self {
			RevisionStrategy::DirectOverwrite => "Changes are applied directly",
			RevisionStrategy::NewRevisionTech => {
				"Item is technically approved; a new revision requires tech lead approval"
			},
			RevisionStrategy::NewRevisionDirector => {
				"Pricing is frozen or the order is released; a new revision requires director approval"
			},
			RevisionStrategy::CustomerReaccept => {
				"Quote has been sent; the customer must re-accept the revised terms"
			},
			RevisionStrategy::NewRfq => {
				"An order already exists for this item; raise a new RFQ instead"
			},
			RevisionStrategy::Immutable => "Item can no longer be changed",
		}
	}
}

impl fmt::Display for RevisionStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Outcome of a revision policy check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionCheck {
	pub allowed: bool,
	pub requires_approval: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub approval_role: Option<Role>,
	pub revision_strategy: RevisionStrategy,
	pub message: String,
}

impl From<RevisionStrategy> for RevisionCheck {
	fn from(strategy: RevisionStrategy) -> Self {
		Self {
			allowed: strategy.is_allowed(),
			requires_approval: strategy.requires_approval(),
			approval_role: strategy.approval_role(),
			revision_strategy: strategy,
			message: strategy.message().to_string(),
		}
	}
}

/// A proposed change to an item together with its approval lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionRecord {
	pub id: String,
	pub item_id: String,
	pub item_kind: ItemKind,
	pub header_id: String,
	pub organization_id: String,
	/// 1-based, strictly increasing per item.
	pub revision_number: u32,
	pub strategy: RevisionStrategy,
	/// Field name to proposed value.
	pub proposed_changes: BTreeMap<String, Value>,
	/// Item field values at request time, merged with the proposed changes.
	pub snapshot: BTreeMap<String, Value>,
	pub revision_reason: String,
	pub requested_by: String,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub approved_by: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub approved_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rejected_by: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rejection_reason: Option<String>,
	#[serde(default)]
	pub is_deleted: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deleted_at: Option<DateTime<Utc>>,
	pub version: u64,
}

impl Versioned for RevisionRecord {
	fn version(&self) -> u64 {
		self.version
	}

	fn set_version(&mut self, version: u64) {
		self.version = version;
	}
}

impl RevisionRecord {
	pub fn is_approved(&self) -> bool {
		self.approved_at.is_some()
	}

	/// Neither approved nor rejected.
	pub fn is_pending(&self) -> bool {
		!self.is_approved() && !self.is_deleted
	}
}

/// Request to change fields of an in-flight item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionRequest {
	pub kind: ItemKind,
	pub header_id: String,
	pub item_id: String,
	pub changes: BTreeMap<String, Value>,
	pub reason: String,
}

/// Result of a revision request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionResult {
	pub allowed: bool,
	pub requires_approval: bool,
	pub revision_strategy: RevisionStrategy,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub revision_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub revision_number: Option<u32>,
	/// True when the change was merged into the item immediately.
	#[serde(default)]
	pub applied: bool,
	pub message: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_strategy_approval_roles() {
		assert_eq!(RevisionStrategy::DirectOverwrite.approval_role(), None);
		assert_eq!(
			RevisionStrategy::NewRevisionTech.approval_role(),
			Some(Role::TechLead)
		);
		assert_eq!(
			RevisionStrategy::NewRevisionDirector.approval_role(),
			Some(Role::Director)
		);
		assert_eq!(
			RevisionStrategy::CustomerReaccept.approval_role(),
			Some(Role::Customer)
		);
		assert!(!RevisionStrategy::NewRfq.is_allowed());
		assert!(!RevisionStrategy::Immutable.requires_approval());
	}

	#[test]
	fn test_check_from_strategy() {
		let check = RevisionCheck::from(RevisionStrategy::NewRevisionDirector);
		assert!(check.allowed);
		assert!(check.requires_approval);
		assert_eq!(check.approval_role, Some(Role::Director));
		let json = serde_json::to_value(&check).unwrap();
		assert_eq!(json["revisionStrategy"], "NEW_REVISION_DIRECTOR");
	}
}
