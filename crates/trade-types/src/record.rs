//! Related documents created alongside transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ItemKind, RecordType};

/// A document (purchase order, QC report, dispatch note, goods receipt or
/// invoice) created by a CREATE_RECORD side effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedRecord {
	pub id: String,
	pub record_type: RecordType,
	pub item_id: String,
	pub item_kind: ItemKind,
	pub organization_id: String,
	pub created_by: String,
	pub created_at: DateTime<Utc>,
	/// Commercial snapshot of the item at creation time.
	#[serde(default)]
	pub payload: Value,
}
