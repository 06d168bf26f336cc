//! Notification payloads.
//!
//! Notifications are produced by NOTIFY side effects and by SLA escalation and
//! handed to the notification service after the originating change is durable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ItemKind, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
	Info,
	Warning,
	Breach,
	Critical,
}

impl Severity {
	pub fn as_str(&self) -> &'static str {
		match self {
			Severity::Info => "INFO",
			Severity::Warning => "WARNING",
			Severity::Breach => "BREACH",
			Severity::Critical => "CRITICAL",
		}
	}
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The item a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
	pub kind: ItemKind,
	pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
	pub id: String,
	pub organization_id: String,
	pub severity: Severity,
	/// Every holder of one of these roles in the organization is a recipient.
	pub target_roles: Vec<Role>,
	pub title: String,
	pub message: String,
	pub entity_ref: EntityRef,
	pub created_at: DateTime<Utc>,
}
