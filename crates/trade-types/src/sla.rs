//! SLA status and sweep summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ItemKind, WorkflowState};

/// Elapsed percentage at which an item is flagged at risk.
pub const SLA_WARNING_PERCENT: f64 = 80.0;
/// Elapsed percentage at which an item is in breach.
pub const SLA_BREACH_PERCENT: f64 = 100.0;
/// Elapsed percentage above which a breach also escalates.
pub const SLA_CRITICAL_PERCENT: f64 = 120.0;

/// Live SLA position of an item relative to its current state's window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaStatus {
	/// At or past the warning threshold but not yet breached.
	pub is_warning: bool,
	pub is_breached: bool,
	pub percent_elapsed: f64,
	/// Seconds until the due time; negative once overdue.
	pub time_remaining_seconds: i64,
}

impl SlaStatus {
	/// Status for an item without an SLA window.
	pub fn none() -> Self {
		Self {
			is_warning: false,
			is_breached: false,
			percent_elapsed: 0.0,
			time_remaining_seconds: 0,
		}
	}
}

/// Counts produced by one monitor sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaSweepSummary {
	pub checked: usize,
	/// Items newly flagged as warning in this sweep.
	pub warned: usize,
	/// Items newly flagged as breached in this sweep.
	pub breached: usize,
}

impl SlaSweepSummary {
	pub fn absorb(&mut self, other: &SlaSweepSummary) {
		self.checked += other.checked;
		self.warned += other.warned;
		self.breached += other.breached;
	}
}

/// An item listed by the at-risk and breached views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaItemView {
	pub item_id: String,
	pub kind: ItemKind,
	pub header_id: String,
	pub state: WorkflowState,
	pub owner_id: String,
	pub state_entered_at: DateTime<Utc>,
	pub sla_due_at: DateTime<Utc>,
	pub status: SlaStatus,
}
