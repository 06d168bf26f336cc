//! SLA deadlines for workflow items.
//!
//! Every non-terminal state has a fixed dwell time. On entry to a state the
//! item's due time is `state_entered_at + duration`; the share of the window
//! used so far drives the warning (80%) and breach (100%) flags. The monitor
//! sweeps active items and raises each flag at most once per state entry.
//!
//! The SLA subsystem owns `sla_due_at`, `sla_warning` and `sla_breached`. It
//! writes them with a compare-and-swap that never touches `state` or
//! `version`, so it can run alongside transition requests on the same rows.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::instrument;
use trade_types::{
	truncate_id, ItemKind, SlaItemView, SlaStatus, SlaSweepSummary, WorkflowItem, WorkflowState,
	SLA_BREACH_PERCENT, SLA_WARNING_PERCENT,
};

use crate::{Clock, EscalationRouter, ItemRepository, WorkflowError};

/// Parses an SLA duration of the form `<N>h` or `<N>d` into hours.
pub fn parse_sla_hours(duration: &str) -> Result<u32, WorkflowError> {
	let invalid = || WorkflowError::InvalidSlaDuration(duration.to_string());
	let text = duration.trim();
	let (number, multiplier) = if let Some(hours) = text.strip_suffix('h') {
		(hours, 1)
	} else if let Some(days) = text.strip_suffix('d') {
		(days, 24)
	} else {
		return Err(invalid());
	};
	if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
		return Err(invalid());
	}
	let value: u32 = number.parse().map_err(|_| invalid())?;
	if value == 0 {
		return Err(invalid());
	}
	value.checked_mul(multiplier).ok_or_else(invalid)
}

/// Dwell time of a state in hours. Zero means the state has no SLA.
pub fn calculate_sla_duration(kind: ItemKind, state: WorkflowState) -> u32 {
	use WorkflowState as S;

	if !kind.accepts(state) {
		return 0;
	}
	match state {
		S::Draft => 48,
		S::RfqSubmitted => 24,
		S::TechReview => 48,
		S::TechApproved => 24,
		S::Sourcing => 72,
		S::Pricing => 48,
		S::MarginApproval => 24,
		S::PriceFrozen => 24,
		S::QuoteSent => 168,
		S::CustomerAccepted => 48,
		S::PrCreated => 24,
		S::CreditCheck => 24,
		S::CreditHold => 48,
		S::PoReleased => 48,
		S::VendorConfirmed => 120,
		S::QcPending => 48,
		S::QcApproved => 24,
		S::ReadyToDispatch => 24,
		S::Dispatched => 168,
		S::Delivered => 72,
		S::Invoiced => 720,
		S::TechRejected | S::QcRejected => 0,
		S::RfqClosed | S::OrderClosed | S::ForceClosed => 0,
	}
}

/// Due time for a window of `hours` starting at `entered_at`.
pub fn sla_due_at(entered_at: DateTime<Utc>, hours: u32) -> Option<DateTime<Utc>> {
	(hours > 0).then(|| entered_at + Duration::hours(i64::from(hours)))
}

/// Computes the live SLA position of an item.
///
/// `percent_elapsed` is measured against the whole window
/// `sla_due_at - state_entered_at`. Warning holds from 80% up to, but not
/// including, 100%; breach from 100%.
pub fn check_sla_status(
	state_entered_at: DateTime<Utc>,
	sla_due_at: Option<DateTime<Utc>>,
	now: DateTime<Utc>,
) -> SlaStatus {
	let Some(due) = sla_due_at else {
		return SlaStatus::none();
	};
	let window_ms = (due - state_entered_at).num_milliseconds();
	if window_ms <= 0 {
		return SlaStatus::none();
	}
	let elapsed_ms = (now - state_entered_at).num_milliseconds();
	let percent_elapsed = elapsed_ms as f64 * 100.0 / window_ms as f64;
	let is_breached = percent_elapsed >= SLA_BREACH_PERCENT;
	SlaStatus {
		is_warning: !is_breached && percent_elapsed >= SLA_WARNING_PERCENT,
		is_breached,
		percent_elapsed,
		time_remaining_seconds: (due - now).num_seconds(),
	}
}

/// Which flag a sweep raised on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Raised {
	Warning,
	Breach,
}

fn view(item: &WorkflowItem, status: SlaStatus) -> Option<SlaItemView> {
	Some(SlaItemView {
		item_id: item.id.clone(),
		kind: item.kind,
		header_id: item.header_id.clone(),
		state: item.state,
		owner_id: item.owner_id.clone(),
		state_entered_at: item.state_entered_at,
		sla_due_at: item.sla_due_at?,
		status,
	})
}

/// SLA monitor and listings.
pub struct SlaMonitor {
	repository: Arc<ItemRepository>,
	router: Arc<EscalationRouter>,
	clock: Arc<dyn Clock>,
}

impl SlaMonitor {
	pub fn new(
		repository: Arc<ItemRepository>,
		router: Arc<EscalationRouter>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			repository,
			router,
			clock,
		}
	}

	pub fn router(&self) -> &EscalationRouter {
		&self.router
	}

	/// Recomputes the due time of an item for its current entry into `state`
	/// and clears both flags.
	///
	/// Nothing is written when the item has moved on from `state`, is closed or
	/// deleted, or already carries exactly these values.
	pub async fn set_sla_for_item(
		&self,
		kind: ItemKind,
		organization_id: &str,
		item_id: &str,
		state: WorkflowState,
	) -> Result<Option<WorkflowItem>, WorkflowError> {
		let hours = calculate_sla_duration(kind, state);
		self.repository
			.update_sla_fields(kind, organization_id, item_id, |item| {
				if item.state != state || !item.is_active() {
					return false;
				}
				let due = sla_due_at(item.state_entered_at, hours);
				if item.sla_due_at == due && !item.sla_warning && !item.sla_breached {
					return false;
				}
				item.sla_due_at = due;
				item.sla_warning = false;
				item.sla_breached = false;
				true
			})
			.await
	}

	async fn active_items(
		&self,
		organization_id: &str,
	) -> Result<Vec<WorkflowItem>, WorkflowError> {
		let mut items = Vec::new();
		for kind in [ItemKind::Rfq, ItemKind::Order] {
			items.extend(
				self.repository
					.list_items(kind)
					.await?
					.into_iter()
					.filter(|item| {
						item.organization_id == organization_id
							&& item.is_active()
							&& item.sla_due_at.is_some()
					}),
			);
		}
		Ok(items)
	}

	/// Sweeps the active items of one organization.
	///
	/// A newly breached item gets `sla_breached` (and `sla_warning`) set and
	/// goes down the breach path; a newly at-risk item gets `sla_warning` and
	/// goes down the warning path. Flags that are already set never fire
	/// again, so repeated sweeps are quiet.
	#[instrument(skip_all, fields(org = %organization_id))]
	pub async fn monitor_sla_status(
		&self,
		organization_id: &str,
	) -> Result<SlaSweepSummary, WorkflowError> {
		let now = self.clock.now();
		let mut summary = SlaSweepSummary::default();

		for item in self.active_items(organization_id).await? {
			summary.checked += 1;
			let status = check_sla_status(item.state_entered_at, item.sla_due_at, now);
			let due_breach = status.is_breached && !item.sla_breached;
			let due_warning = status.is_warning && !item.sla_warning;
			if !due_breach && !due_warning {
				continue;
			}

			match self.raise_flag(&item, now).await {
				Ok(Some((raised, fresh, status))) => match raised {
					Raised::Breach => {
						summary.breached += 1;
						tracing::warn!(
							item_id = %truncate_id(&fresh.id),
							state = %fresh.state,
							percent = status.percent_elapsed,
							"SLA breached"
						);
						self.router.create_sla_breach_notification(
							fresh.kind,
							&fresh.id,
							&fresh.organization_id,
							fresh.state,
							status.percent_elapsed,
						);
					},
					Raised::Warning => {
						summary.warned += 1;
						tracing::info!(
							item_id = %truncate_id(&fresh.id),
							state = %fresh.state,
							percent = status.percent_elapsed,
							"SLA at risk"
						);
						self.router.create_sla_warning_notification(
							fresh.kind,
							&fresh.id,
							&fresh.organization_id,
							fresh.state,
							status.percent_elapsed,
							status.time_remaining_seconds,
						);
					},
				},
				Ok(None) => {},
				Err(e) => {
					tracing::warn!(
						item_id = %truncate_id(&item.id),
						error = %e,
						"Failed to update SLA flags"
					);
				},
			}
		}

		tracing::debug!(
			checked = summary.checked,
			warned = summary.warned,
			breached = summary.breached,
			"SLA sweep finished"
		);
		Ok(summary)
	}

	/// Raises the due flag on the freshest copy of the row.
	///
	/// The decision is re-made on every compare-and-swap attempt, so a sweep
	/// racing a transition or another sweep never raises a stale flag twice.
	async fn raise_flag(
		&self,
		item: &WorkflowItem,
		now: DateTime<Utc>,
	) -> Result<Option<(Raised, WorkflowItem, SlaStatus)>, WorkflowError> {
		let mut outcome = None;
		let updated = self
			.repository
			.update_sla_fields(item.kind, &item.organization_id, &item.id, |row| {
				outcome = None;
				if !row.is_active() {
					return false;
				}
				let status = check_sla_status(row.state_entered_at, row.sla_due_at, now);
				if status.is_breached && !row.sla_breached {
					row.sla_breached = true;
					row.sla_warning = true;
					outcome = Some((Raised::Breach, status));
					true
				} else if status.is_warning && !row.sla_warning {
					row.sla_warning = true;
					outcome = Some((Raised::Warning, status));
					true
				} else {
					false
				}
			})
			.await?;

		Ok(match (updated, outcome) {
			(Some(fresh), Some((raised, status))) => Some((raised, fresh, status)),
			_ => None,
		})
	}

	/// Organizations owning at least one item.
	async fn organizations(&self) -> Result<BTreeSet<String>, WorkflowError> {
		let mut organizations = BTreeSet::new();
		for kind in [ItemKind::Rfq, ItemKind::Order] {
			for item in self.repository.list_items(kind).await? {
				organizations.insert(item.organization_id);
			}
		}
		Ok(organizations)
	}

	/// Sweeps every organization.
	pub async fn monitor_all(&self) -> Result<SlaSweepSummary, WorkflowError> {
		let mut total = SlaSweepSummary::default();
		for organization_id in self.organizations().await? {
			let summary = self.monitor_sla_status(&organization_id).await?;
			total.absorb(&summary);
		}
		Ok(total)
	}

	async fn listing(
		&self,
		organization_id: &str,
		keep: impl Fn(&SlaStatus) -> bool,
	) -> Result<Vec<SlaItemView>, WorkflowError> {
		let now = self.clock.now();
		let mut views: Vec<SlaItemView> = self
			.active_items(organization_id)
			.await?
			.iter()
			.filter_map(|item| {
				let status = check_sla_status(item.state_entered_at, item.sla_due_at, now);
				if keep(&status) {
					view(item, status)
				} else {
					None
				}
			})
			.collect();
		views.sort_by(|a, b| b.status.percent_elapsed.total_cmp(&a.status.percent_elapsed));
		Ok(views)
	}

	/// Items past the warning threshold but not yet breached, most urgent first.
	pub async fn at_risk(&self, organization_id: &str) -> Result<Vec<SlaItemView>, WorkflowError> {
		self.listing(organization_id, |status| status.is_warning).await
	}

	/// Breached items, most overdue first.
	pub async fn breached(&self, organization_id: &str) -> Result<Vec<SlaItemView>, WorkflowError> {
		self.listing(organization_id, |status| status.is_breached).await
	}

	/// Runs [`monitor_all`](Self::monitor_all) every `interval` until the task
	/// is dropped.
	pub async fn run(self: Arc<Self>, interval: StdDuration) {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
		loop {
			ticker.tick().await;
			match self.monitor_all().await {
				Ok(summary) => tracing::info!(
					checked = summary.checked,
					warned = summary.warned,
					breached = summary.breached,
					"SLA monitor sweep"
				),
				Err(e) => tracing::error!(error = %e, "SLA monitor sweep failed"),
			}
		}
	}
}
