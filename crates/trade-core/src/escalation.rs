//! SLA escalation routing.
//!
//! Each state carries static warning, breach and escalation role lists. A
//! warning goes to the warning roles; a breach goes to the breach roles, plus a
//! critical notification to the escalation roles once the window is overrun by
//! more than 20%. Parking and terminal states have no roles, so nothing fires
//! for them. The router never touches the item.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use trade_types::{
	EntityRef, ItemKind, Notification, Role, Severity, WorkflowState, SLA_CRITICAL_PERCENT,
};

use crate::{Clock, NotificationDispatcher};

/// Who hears about an item that is slipping in a given state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationRoles {
	pub warning_roles: Vec<Role>,
	pub breach_roles: Vec<Role>,
	pub escalation_roles: Vec<Role>,
}

fn roles(warning: &[Role], breach: &[Role], escalation: &[Role]) -> EscalationRoles {
	EscalationRoles {
		warning_roles: warning.to_vec(),
		breach_roles: breach.to_vec(),
		escalation_roles: escalation.to_vec(),
	}
}

static ESCALATION_TABLE: Lazy<HashMap<WorkflowState, EscalationRoles>> = Lazy::new(|| {
	use Role::*;
	use WorkflowState as S;

	HashMap::from([
		(S::Draft, roles(&[SalesExecutive], &[SalesManager], &[])),
		(
			S::RfqSubmitted,
			roles(&[TechLead], &[TechLead, SalesManager], &[Director]),
		),
		(
			S::TechReview,
			roles(&[TechEngineer, TechLead], &[TechLead], &[Director]),
		),
		(
			S::TechApproved,
			roles(&[Procurement], &[Procurement, SalesManager], &[]),
		),
		(
			S::Sourcing,
			roles(&[Procurement], &[Procurement, SalesManager], &[Director]),
		),
		(S::Pricing, roles(&[SalesExecutive], &[SalesManager], &[Director])),
		(S::MarginApproval, roles(&[Director], &[Director], &[Admin])),
		(S::PriceFrozen, roles(&[SalesExecutive], &[SalesManager], &[])),
		(S::QuoteSent, roles(&[SalesExecutive], &[SalesManager], &[Director])),
		(
			S::CustomerAccepted,
			roles(&[SalesExecutive], &[SalesManager, Procurement], &[Director]),
		),
		(S::PrCreated, roles(&[SalesExecutive], &[SalesManager], &[])),
		(S::CreditCheck, roles(&[Finance], &[Finance, SalesManager], &[Director])),
		(S::CreditHold, roles(&[Finance], &[SalesManager, Finance], &[Director])),
		(S::PoReleased, roles(&[Procurement], &[Procurement], &[Director])),
		(
			S::VendorConfirmed,
			roles(&[Procurement], &[Procurement, SalesManager], &[]),
		),
		(
			S::QcPending,
			roles(&[QualityControl], &[QualityControl, Procurement], &[Director]),
		),
		(S::QcApproved, roles(&[Logistics], &[Logistics], &[])),
		(
			S::ReadyToDispatch,
			roles(&[Logistics], &[Logistics, SalesManager], &[Director]),
		),
		(S::Dispatched, roles(&[Logistics], &[Logistics, SalesExecutive], &[])),
		(S::Delivered, roles(&[Accounts], &[Accounts, Finance], &[])),
		(S::Invoiced, roles(&[Accounts], &[Finance], &[Director])),
	])
});

static NO_ROLES: Lazy<EscalationRoles> = Lazy::new(EscalationRoles::default);

/// Escalation roles of `state`. Empty for parking and terminal states.
pub fn escalation_roles(state: WorkflowState) -> &'static EscalationRoles {
	ESCALATION_TABLE.get(&state).unwrap_or(&*NO_ROLES)
}

fn format_remaining(seconds: i64) -> String {
	let hours = seconds / 3600;
	let minutes = (seconds % 3600) / 60;
	format!("{}h {}m", hours, minutes)
}

/// Builds the warning notification for an item, if the state has warning roles.
pub fn build_warning_notification(
	kind: ItemKind,
	item_id: &str,
	organization_id: &str,
	state: WorkflowState,
	percent_elapsed: f64,
	time_remaining_seconds: i64,
	now: DateTime<Utc>,
) -> Vec<Notification> {
	let table = escalation_roles(state);
	if table.warning_roles.is_empty() {
		return Vec::new();
	}
	vec![notification(
		kind,
		item_id,
		organization_id,
		Severity::Warning,
		table.warning_roles.clone(),
		format!("SLA at risk: {} {}", kind, item_id),
		format!(
			"Item has used {:.1}% of its {} window; {} remaining",
			percent_elapsed,
			state,
			format_remaining(time_remaining_seconds.max(0))
		),
		now,
	)]
}

/// Builds the breach notification and, past the critical threshold, the
/// escalation notification.
pub fn build_breach_notifications(
	kind: ItemKind,
	item_id: &str,
	organization_id: &str,
	state: WorkflowState,
	percent_elapsed: f64,
	now: DateTime<Utc>,
) -> Vec<Notification> {
	let table = escalation_roles(state);
	let mut notifications = Vec::new();
	if !table.breach_roles.is_empty() {
		notifications.push(notification(
			kind,
			item_id,
			organization_id,
			Severity::Breach,
			table.breach_roles.clone(),
			format!("SLA breached: {} {}", kind, item_id),
			format!(
				"Item exceeded its {} window ({:.1}% elapsed)",
				state, percent_elapsed
			),
			now,
		));
	}
	if percent_elapsed > SLA_CRITICAL_PERCENT && !table.escalation_roles.is_empty() {
		notifications.push(notification(
			kind,
			item_id,
			organization_id,
			Severity::Critical,
			table.escalation_roles.clone(),
			format!("SLA critical: {} {}", kind, item_id),
			format!(
				"Item is {:.1}% through its {} window and needs escalation",
				percent_elapsed, state
			),
			now,
		));
	}
	notifications
}

#[allow(clippy::too_many_arguments)]
fn notification(
	kind: ItemKind,
	item_id: &str,
	organization_id: &str,
	severity: Severity,
	target_roles: Vec<Role>,
	title: String,
	message: String,
	now: DateTime<Utc>,
) -> Notification {
	Notification {
		id: uuid::Uuid::new_v4().to_string(),
		organization_id: organization_id.to_string(),
		severity,
		target_roles,
		title,
		message,
		entity_ref: EntityRef {
			kind,
			id: item_id.to_string(),
		},
		created_at: now,
	}
}

/// Routes SLA events to the notification dispatcher.
pub struct EscalationRouter {
	dispatcher: NotificationDispatcher,
	clock: Arc<dyn Clock>,
}

impl EscalationRouter {
	pub fn new(dispatcher: NotificationDispatcher, clock: Arc<dyn Clock>) -> Self {
		Self { dispatcher, clock }
	}

	/// Fans out a warning. Returns the notifications handed to the dispatcher.
	pub fn create_sla_warning_notification(
		&self,
		kind: ItemKind,
		item_id: &str,
		organization_id: &str,
		state: WorkflowState,
		percent_elapsed: f64,
		time_remaining_seconds: i64,
	) -> Vec<Notification> {
		let notifications = build_warning_notification(
			kind,
			item_id,
			organization_id,
			state,
			percent_elapsed,
			time_remaining_seconds,
			self.clock.now(),
		);
		self.dispatcher.dispatch(notifications.clone());
		notifications
	}

	/// Fans out a breach, escalating when critical. Returns the notifications
	/// handed to the dispatcher.
	pub fn create_sla_breach_notification(
		&self,
		kind: ItemKind,
		item_id: &str,
		organization_id: &str,
		state: WorkflowState,
		percent_elapsed: f64,
	) -> Vec<Notification> {
		let notifications = build_breach_notifications(
			kind,
			item_id,
			organization_id,
			state,
			percent_elapsed,
			self.clock.now(),
		);
		self.dispatcher.dispatch(notifications.clone());
		notifications
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::SystemClock;

	fn router() -> EscalationRouter {
		EscalationRouter::new(NotificationDispatcher::disabled(), Arc::new(SystemClock))
	}

	#[test]
	fn test_breach_escalates_only_past_critical() {
		let router = router();
		let breach = router.create_sla_breach_notification(
			ItemKind::Rfq,
			"item-1",
			"org-1",
			WorkflowState::Pricing,
			105.0,
		);
		assert_eq!(breach.len(), 1);
		assert_eq!(breach[0].severity, Severity::Breach);
		assert_eq!(breach[0].target_roles, vec![Role::SalesManager]);

		let critical = router.create_sla_breach_notification(
			ItemKind::Rfq,
			"item-1",
			"org-1",
			WorkflowState::Pricing,
			130.0,
		);
		assert_eq!(critical.len(), 2);
		assert_eq!(critical[1].severity, Severity::Critical);
		assert_eq!(critical[1].target_roles, vec![Role::Director]);
	}

	#[test]
	fn test_no_escalation_roles_means_no_critical() {
		let notifications = build_breach_notifications(
			ItemKind::Order,
			"item-2",
			"org-1",
			WorkflowState::QcApproved,
			300.0,
			Utc::now(),
		);
		assert_eq!(notifications.len(), 1);
		assert_eq!(notifications[0].severity, Severity::Breach);
	}

	#[test]
	fn test_parking_and_terminal_states_are_silent() {
		for state in [
			WorkflowState::TechRejected,
			WorkflowState::QcRejected,
			WorkflowState::RfqClosed,
			WorkflowState::ForceClosed,
		] {
			assert!(router()
				.create_sla_warning_notification(ItemKind::Rfq, "i", "o", state, 85.0, 3600)
				.is_empty());
			assert!(build_breach_notifications(ItemKind::Rfq, "i", "o", state, 150.0, Utc::now())
				.is_empty());
		}
	}

	#[test]
	fn test_warning_message_mentions_remaining_time() {
		let notifications = build_warning_notification(
			ItemKind::Order,
			"item-3",
			"org-1",
			WorkflowState::CreditCheck,
			82.5,
			4 * 3600 + 20 * 60,
			Utc::now(),
		);
		assert_eq!(notifications[0].target_roles, vec![Role::Finance]);
		assert!(notifications[0].message.contains("4h 20m"));
		assert!(notifications[0].message.contains("82.5%"));
	}
}
