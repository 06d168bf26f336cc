//! Side-effect planning.
//!
//! Effects are evaluated in catalog order against a working copy of the item
//! and collected into an [`EffectPlan`]. Nothing is written here; the engine
//! applies the plan inside its version-conditioned update and only then
//! creates records and hands notifications over.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use trade_types::{
	normalize_field_name, truncate_id, Actor, EntityRef, Notification, RecordType, RelatedRecord,
	Severity, SideEffect, WorkflowItem, WorkflowState,
};

use crate::sla::parse_sla_hours;
use crate::WorkflowError;

#[derive(Debug, Default)]
pub struct EffectPlan {
	/// Business fields to merge, by normalized name.
	pub field_updates: BTreeMap<String, Value>,
	/// SLA window replacing the per-state default, in hours.
	pub sla_override_hours: Option<u32>,
	/// New owner when an ASSIGN_OWNER effect resolved a user.
	pub owner_override: Option<String>,
	pub notifications: Vec<Notification>,
	pub record_types: Vec<RecordType>,
}

/// Computes the plan for moving `item` to `to_state`.
///
/// Protected fields in an UPDATE and malformed START_SLA durations are fatal.
/// Unknown effects are logged and skipped.
pub fn plan_side_effects(
	effects: &[SideEffect],
	item: &WorkflowItem,
	to_state: WorkflowState,
	actor: &Actor,
	now: DateTime<Utc>,
) -> Result<EffectPlan, WorkflowError> {
	let mut plan = EffectPlan::default();
	let mut working = item.clone();

	for effect in effects {
		match effect {
			SideEffect::Update { fields } => {
				for (name, value) in fields {
					working.set_field(name, value.clone())?;
					plan.field_updates
						.insert(normalize_field_name(name), value.clone());
				}
			},
			SideEffect::StartSla { duration } => {
				plan.sla_override_hours = Some(parse_sla_hours(duration)?);
			},
			SideEffect::Notify {
				roles,
				title,
				message,
			} => {
				let message = message.clone().unwrap_or_else(|| {
					format!(
						"{} {} moved from {} to {} by {}",
						item.kind, item.id, item.state, to_state, actor.user_id
					)
				});
				plan.notifications.push(Notification {
					id: uuid::Uuid::new_v4().to_string(),
					organization_id: item.organization_id.clone(),
					severity: Severity::Info,
					target_roles: roles.clone(),
					title: title.clone(),
					message,
					entity_ref: EntityRef {
						kind: item.kind,
						id: item.id.clone(),
					},
					created_at: now,
				});
			},
			SideEffect::AssignOwner { from_field } => {
				match working.field_value(from_field) {
					Some(Value::String(user)) if !user.trim().is_empty() => {
						plan.owner_override = Some(user);
					},
					_ => {
						tracing::warn!(
							item_id = %truncate_id(&item.id),
							field = %from_field,
							"Owner field is empty, keeping the acting user as owner"
						);
					},
				}
			},
			SideEffect::CreateRecord { record_type } => plan.record_types.push(*record_type),
			SideEffect::Unknown => {
				tracing::warn!(
					item_id = %truncate_id(&item.id),
					"Skipping unknown side effect"
				);
			},
		}
	}
	Ok(plan)
}

/// Builds a related record with a commercial snapshot of the item.
pub fn related_record(
	record_type: RecordType,
	item: &WorkflowItem,
	actor: &Actor,
	now: DateTime<Utc>,
) -> RelatedRecord {
	RelatedRecord {
		id: uuid::Uuid::new_v4().to_string(),
		record_type,
		item_id: item.id.clone(),
		item_kind: item.kind,
		organization_id: item.organization_id.clone(),
		created_by: actor.user_id.clone(),
		created_at: now,
		payload: json!({
			"headerId": item.header_id,
			"state": item.state,
			"productId": item.product_id,
			"quantity": item.quantity,
			"unitPrice": item.unit_price,
			"currency": item.currency,
			"customerId": item.customer_id,
			"vendorId": item.vendor_id,
			"incoterm": item.incoterm,
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal::Decimal;
	use trade_types::{ItemKind, Role};

	fn item() -> WorkflowItem {
		let mut item = WorkflowItem::new(
			"ord-9",
			ItemKind::Order,
			"org-1",
			"so-1",
			"prod-1",
			Decimal::ONE,
			"u1",
			Utc::now(),
		);
		item.state = WorkflowState::VendorConfirmed;
		item
	}

	fn actor() -> Actor {
		Actor::new("u2", [Role::Procurement], "org-1")
	}

	#[test]
	fn test_plan_collects_effects_in_order() {
		let mut item = item();
		item.attributes
			.insert("qc_inspector_id".into(), json!("inspector-4"));
		let effects = vec![
			SideEffect::Update {
				fields: BTreeMap::from([("dockDoor".to_string(), json!("D2"))]),
			},
			SideEffect::StartSla {
				duration: "2d".into(),
			},
			SideEffect::AssignOwner {
				from_field: "qc_inspector_id".into(),
			},
			SideEffect::Unknown,
			SideEffect::CreateRecord {
				record_type: RecordType::QualityReport,
			},
			SideEffect::Notify {
				roles: vec![Role::QualityControl],
				title: "Inspect".into(),
				message: None,
			},
		];
		let plan =
			plan_side_effects(&effects, &item, WorkflowState::QcPending, &actor(), Utc::now()).unwrap();
		assert_eq!(plan.field_updates.get("dock_door"), Some(&json!("D2")));
		assert_eq!(plan.sla_override_hours, Some(48));
		assert_eq!(plan.owner_override.as_deref(), Some("inspector-4"));
		assert_eq!(plan.record_types, vec![RecordType::QualityReport]);
		assert_eq!(plan.notifications.len(), 1);
		assert!(plan.notifications[0].message.contains("QC_PENDING"));
	}

	#[test]
	fn test_protected_update_and_bad_duration_are_fatal() {
		let protected = vec![SideEffect::Update {
			fields: BTreeMap::from([("slaBreached".to_string(), json!(false))]),
		}];
		let err = plan_side_effects(&protected, &item(), WorkflowState::QcPending, &actor(), Utc::now())
			.unwrap_err();
		assert_eq!(err.code(), "PROTECTED_FIELD");

		let bad = vec![SideEffect::StartSla {
			duration: "0h".into(),
		}];
		let err = plan_side_effects(&bad, &item(), WorkflowState::QcPending, &actor(), Utc::now())
			.unwrap_err();
		assert_eq!(err.code(), "INVALID_SLA_DURATION");
	}

	#[test]
	fn test_missing_owner_field_falls_back() {
		let effects = vec![SideEffect::AssignOwner {
			from_field: "qc_inspector_id".into(),
		}];
		let plan =
			plan_side_effects(&effects, &item(), WorkflowState::QcPending, &actor(), Utc::now()).unwrap();
		assert_eq!(plan.owner_override, None);
	}
}
