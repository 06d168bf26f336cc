//! Transition catalog entry types.
//!
//! A [`TransitionDescriptor`] is immutable configuration describing one legal
//! edge of an item kind's state machine: who may fire it, what must be present
//! on the item, which business checks run and which side effects follow.
//! Validations and side effects are closed sum types so every handler is
//! matched exhaustively.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::{Role, WorkflowState};

/// One legal edge of the workflow state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDescriptor {
	pub from_state: WorkflowState,
	pub to_state: WorkflowState,
	pub allowed_roles: BTreeSet<Role>,
	/// When set, the caller must supply a non-blank reason.
	#[serde(default)]
	pub requires_reason: bool,
	/// Field names that must be non-empty on the item before the edge fires.
	#[serde(default)]
	pub required_fields: Vec<String>,
	/// Business checks, evaluated in order; the first failure aborts.
	#[serde(default)]
	pub validations: Vec<ValidationRule>,
	/// Effects computed in order once every check has passed.
	#[serde(default)]
	pub side_effects: Vec<SideEffect>,
}

/// Named business checks. Each variant owns its failure code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationRule {
	/// Quantity must satisfy the product's order constraints.
	QuantityConstraint,
	/// The customer must have enough unused credit for `quantity * unit_price`.
	CreditAvailable,
	/// Customer, vendor and product must pass compliance screening.
	ComplianceCleared,
	/// Currency, incoterm, payment terms and unit price must all be set.
	CommercialTermsComplete,
	/// Gross margin on price must be at least `min_percent`.
	MarginThreshold { min_percent: Decimal },
}

impl ValidationRule {
	pub fn name(&self) -> &'static str {
		match self {
			ValidationRule::QuantityConstraint => "QUANTITY_CONSTRAINT",
			ValidationRule::CreditAvailable => "CREDIT_AVAILABLE",
			ValidationRule::ComplianceCleared => "COMPLIANCE_CLEARED",
			ValidationRule::CommercialTermsComplete => "COMMERCIAL_TERMS_COMPLETE",
			ValidationRule::MarginThreshold { .. } => "MARGIN_THRESHOLD",
		}
	}

	/// Machine-readable code reported when this check fails.
	pub fn failure_code(&self) -> &'static str {
		match self {
			ValidationRule::QuantityConstraint => "QUANTITY_CONSTRAINT_VIOLATED",
			ValidationRule::CreditAvailable => "CREDIT_LIMIT_EXCEEDED",
			ValidationRule::ComplianceCleared => "COMPLIANCE_BLOCKED",
			ValidationRule::CommercialTermsComplete => "COMMERCIAL_TERMS_INCOMPLETE",
			ValidationRule::MarginThreshold { .. } => "MARGIN_BELOW_THRESHOLD",
		}
	}
}

/// Records that may be created alongside a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
	PurchaseOrder,
	QualityReport,
	DispatchNote,
	GoodsReceipt,
	Invoice,
}

impl RecordType {
	pub fn as_str(&self) -> &'static str {
		match self {
			RecordType::PurchaseOrder => "PURCHASE_ORDER",
			RecordType::QualityReport => "QUALITY_REPORT",
			RecordType::DispatchNote => "DISPATCH_NOTE",
			RecordType::GoodsReceipt => "GOODS_RECEIPT",
			RecordType::Invoice => "INVOICE",
		}
	}
}

/// Effects applied once a transition has been authorized and validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SideEffect {
	/// Merge the given business fields into the item.
	Update { fields: BTreeMap<String, Value> },
	/// Start the SLA clock with an explicit `<N>h` / `<N>d` duration instead
	/// of the per-state default.
	StartSla { duration: String },
	/// Notify every holder of the listed roles once the change is durable.
	Notify {
		roles: Vec<Role>,
		title: String,
		#[serde(default)]
		message: Option<String>,
	},
	/// Hand ownership to the user id stored in `from_field`.
	AssignOwner { from_field: String },
	/// Create a related document for the item.
	CreateRecord { record_type: RecordType },
	/// Any effect type this build does not know. Logged and skipped.
	#[serde(other)]
	Unknown,
}

impl SideEffect {
	pub fn name(&self) -> &'static str {
		match self {
			SideEffect::Update { .. } => "UPDATE",
			SideEffect::StartSla { .. } => "START_SLA",
			SideEffect::Notify { .. } => "NOTIFY",
			SideEffect::AssignOwner { .. } => "ASSIGN_OWNER",
			SideEffect::CreateRecord { .. } => "CREATE_RECORD",
			SideEffect::Unknown => "UNKNOWN",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_unknown_side_effect_deserializes() {
		let effects: Vec<SideEffect> = serde_json::from_str(
			r#"[{"type":"START_SLA","duration":"24h"},{"type":"TELEPORT","where":"mars"}]"#,
		)
		.unwrap();
		assert_eq!(
			effects[0],
			SideEffect::StartSla {
				duration: "24h".into()
			}
		);
		assert_eq!(effects[1], SideEffect::Unknown);
	}

	#[test]
	fn test_unknown_validation_is_rejected() {
		let result: Result<ValidationRule, _> =
			serde_json::from_str(r#"{"type":"HOROSCOPE_FAVOURABLE"}"#);
		assert!(result.is_err());
	}

	#[test]
	fn test_descriptor_from_toml() {
		let descriptor: TransitionDescriptor = toml::from_str(
			r#"
from_state = "PRICING"
to_state = "MARGIN_APPROVAL"
allowed_roles = ["SALES_MANAGER"]
required_fields = ["unit_price"]

[[validations]]
type = "MARGIN_THRESHOLD"
min_percent = "10"

[[side_effects]]
type = "NOTIFY"
roles = ["DIRECTOR"]
title = "Margin approval requested"
"#,
		)
		.unwrap();
		assert_eq!(descriptor.from_state, WorkflowState::Pricing);
		assert!(!descriptor.requires_reason);
		assert_eq!(descriptor.validations[0].failure_code(), "MARGIN_BELOW_THRESHOLD");
		assert_eq!(descriptor.side_effects[0].name(), "NOTIFY");
	}
}
