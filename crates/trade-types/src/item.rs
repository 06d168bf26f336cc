//! Workflow item types for the tradeflow system.
//!
//! RFQ items and order items are the only workflow-bearing entities. Both share
//! one row shape; the `kind` decides which subset of [`WorkflowState`] is legal.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{normalize_field_name, AuditEntityType, StorageKey, Versioned};

/// The two kinds of workflow item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
	/// A line item of a request for quotation.
	Rfq,
	/// A line item of a purchase/sales order.
	Order,
}

impl ItemKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ItemKind::Rfq => "RFQ",
			ItemKind::Order => "ORDER",
		}
	}

	/// State every new item of this kind starts in.
	pub fn initial_state(&self) -> WorkflowState {
		match self {
			ItemKind::Rfq => WorkflowState::Draft,
			ItemKind::Order => WorkflowState::PrCreated,
		}
	}

	/// The fixed state set of this kind, in lifecycle order.
	pub fn states(&self) -> &'static [WorkflowState] {
		match self {
			ItemKind::Rfq => RFQ_STATES,
			ItemKind::Order => ORDER_STATES,
		}
	}

	/// Returns true if `state` belongs to this kind's state set.
	pub fn accepts(&self, state: WorkflowState) -> bool {
		self.states().contains(&state)
	}

	/// Parses a state name, rejecting names that exist only for the other kind.
	pub fn parse_state(&self, name: &str) -> Result<WorkflowState, UnknownState> {
		let state = WorkflowState::from_str(name)?;
		if self.accepts(state) {
			Ok(state)
		} else {
			Err(UnknownState(format!("{} (not an {} state)", name, self.as_str())))
		}
	}

	pub fn storage_key(&self) -> StorageKey {
		match self {
			ItemKind::Rfq => StorageKey::RfqItems,
			ItemKind::Order => StorageKey::OrderItems,
		}
	}

	pub fn entity_type(&self) -> AuditEntityType {
		match self {
			ItemKind::Rfq => AuditEntityType::RfqItem,
			ItemKind::Order => AuditEntityType::OrderItem,
		}
	}
}

impl fmt::Display for ItemKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when a state name is not part of the expected state set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown state: {0}")]
pub struct UnknownState(pub String);

/// Generates the state enum together with its wire names.
macro_rules! workflow_states {
	($( $(#[$meta:meta])* $variant:ident => $text:literal ),+ $(,)?) => {
		/// Every named state an RFQ or order item can occupy.
		///
		/// `FORCE_CLOSED` is shared by both kinds; every other state belongs to
		/// exactly one kind (see [`ItemKind::states`]).
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		pub enum WorkflowState {
			$( $(#[$meta])* #[serde(rename = $text)] $variant, )+
		}

		impl WorkflowState {
			pub fn as_str(&self) -> &'static str {
				match self {
					$( WorkflowState::$variant => $text, )+
				}
			}
		}

		impl FromStr for WorkflowState {
			type Err = UnknownState;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				match s {
					$( $text => Ok(WorkflowState::$variant), )+
					_ => Err(UnknownState(s.to_string())),
				}
			}
		}
	};
}

workflow_states! {
	Draft => "DRAFT",
	RfqSubmitted => "RFQ_SUBMITTED",
	TechReview => "TECH_REVIEW",
	/// Parked after a failed technical review; the item goes back to draft.
	TechRejected => "TECH_REJECTED",
	TechApproved => "TECH_APPROVED",
	Sourcing => "SOURCING",
	Pricing => "PRICING",
	MarginApproval => "MARGIN_APPROVAL",
	PriceFrozen => "PRICE_FROZEN",
	QuoteSent => "QUOTE_SENT",
	CustomerAccepted => "CUSTOMER_ACCEPTED",
	RfqClosed => "RFQ_CLOSED",
	PrCreated => "PR_CREATED",
	CreditCheck => "CREDIT_CHECK",
	CreditHold => "CREDIT_HOLD",
	PoReleased => "PO_RELEASED",
	VendorConfirmed => "VENDOR_CONFIRMED",
	QcPending => "QC_PENDING",
	QcRejected => "QC_REJECTED",
	QcApproved => "QC_APPROVED",
	ReadyToDispatch => "READY_TO_DISPATCH",
	Dispatched => "DISPATCHED",
	/// Goods receipt (GRN) confirmed by the customer.
	Delivered => "DELIVERED",
	Invoiced => "INVOICED",
	OrderClosed => "ORDER_CLOSED",
	ForceClosed => "FORCE_CLOSED",
}

const RFQ_STATES: &[WorkflowState] = &[
	WorkflowState::Draft,
	WorkflowState::RfqSubmitted,
	WorkflowState::TechReview,
	WorkflowState::TechRejected,
	WorkflowState::TechApproved,
	WorkflowState::Sourcing,
	WorkflowState::Pricing,
	WorkflowState::MarginApproval,
	WorkflowState::PriceFrozen,
	WorkflowState::QuoteSent,
	WorkflowState::CustomerAccepted,
	WorkflowState::RfqClosed,
	WorkflowState::ForceClosed,
];

const ORDER_STATES: &[WorkflowState] = &[
	WorkflowState::PrCreated,
	WorkflowState::CreditCheck,
	WorkflowState::CreditHold,
	WorkflowState::PoReleased,
	WorkflowState::VendorConfirmed,
	WorkflowState::QcPending,
	WorkflowState::QcRejected,
	WorkflowState::QcApproved,
	WorkflowState::ReadyToDispatch,
	WorkflowState::Dispatched,
	WorkflowState::Delivered,
	WorkflowState::Invoiced,
	WorkflowState::OrderClosed,
	WorkflowState::ForceClosed,
];

impl WorkflowState {
	/// Terminal states are absorbing: nothing on the row may change afterwards
	/// except soft-delete metadata.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			WorkflowState::RfqClosed | WorkflowState::OrderClosed | WorkflowState::ForceClosed
		)
	}
}

impl fmt::Display for WorkflowState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Fields owned by the engine and the SLA subsystem. Side-effect merges and
/// revisions may never write them.
pub const PROTECTED_FIELDS: &[&str] = &[
	"id",
	"kind",
	"organization_id",
	"header_id",
	"state",
	"state_entered_at",
	"version",
	"owner_id",
	"sla_due_at",
	"sla_warning",
	"sla_breached",
	"is_deleted",
	"deleted_at",
	"deleted_by",
	"created_at",
	"updated_at",
];

/// Errors raised by name-based field access.
#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
	#[error("Field '{0}' is managed by the workflow engine and cannot be changed")]
	Protected(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
}

/// One RFQ or order line item: the unit the state engine operates on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowItem {
	pub id: String,
	pub kind: ItemKind,
	pub organization_id: String,
	/// Owning RFQ or order header.
	pub header_id: String,
	pub product_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vendor_id: Option<String>,
	pub quantity: Decimal,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unit_price: Option<Decimal>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unit_cost: Option<Decimal>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub currency: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub incoterm: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payment_terms: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delivery_date: Option<NaiveDate>,
	/// Order created from this RFQ item, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub linked_order_id: Option<String>,
	/// Extra business fields not modelled explicitly.
	#[serde(default)]
	pub attributes: BTreeMap<String, Value>,
	pub state: WorkflowState,
	pub state_entered_at: DateTime<Utc>,
	pub version: u64,
	/// Current responsible user.
	pub owner_id: String,
	#[serde(default)]
	pub sla_due_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub sla_warning: bool,
	#[serde(default)]
	pub sla_breached: bool,
	#[serde(default)]
	pub is_deleted: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deleted_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deleted_by: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Versioned for WorkflowItem {
	fn version(&self) -> u64 {
		self.version
	}

	fn set_version(&mut self, version: u64) {
		self.version = version;
	}
}

impl WorkflowItem {
	/// Creates a new item in the kind's initial state at version 1.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		id: impl Into<String>,
		kind: ItemKind,
		organization_id: impl Into<String>,
		header_id: impl Into<String>,
		product_id: impl Into<String>,
		quantity: Decimal,
		owner_id: impl Into<String>,
		now: DateTime<Utc>,
	) -> Self {
		Self {
			id: id.into(),
			kind,
			organization_id: organization_id.into(),
			header_id: header_id.into(),
			product_id: product_id.into(),
			customer_id: None,
			vendor_id: None,
			quantity,
			unit_price: None,
			unit_cost: None,
			currency: None,
			incoterm: None,
			payment_terms: None,
			delivery_date: None,
			linked_order_id: None,
			attributes: BTreeMap::new(),
			state: kind.initial_state(),
			state_entered_at: now,
			version: 1,
			owner_id: owner_id.into(),
			sla_due_at: None,
			sla_warning: false,
			sla_breached: false,
			is_deleted: false,
			deleted_at: None,
			deleted_by: None,
			created_at: now,
			updated_at: now,
		}
	}

	pub fn is_terminal(&self) -> bool {
		self.state.is_terminal()
	}

	/// True if the item is live and not yet in a terminal state.
	pub fn is_active(&self) -> bool {
		!self.is_deleted && !self.is_terminal()
	}

	pub fn has_linked_order(&self) -> bool {
		self.linked_order_id
			.as_deref()
			.is_some_and(|id| !id.trim().is_empty())
	}

	/// Reads a field by name. Typed fields are checked first, then `attributes`.
	/// Returns `None` for unknown names.
	pub fn field_value(&self, name: &str) -> Option<Value> {
		let name = normalize_field_name(name);
		let value = match name.as_str() {
			"id" => Value::String(self.id.clone()),
			"kind" => Value::String(self.kind.as_str().to_string()),
			"organization_id" => Value::String(self.organization_id.clone()),
			"header_id" => Value::String(self.header_id.clone()),
			"product_id" => Value::String(self.product_id.clone()),
			"customer_id" => opt_string(&self.customer_id),
			"vendor_id" => opt_string(&self.vendor_id),
			"quantity" => Value::String(self.quantity.to_string()),
			"unit_price" => opt_decimal(&self.unit_price),
			"unit_cost" => opt_decimal(&self.unit_cost),
			"currency" => opt_string(&self.currency),
			"incoterm" => opt_string(&self.incoterm),
			"payment_terms" => opt_string(&self.payment_terms),
			"delivery_date" => self
				.delivery_date
				.map(|d| Value::String(d.to_string()))
				.unwrap_or(Value::Null),
			"linked_order_id" => opt_string(&self.linked_order_id),
			"state" => Value::String(self.state.as_str().to_string()),
			"owner_id" => Value::String(self.owner_id.clone()),
			"version" => Value::from(self.version),
			other => return self.attributes.get(other).cloned(),
		};
		Some(value)
	}

	/// Writes a business field by name. Protected fields are rejected; unknown
	/// names land in `attributes` (a JSON null removes the attribute).
	pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), FieldError> {
		let name = normalize_field_name(name);
		if PROTECTED_FIELDS.contains(&name.as_str()) {
			return Err(FieldError::Protected(name));
		}

		match name.as_str() {
			"product_id" => match value {
				Value::String(s) if !s.trim().is_empty() => self.product_id = s,
				_ => return Err(invalid(&name, "expected a non-empty string")),
			},
			"customer_id" => self.customer_id = parse_opt_string(&name, value)?,
			"vendor_id" => self.vendor_id = parse_opt_string(&name, value)?,
			"currency" => self.currency = parse_opt_string(&name, value)?,
			"incoterm" => self.incoterm = parse_opt_string(&name, value)?,
			"payment_terms" => self.payment_terms = parse_opt_string(&name, value)?,
			"linked_order_id" => self.linked_order_id = parse_opt_string(&name, value)?,
			"quantity" => {
				self.quantity = parse_opt_decimal(&name, value)?
					.ok_or_else(|| invalid(&name, "quantity cannot be null"))?;
			},
			"unit_price" => self.unit_price = parse_opt_decimal(&name, value)?,
			"unit_cost" => self.unit_cost = parse_opt_decimal(&name, value)?,
			"delivery_date" => {
				self.delivery_date = match value {
					Value::Null => None,
					Value::String(s) => Some(
						NaiveDate::parse_from_str(&s, "%Y-%m-%d")
							.map_err(|e| invalid(&name, &e.to_string()))?,
					),
					_ => return Err(invalid(&name, "expected a YYYY-MM-DD date")),
				};
			},
			_ => {
				if value.is_null() {
					self.attributes.remove(&name);
				} else {
					self.attributes.insert(name, value);
				}
			},
		}
		Ok(())
	}
}

fn opt_string(value: &Option<String>) -> Value {
	value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn opt_decimal(value: &Option<Decimal>) -> Value {
	value
		.map(|d| Value::String(d.to_string()))
		.unwrap_or(Value::Null)
}

fn invalid(field: &str, message: &str) -> FieldError {
	FieldError::InvalidValue {
		field: field.to_string(),
		message: message.to_string(),
	}
}

fn parse_opt_string(field: &str, value: Value) -> Result<Option<String>, FieldError> {
	match value {
		Value::Null => Ok(None),
		Value::String(s) if s.trim().is_empty() => Ok(None),
		Value::String(s) => Ok(Some(s)),
		_ => Err(invalid(field, "expected a string")),
	}
}

fn parse_opt_decimal(field: &str, value: Value) -> Result<Option<Decimal>, FieldError> {
	match value {
		Value::Null => Ok(None),
		Value::String(s) => Decimal::from_str(s.trim())
			.map(Some)
			.map_err(|e| invalid(field, &e.to_string())),
		Value::Number(n) => Decimal::from_str(&n.to_string())
			.or_else(|_| Decimal::from_scientific(&n.to_string()))
			.map(Some)
			.map_err(|e| invalid(field, &e.to_string())),
		_ => Err(invalid(field, "expected a decimal number")),
	}
}
