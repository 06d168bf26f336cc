//! API types for the tradeflow HTTP surface.
//!
//! Request bodies use camelCase field names. Every failure is rendered as
//! `{"success": false, "error": {"code", "message"}}` with the HTTP status
//! derived from the error kind.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::{Role, TransitionDescriptor, WorkflowItem, WorkflowState};

/// Body of a transition request.
///
/// `to_state` stays a string here; it is parsed against the item's kind by the
/// engine so that a name belonging to the other kind is reported as an invalid
/// transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
	pub to_state: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
	/// Version the client last saw; a mismatch fails with VERSION_CONFLICT.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expected_version: Option<u64>,
}

impl TransitionRequest {
	pub fn to(state: impl Into<String>) -> Self {
		Self {
			to_state: state.into(),
			..Default::default()
		}
	}

	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());
		self
	}
}

/// Successful transition response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
	pub success: bool,
	pub item: WorkflowItem,
	pub audit_log_id: String,
}

/// A transition the caller could fire from the item's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransition {
	pub from_state: WorkflowState,
	pub to_state: WorkflowState,
	pub allowed_roles: Vec<Role>,
	pub requires_reason: bool,
	pub required_fields: Vec<String>,
	/// Names of the business checks that will run.
	pub validations: Vec<String>,
}

impl From<&TransitionDescriptor> for AvailableTransition {
	fn from(descriptor: &TransitionDescriptor) -> Self {
		Self {
			from_state: descriptor.from_state,
			to_state: descriptor.to_state,
			allowed_roles: descriptor.allowed_roles.iter().copied().collect(),
			requires_reason: descriptor.requires_reason,
			required_fields: descriptor.required_fields.clone(),
			validations: descriptor
				.validations
				.iter()
				.map(|rule| rule.name().to_string())
				.collect(),
		}
	}
}

/// Body of an item creation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
	/// Client-chosen id; a UUID is generated when absent.
	#[serde(default)]
	pub id: Option<String>,
	pub product_id: String,
	pub quantity: Decimal,
	#[serde(default)]
	pub customer_id: Option<String>,
	#[serde(default)]
	pub vendor_id: Option<String>,
	#[serde(default)]
	pub unit_price: Option<Decimal>,
	#[serde(default)]
	pub unit_cost: Option<Decimal>,
	#[serde(default)]
	pub currency: Option<String>,
	#[serde(default)]
	pub incoterm: Option<String>,
	#[serde(default)]
	pub payment_terms: Option<String>,
	#[serde(default)]
	pub delivery_date: Option<NaiveDate>,
	#[serde(default)]
	pub linked_order_id: Option<String>,
	/// Initial owner; defaults to the creating user.
	#[serde(default)]
	pub owner_id: Option<String>,
	#[serde(default)]
	pub attributes: BTreeMap<String, Value>,
}

/// Body of a revision request against an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRevisionRequest {
	pub changes: BTreeMap<String, Value>,
	#[serde(default)]
	pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRevisionRequest {
	#[serde(default)]
	pub reason: String,
}

/// Generic success envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
	pub success: bool,
	pub data: T,
}

impl<T> ApiResponse<T> {
	pub fn ok(data: T) -> Self {
		Self {
			success: true,
			data,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
	pub status: String,
	pub catalog_version: String,
}

/// Error payload inside [`ErrorResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
	/// Stable machine-readable code, e.g. `ITEM_CLOSED`.
	pub code: String,
	pub message: String,
}

/// API error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub success: bool,
	pub error: ErrorBody,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum APIError {
	/// Malformed request, failed validation or closed item (400)
	BadRequest { code: String, message: String },
	/// Missing role for the requested action (403)
	Forbidden { code: String, message: String },
	/// Unknown item or revision (404)
	NotFound { code: String, message: String },
	/// Stale version or already-processed revision (409)
	Conflict { code: String, message: String },
	/// Storage or collaborator failure (500)
	InternalServerError { code: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::InternalServerError { .. } => 500,
		}
	}

	fn parts(&self) -> (&str, &str) {
		match self {
			APIError::BadRequest { code, message }
			| APIError::Forbidden { code, message }
			| APIError::NotFound { code, message }
			| APIError::Conflict { code, message }
			| APIError::InternalServerError { code, message } => (code, message),
		}
	}

	pub fn code(&self) -> &str {
		self.parts().0
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (code, message) = self.parts();
		ErrorResponse {
			success: false,
			error: ErrorBody {
				code: code.to_string(),
				message: message.to_string(),
			},
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let (code, message) = self.parts();
		write!(f, "{} ({}): {}", self.status_code(), code, message)
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}
