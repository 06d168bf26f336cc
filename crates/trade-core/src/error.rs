//! Engine error kinds.
//!
//! Every failure carries a stable machine-readable code. The HTTP status is
//! derived from the kind alone, never from the message.

use thiserror::Error;
use trade_storage::StorageError;
use trade_types::FieldError;

use crate::collaborators::CollaboratorError;

#[derive(Debug, Error)]
pub enum WorkflowError {
	#[error("Item not found: {0}")]
	ItemNotFound(String),
	/// Terminal states are absorbing; nothing may move an item out of one.
	#[error("Item {item_id} is closed ({state})")]
	ItemClosed { item_id: String, state: String },
	#[error("Invalid transition: {0}")]
	InvalidTransition(String),
	#[error("None of the caller's roles may move {from} to {to}")]
	UnauthorizedTransition { from: String, to: String },
	#[error("A reason is required for this transition")]
	ReasonRequired,
	#[error("Required field missing: {0}")]
	RequiredFieldMissing(String),
	/// A business check failed. `code` belongs to the check.
	#[error("{message}")]
	ValidationFailed { code: &'static str, message: String },
	#[error("Invalid SLA duration: {0}")]
	InvalidSlaDuration(String),
	#[error("Field '{0}' is managed by the workflow engine and cannot be changed")]
	ProtectedField(String),
	/// Optimistic concurrency loss. The only retryable kind.
	#[error("Version conflict: {0}")]
	VersionConflict(String),
	#[error("Revision not allowed: {0}")]
	RevisionNotAllowed(String),
	#[error("Revision not found: {0}")]
	RevisionNotFound(String),
	#[error("Revision already processed: {0}")]
	RevisionAlreadyProcessed(String),
	#[error("Unauthorized: {0}")]
	Unauthorized(String),
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Collaborator error: {0}")]
	Collaborator(String),
}

impl WorkflowError {
	/// Stable machine-readable code.
	pub fn code(&self) -> &'static str {
		match self {
			WorkflowError::ItemNotFound(_) => "ITEM_NOT_FOUND",
			WorkflowError::ItemClosed { .. } => "ITEM_CLOSED",
			WorkflowError::InvalidTransition(_) => "INVALID_TRANSITION",
			WorkflowError::UnauthorizedTransition { .. } => "UNAUTHORIZED_TRANSITION",
			WorkflowError::ReasonRequired => "REASON_REQUIRED",
			WorkflowError::RequiredFieldMissing(_) => "REQUIRED_FIELD_MISSING",
			WorkflowError::ValidationFailed { code, .. } => code,
			WorkflowError::InvalidSlaDuration(_) => "INVALID_SLA_DURATION",
			WorkflowError::ProtectedField(_) => "PROTECTED_FIELD",
			WorkflowError::VersionConflict(_) => "VERSION_CONFLICT",
			WorkflowError::RevisionNotAllowed(_) => "REVISION_NOT_ALLOWED",
			WorkflowError::RevisionNotFound(_) => "REVISION_NOT_FOUND",
			WorkflowError::RevisionAlreadyProcessed(_) => "REVISION_ALREADY_PROCESSED",
			WorkflowError::Unauthorized(_) => "UNAUTHORIZED",
			WorkflowError::InvalidRequest(_) => "INVALID_REQUEST",
			WorkflowError::Storage(_) => "STORAGE_ERROR",
			WorkflowError::Collaborator(_) => "COLLABORATOR_ERROR",
		}
	}

	/// HTTP status for this kind of failure.
	pub fn http_status(&self) -> u16 {
		match self {
			WorkflowError::ItemNotFound(_) | WorkflowError::RevisionNotFound(_) => 404,
			WorkflowError::UnauthorizedTransition { .. } | WorkflowError::Unauthorized(_) => 403,
			WorkflowError::VersionConflict(_) | WorkflowError::RevisionAlreadyProcessed(_) => 409,
			WorkflowError::Storage(_) | WorkflowError::Collaborator(_) => 500,
			WorkflowError::ItemClosed { .. }
			| WorkflowError::InvalidTransition(_)
			| WorkflowError::ReasonRequired
			| WorkflowError::RequiredFieldMissing(_)
			| WorkflowError::ValidationFailed { .. }
			| WorkflowError::InvalidSlaDuration(_)
			| WorkflowError::ProtectedField(_)
			| WorkflowError::RevisionNotAllowed(_)
			| WorkflowError::InvalidRequest(_) => 400,
		}
	}

	pub fn is_retryable(&self) -> bool {
		matches!(self, WorkflowError::VersionConflict(_))
	}
}

impl From<StorageError> for WorkflowError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::Conflict { .. } | StorageError::Contention(_) => {
				WorkflowError::VersionConflict(err.to_string())
			},
			other => WorkflowError::Storage(other.to_string()),
		}
	}
}

impl From<FieldError> for WorkflowError {
	fn from(err: FieldError) -> Self {
		match err {
			FieldError::Protected(field) => WorkflowError::ProtectedField(field),
			invalid @ FieldError::InvalidValue { .. } => {
				WorkflowError::InvalidRequest(invalid.to_string())
			},
		}
	}
}

impl From<CollaboratorError> for WorkflowError {
	fn from(err: CollaboratorError) -> Self {
		WorkflowError::Collaborator(err.to_string())
	}
}
