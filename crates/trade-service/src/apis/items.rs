//! Item endpoints, mounted once under `/rfq` and once under `/orders`.
//!
//! The item kind comes from the mount point through an [`Extension`].

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::Json,
	Extension,
};
use trade_types::{
	APIError, ApiResponse, AuditLogEntry, AvailableTransition, CreateItemRequest, ItemKind,
	RelatedRecord, TransitionRequest, TransitionResponse, WorkflowItem,
};

use super::{api_error, Caller};
use crate::server::AppState;

/// Handles POST /{kind}/{header_id}/items.
pub async fn create_item(
	State(state): State<AppState>,
	Extension(kind): Extension<ItemKind>,
	Path(header_id): Path<String>,
	caller: Caller,
	Json(request): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<WorkflowItem>>), APIError> {
	let item = state
		.engine
		.transitions()
		.create_item(kind, &header_id, request, &caller.actor, &caller.metadata)
		.await
		.map_err(api_error)?;
	Ok((StatusCode::CREATED, Json(ApiResponse::ok(item))))
}

/// Handles GET /{kind}/{header_id}/items/{item_id}.
pub async fn get_item(
	State(state): State<AppState>,
	Extension(kind): Extension<ItemKind>,
	Path((header_id, item_id)): Path<(String, String)>,
	caller: Caller,
) -> Result<Json<ApiResponse<WorkflowItem>>, APIError> {
	let item = state
		.engine
		.transitions()
		.get_item(kind, &header_id, &item_id, &caller.actor)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(item)))
}

/// Handles DELETE /{kind}/{header_id}/items/{item_id}.
pub async fn delete_item(
	State(state): State<AppState>,
	Extension(kind): Extension<ItemKind>,
	Path((header_id, item_id)): Path<(String, String)>,
	caller: Caller,
) -> Result<Json<ApiResponse<WorkflowItem>>, APIError> {
	let item = state
		.engine
		.transitions()
		.soft_delete_item(kind, &header_id, &item_id, &caller.actor, &caller.metadata)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(item)))
}

/// Handles POST /{kind}/{header_id}/items/{item_id}/transition.
pub async fn execute_transition(
	State(state): State<AppState>,
	Extension(kind): Extension<ItemKind>,
	Path((header_id, item_id)): Path<(String, String)>,
	caller: Caller,
	Json(request): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, APIError> {
	match state
		.engine
		.transitions()
		.execute_transition(
			kind,
			&header_id,
			&item_id,
			request,
			&caller.actor,
			&caller.metadata,
		)
		.await
	{
		Ok(outcome) => Ok(Json(TransitionResponse {
			success: true,
			item: outcome.item,
			audit_log_id: outcome.audit_log_id,
		})),
		Err(e) => {
			tracing::warn!(item_id = %item_id, code = e.code(), "Transition rejected: {}", e);
			Err(api_error(e))
		},
	}
}

/// Handles GET /{kind}/{header_id}/items/{item_id}/transitions.
pub async fn available_transitions(
	State(state): State<AppState>,
	Extension(kind): Extension<ItemKind>,
	Path((header_id, item_id)): Path<(String, String)>,
	caller: Caller,
) -> Result<Json<ApiResponse<Vec<AvailableTransition>>>, APIError> {
	let descriptors = state
		.engine
		.transitions()
		.available_transitions(kind, &header_id, &item_id, &caller.actor)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(
		descriptors.iter().map(AvailableTransition::from).collect(),
	)))
}

/// Handles GET /{kind}/{header_id}/items/{item_id}/audit.
pub async fn audit_trail(
	State(state): State<AppState>,
	Extension(kind): Extension<ItemKind>,
	Path((header_id, item_id)): Path<(String, String)>,
	caller: Caller,
) -> Result<Json<ApiResponse<Vec<AuditLogEntry>>>, APIError> {
	let entries = state
		.engine
		.transitions()
		.list_audit_entries(kind, &header_id, &item_id, &caller.actor)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(entries)))
}

/// Handles GET /{kind}/{header_id}/items/{item_id}/records.
pub async fn related_records(
	State(state): State<AppState>,
	Extension(kind): Extension<ItemKind>,
	Path((header_id, item_id)): Path<(String, String)>,
	caller: Caller,
) -> Result<Json<ApiResponse<Vec<RelatedRecord>>>, APIError> {
	let records = state
		.engine
		.transitions()
		.related_records(kind, &header_id, &item_id, &caller.actor)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(records)))
}
