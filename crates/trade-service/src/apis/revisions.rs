//! Revision endpoints.

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::Json,
	Extension,
};
use trade_core::RevisionDecision;
use trade_types::{
	APIError, ApiResponse, CreateRevisionRequest, ItemKind, RejectRevisionRequest, RevisionCheck,
	RevisionRecord, RevisionRequest, RevisionResult,
};

use super::{api_error, Caller};
use crate::server::AppState;

/// Handles GET /{kind}/{header_id}/items/{item_id}/revision/check.
pub async fn check_revision(
	State(state): State<AppState>,
	Extension(kind): Extension<ItemKind>,
	Path((header_id, item_id)): Path<(String, String)>,
	caller: Caller,
) -> Result<Json<ApiResponse<RevisionCheck>>, APIError> {
	let check = state
		.engine
		.revisions()
		.check_revision_allowed(kind, &header_id, &item_id, &caller.actor)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(check)))
}

/// Handles POST /{kind}/{header_id}/items/{item_id}/revisions.
///
/// A disallowed change is still a 200 with `allowed: false`.
pub async fn create_revision(
	State(state): State<AppState>,
	Extension(kind): Extension<ItemKind>,
	Path((header_id, item_id)): Path<(String, String)>,
	caller: Caller,
	Json(body): Json<CreateRevisionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RevisionResult>>), APIError> {
	let request = RevisionRequest {
		kind,
		header_id,
		item_id,
		changes: body.changes,
		reason: body.reason,
	};
	let result = state
		.engine
		.revisions()
		.create_revision(request, &caller.actor, &caller.metadata)
		.await
		.map_err(api_error)?;
	let status = if result.revision_id.is_some() {
		StatusCode::CREATED
	} else {
		StatusCode::OK
	};
	Ok((status, Json(ApiResponse::ok(result))))
}

/// Handles GET /{kind}/{header_id}/items/{item_id}/revisions.
pub async fn list_revisions(
	State(state): State<AppState>,
	Extension(kind): Extension<ItemKind>,
	Path((header_id, item_id)): Path<(String, String)>,
	caller: Caller,
) -> Result<Json<ApiResponse<Vec<RevisionRecord>>>, APIError> {
	let revisions = state
		.engine
		.revisions()
		.list_revisions(kind, &header_id, &item_id, &caller.actor)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(revisions)))
}

/// Handles POST /revisions/{id}/approve.
pub async fn approve_revision(
	State(state): State<AppState>,
	Path(revision_id): Path<String>,
	caller: Caller,
) -> Result<Json<ApiResponse<RevisionDecision>>, APIError> {
	let decision = state
		.engine
		.revisions()
		.approve_revision(&revision_id, &caller.actor, &caller.metadata)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(decision)))
}

/// Handles POST /revisions/{id}/reject.
pub async fn reject_revision(
	State(state): State<AppState>,
	Path(revision_id): Path<String>,
	caller: Caller,
	Json(body): Json<RejectRevisionRequest>,
) -> Result<Json<ApiResponse<RevisionRecord>>, APIError> {
	let revision = state
		.engine
		.revisions()
		.reject_revision(&revision_id, &caller.actor, &body.reason, &caller.metadata)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(revision)))
}

/// Handles GET /revisions/pending for the caller's organization.
pub async fn pending_revisions(
	State(state): State<AppState>,
	caller: Caller,
) -> Result<Json<ApiResponse<Vec<RevisionRecord>>>, APIError> {
	let pending = state
		.engine
		.revisions()
		.pending_revisions(&caller.actor.organization_id)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(pending)))
}
