//! SLA views and the on-demand sweep.

use axum::{extract::State, response::Json};
use trade_types::{APIError, ApiResponse, Role, SlaItemView, SlaSweepSummary};

use super::{api_error, Caller};
use crate::server::AppState;

/// Roles that may trigger a sweep by hand.
const MONITOR_ROLES: &[Role] = &[Role::Admin, Role::Director, Role::SalesManager];

/// Handles GET /sla/at-risk.
pub async fn at_risk(
	State(state): State<AppState>,
	caller: Caller,
) -> Result<Json<ApiResponse<Vec<SlaItemView>>>, APIError> {
	let items = state
		.engine
		.sla()
		.at_risk(&caller.actor.organization_id)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(items)))
}

/// Handles GET /sla/breached.
pub async fn breached(
	State(state): State<AppState>,
	caller: Caller,
) -> Result<Json<ApiResponse<Vec<SlaItemView>>>, APIError> {
	let items = state
		.engine
		.sla()
		.breached(&caller.actor.organization_id)
		.await
		.map_err(api_error)?;
	Ok(Json(ApiResponse::ok(items)))
}

/// Handles POST /sla/monitor: one sweep over the caller's organization.
pub async fn run_monitor(
	State(state): State<AppState>,
	caller: Caller,
) -> Result<Json<ApiResponse<SlaSweepSummary>>, APIError> {
	if !MONITOR_ROLES.iter().any(|role| caller.actor.holds(*role)) {
		return Err(APIError::Forbidden {
			code: "UNAUTHORIZED".into(),
			message: "running the SLA monitor requires ADMIN, DIRECTOR or SALES_MANAGER".into(),
		});
	}
	let summary = state
		.engine
		.sla()
		.monitor_sla_status(&caller.actor.organization_id)
		.await
		.map_err(api_error)?;
	tracing::info!(
		organization_id = %caller.actor.organization_id,
		checked = summary.checked,
		warned = summary.warned,
		breached = summary.breached,
		"Manual SLA sweep"
	);
	Ok(Json(ApiResponse::ok(summary)))
}
