//! REST handlers for the tradeflow API.
//!
//! Authentication happens in front of this service. The caller identity is
//! taken from the `x-user-id`, `x-user-roles` and `x-organization-id` headers
//! and trusted as given.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::str::FromStr;
use trade_core::WorkflowError;
use trade_types::{APIError, Actor, RequestMetadata, Role};

pub mod items;
pub mod revisions;
pub mod sla;

const USER_HEADER: &str = "x-user-id";
const ROLES_HEADER: &str = "x-user-roles";
const ORGANIZATION_HEADER: &str = "x-organization-id";

/// The authenticated caller plus request context for the audit trail.
#[derive(Debug, Clone)]
pub struct Caller {
	pub actor: Actor,
	pub metadata: RequestMetadata,
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
	parts
		.headers
		.get(name)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
}

fn parse_roles(raw: &str) -> Result<Vec<Role>, APIError> {
	raw.split(',')
		.map(str::trim)
		.filter(|role| !role.is_empty())
		.map(|role| {
			Role::from_str(role).map_err(|message| APIError::BadRequest {
				code: "INVALID_REQUEST".into(),
				message,
			})
		})
		.collect()
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
	type Rejection = APIError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let (Some(user_id), Some(organization_id)) =
			(header(parts, USER_HEADER), header(parts, ORGANIZATION_HEADER))
		else {
			return Err(APIError::Forbidden {
				code: "UNAUTHORIZED".into(),
				message: format!("{} and {} headers are required", USER_HEADER, ORGANIZATION_HEADER),
			});
		};
		let roles = match header(parts, ROLES_HEADER) {
			Some(raw) => parse_roles(raw)?,
			None => Vec::new(),
		};

		let metadata = RequestMetadata {
			ip_address: header(parts, "x-forwarded-for")
				.and_then(|forwarded| forwarded.split(',').next())
				.map(|ip| ip.trim().to_string()),
			user_agent: header(parts, "user-agent").map(str::to_string),
		};
		Ok(Caller {
			actor: Actor::new(user_id, roles, organization_id),
			metadata,
		})
	}
}

/// Maps an engine error onto the API error of the same HTTP status.
pub fn api_error(err: WorkflowError) -> APIError {
	let code = err.code().to_string();
	let message = err.to_string();
	match err.http_status() {
		404 => APIError::NotFound { code, message },
		403 => APIError::Forbidden { code, message },
		409 => APIError::Conflict { code, message },
		400 => APIError::BadRequest { code, message },
		_ => {
			tracing::error!(code = %code, error = %message, "Request failed");
			APIError::InternalServerError { code, message }
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_follows_error_kind() {
		let err = api_error(WorkflowError::ItemClosed {
			item_id: "rfq-1".into(),
			state: "RFQ_CLOSED".into(),
		});
		assert_eq!(err.status_code(), 400);
		assert_eq!(err.code(), "ITEM_CLOSED");

		assert_eq!(api_error(WorkflowError::VersionConflict("v".into())).status_code(), 409);
		assert_eq!(api_error(WorkflowError::Storage("disk".into())).status_code(), 500);
	}

	#[test]
	fn test_roles_parse_case_insensitively() {
		let roles = parse_roles("sales_executive, DIRECTOR,").unwrap();
		assert_eq!(roles, vec![Role::SalesExecutive, Role::Director]);
		assert_eq!(parse_roles("wizard").unwrap_err().status_code(), 400);
	}
}
