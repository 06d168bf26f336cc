//! HTTP server for the tradeflow API.
//!
//! Item routes are mounted twice, under `/rfq` and `/orders`, with the item
//! kind injected as a request extension.

use axum::{
	extract::{DefaultBodyLimit, State},
	http::{HeaderName, HeaderValue, Method},
	response::Json,
	routing::{get, post},
	Extension, Router,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer},
	timeout::TimeoutLayer,
	trace::TraceLayer,
};
use trade_config::{ApiConfig, CorsConfig};
use trade_core::TradeEngine;
use trade_types::{HealthResponse, ItemKind};

use crate::apis::{items, revisions, sla};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: TradeEngine,
}

/// Routes of one item collection, relative to its mount point.
fn item_routes() -> Router<AppState> {
	Router::new()
		.route("/{header_id}/items", post(items::create_item))
		.route(
			"/{header_id}/items/{item_id}",
			get(items::get_item).delete(items::delete_item),
		)
		.route(
			"/{header_id}/items/{item_id}/transition",
			post(items::execute_transition),
		)
		.route(
			"/{header_id}/items/{item_id}/transitions",
			get(items::available_transitions),
		)
		.route("/{header_id}/items/{item_id}/audit", get(items::audit_trail))
		.route("/{header_id}/items/{item_id}/records", get(items::related_records))
		.route(
			"/{header_id}/items/{item_id}/revision/check",
			get(revisions::check_revision),
		)
		.route(
			"/{header_id}/items/{item_id}/revisions",
			post(revisions::create_revision).get(revisions::list_revisions),
		)
}

fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};

	let origin = if cors.allowed_origins.iter().any(|origin| origin == "*") {
		AllowOrigin::from(Any)
	} else {
		AllowOrigin::list(
			cors.allowed_origins
				.iter()
				.filter_map(|origin| HeaderValue::from_str(origin).ok()),
		)
	};
	let methods = if cors.allowed_methods.is_empty() {
		AllowMethods::list([Method::GET, Method::POST, Method::DELETE])
	} else {
		AllowMethods::list(
			cors.allowed_methods
				.iter()
				.filter_map(|method| Method::from_bytes(method.trim().as_bytes()).ok()),
		)
	};
	let headers = if cors.allowed_headers.is_empty() {
		AllowHeaders::from(Any)
	} else {
		AllowHeaders::list(
			cors.allowed_headers
				.iter()
				.filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok()),
		)
	};

	CorsLayer::new()
		.allow_origin(origin)
		.allow_methods(methods)
		.allow_headers(headers)
}

/// Builds the full router over `engine`.
pub fn build_router(engine: TradeEngine, api_config: &ApiConfig) -> Router {
	let state = AppState { engine };

	Router::new()
		.route("/health", get(health))
		.nest("/rfq", item_routes().layer(Extension(ItemKind::Rfq)))
		.nest("/orders", item_routes().layer(Extension(ItemKind::Order)))
		.route("/revisions/pending", get(revisions::pending_revisions))
		.route("/revisions/{id}/approve", post(revisions::approve_revision))
		.route("/revisions/{id}/reject", post(revisions::reject_revision))
		.route("/sla/at-risk", get(sla::at_risk))
		.route("/sla/breached", get(sla::breached))
		.route("/sla/monitor", post(sla::run_monitor))
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors_layer(api_config.cors.as_ref()))
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds.max(1),
				)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: TradeEngine,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = build_router(engine, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Tradeflow API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles GET /health.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
	Json(HealthResponse {
		status: "ok".to_string(),
		catalog_version: state.engine.catalog_version(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{
		body::Body,
		http::{Request, StatusCode},
	};
	use serde_json::{json, Value};
	use tower::ServiceExt;
	use trade_config::builders::ConfigBuilder;
	use trade_core::{EngineBuilder, TradeFactories};

	fn api_config() -> ApiConfig {
		ApiConfig {
			enabled: true,
			host: "127.0.0.1".into(),
			port: 0,
			timeout_seconds: 30,
			max_request_size: 1024 * 1024,
			cors: None,
		}
	}

	async fn app() -> Router {
		let engine = EngineBuilder::new(ConfigBuilder::new().build())
			.build(&TradeFactories::from_registries())
			.await
			.unwrap();
		build_router(engine, &api_config())
	}

	fn request(method: &str, uri: &str, roles: &str, body: Option<Value>) -> Request<Body> {
		let builder = Request::builder()
			.method(method)
			.uri(uri)
			.header("x-user-id", "user-1")
			.header("x-user-roles", roles)
			.header("x-organization-id", "org-1")
			.header("user-agent", "router-test")
			.header("content-type", "application/json");
		match body {
			Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
			None => builder.body(Body::empty()).unwrap(),
		}
	}

	async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		let body = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap()
		};
		(status, body)
	}

	fn new_item(id: &str) -> Value {
		json!({
			"id": id,
			"productId": "prod-1",
			"quantity": "10",
			"customerId": "cust-1",
			"unitPrice": "100",
			"unitCost": "80",
		})
	}

	#[tokio::test]
	async fn test_health_reports_catalog_version() {
		let app = app().await;
		let (status, body) = send(&app, request("GET", "/health", "", None)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "ok");
		assert_eq!(body["catalogVersion"], "2025.1");
	}

	#[tokio::test]
	async fn test_create_and_transition_item() {
		let app = app().await;
		let (status, body) = send(
			&app,
			request("POST", "/rfq/hdr-1/items", "SALES_EXECUTIVE", Some(new_item("rfq-1"))),
		)
		.await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(body["data"]["state"], "DRAFT");
		assert_eq!(body["data"]["version"], 1);

		let (status, body) = send(
			&app,
			request(
				"POST",
				"/rfq/hdr-1/items/rfq-1/transition",
				"SALES_EXECUTIVE",
				Some(json!({"toState": "RFQ_SUBMITTED", "expectedVersion": 1})),
			),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["success"], true);
		assert_eq!(body["item"]["state"], "RFQ_SUBMITTED");
		assert_eq!(body["item"]["version"], 2);
		assert!(body["auditLogId"].is_string());

		let (status, body) = send(
			&app,
			request("GET", "/rfq/hdr-1/items/rfq-1/audit", "SALES_EXECUTIVE", None),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["data"].as_array().unwrap().len(), 2);
	}

	#[tokio::test]
	async fn test_errors_use_failure_envelope() {
		let app = app().await;
		send(
			&app,
			request("POST", "/rfq/hdr-1/items", "SALES_EXECUTIVE", Some(new_item("rfq-2"))),
		)
		.await;

		let (status, body) = send(
			&app,
			request(
				"POST",
				"/rfq/hdr-1/items/rfq-2/transition",
				"FINANCE",
				Some(json!({"toState": "RFQ_SUBMITTED"})),
			),
		)
		.await;
		assert_eq!(status, StatusCode::FORBIDDEN);
		assert_eq!(body["success"], false);
		assert_eq!(body["error"]["code"], "UNAUTHORIZED_TRANSITION");

		let (status, body) = send(
			&app,
			request("GET", "/orders/hdr-1/items/rfq-2", "ADMIN", None),
		)
		.await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"]["code"], "ITEM_NOT_FOUND");

		let anonymous = Request::builder()
			.method("GET")
			.uri("/rfq/hdr-1/items/rfq-2")
			.body(Body::empty())
			.unwrap();
		let (status, body) = send(&app, anonymous).await;
		assert_eq!(status, StatusCode::FORBIDDEN);
		assert_eq!(body["error"]["code"], "UNAUTHORIZED");
	}

	#[tokio::test]
	async fn test_available_transitions_and_revision_in_draft() {
		let app = app().await;
		send(
			&app,
			request("POST", "/rfq/hdr-1/items", "SALES_EXECUTIVE", Some(new_item("rfq-3"))),
		)
		.await;

		let (status, body) = send(
			&app,
			request("GET", "/rfq/hdr-1/items/rfq-3/transitions", "SALES_EXECUTIVE", None),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		let transitions = body["data"].as_array().unwrap();
		assert_eq!(transitions.len(), 1);
		assert_eq!(transitions[0]["toState"], "RFQ_SUBMITTED");
		assert_eq!(transitions[0]["requiresReason"], false);

		let (status, body) = send(
			&app,
			request("GET", "/rfq/hdr-1/items/rfq-3/revision/check", "SALES_EXECUTIVE", None),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["data"]["allowed"], true);
		assert_eq!(body["data"]["requiresApproval"], false);

		let (status, body) = send(
			&app,
			request(
				"POST",
				"/rfq/hdr-1/items/rfq-3/revisions",
				"SALES_EXECUTIVE",
				Some(json!({"changes": {"quantity": 12}, "reason": "customer update"})),
			),
		)
		.await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(body["data"]["applied"], true);
		assert_eq!(body["data"]["revisionNumber"], 1);

		let (status, body) = send(
			&app,
			request("GET", "/revisions/pending", "DIRECTOR", None),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert!(body["data"].as_array().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_manual_sla_sweep_requires_role() {
		let app = app().await;
		send(
			&app,
			request("POST", "/orders/so-1/items", "SALES_EXECUTIVE", Some(new_item("ord-1"))),
		)
		.await;

		let (status, body) = send(&app, request("POST", "/sla/monitor", "SALES_EXECUTIVE", None)).await;
		assert_eq!(status, StatusCode::FORBIDDEN);
		assert_eq!(body["error"]["code"], "UNAUTHORIZED");

		let (status, body) = send(&app, request("POST", "/sla/monitor", "ADMIN", None)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["data"]["checked"], 1);
		assert_eq!(body["data"]["breached"], 0);

		let (status, body) = send(&app, request("GET", "/sla/breached", "ADMIN", None)).await;
		assert_eq!(status, StatusCode::OK);
		assert!(body["data"].as_array().unwrap().is_empty());
	}
}
