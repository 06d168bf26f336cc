//! Sender that POSTs notifications as JSON to an HTTP endpoint.

use crate::{NotificationError, NotificationInterface};
use async_trait::async_trait;
use std::time::Duration;
use trade_types::{
	truncate_id, ConfigSchema, Field, FieldType, ImplementationRegistry, Notification, Schema,
	ValidationError,
};

const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

pub struct WebhookNotifier {
	client: reqwest::Client,
	url: String,
}

impl WebhookNotifier {
	pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| NotificationError::Configuration(e.to_string()))?;
		Ok(Self {
			client,
			url: url.into(),
		})
	}
}

#[async_trait]
impl NotificationInterface for WebhookNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(WebhookNotifierSchema)
	}

	async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
		let response = self
			.client
			.post(&self.url)
			.json(notification)
			.send()
			.await
			.map_err(|e| NotificationError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			return Err(NotificationError::Rejected(format!(
				"{} returned {}",
				self.url, status
			)));
		}
		tracing::debug!(
			notification_id = %truncate_id(&notification.id),
			status = %status,
			"Webhook notification delivered"
		);
		Ok(())
	}
}

pub struct WebhookNotifierSchema;

impl ConfigSchema for WebhookNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
						Ok(())
					},
					_ => Err("url must start with http:// or https://".to_string()),
				}
			})],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(300),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create a webhook notifier from configuration.
///
/// Configuration parameters:
/// - `url`: Endpoint receiving the JSON notification
/// - `timeout_seconds`: Request timeout (default: 5)
pub fn create_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotificationInterface>, NotificationError> {
	WebhookNotifierSchema
		.validate(config)
		.map_err(|e| NotificationError::Configuration(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| NotificationError::Configuration("url is required".into()))?;
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|secs| secs as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(WebhookNotifier::new(
		url,
		Duration::from_secs(timeout),
	)?))
}

/// Registry for the webhook notifier implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "webhook";
	type Factory = crate::NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl crate::NotificationRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
	use chrono::Utc;
	use std::sync::Arc;
	use tokio::sync::Mutex;
	use trade_types::{EntityRef, ItemKind, Role, Severity};

	fn notification() -> Notification {
		Notification {
			id: "n-42".into(),
			organization_id: "org-1".into(),
			severity: Severity::Warning,
			target_roles: vec![Role::TechLead],
			title: "SLA at risk".into(),
			message: "80% of the window used".into(),
			entity_ref: EntityRef {
				kind: ItemKind::Order,
				id: "item-5".into(),
			},
			created_at: Utc::now(),
		}
	}

	async fn serve(router: Router) -> String {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, router).await.unwrap();
		});
		format!("http://{}/hook", addr)
	}

	#[tokio::test]
	async fn test_posts_notification_json() {
		let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
		let router = Router::new()
			.route(
				"/hook",
				post(
					|State(received): State<Arc<Mutex<Vec<serde_json::Value>>>>,
					 Json(body): Json<serde_json::Value>| async move {
						received.lock().await.push(body);
						StatusCode::NO_CONTENT
					},
				),
			)
			.with_state(received.clone());
		let url = serve(router).await;

		let notifier = WebhookNotifier::new(url, Duration::from_secs(2)).unwrap();
		notifier.send(&notification()).await.unwrap();

		let bodies = received.lock().await;
		assert_eq!(bodies.len(), 1);
		assert_eq!(bodies[0]["severity"], "WARNING");
		assert_eq!(bodies[0]["entityRef"]["id"], "item-5");
	}

	#[tokio::test]
	async fn test_non_success_status_is_rejected() {
		let router = Router::new().route("/hook", post(|| async { StatusCode::BAD_GATEWAY }));
		let url = serve(router).await;

		let notifier = WebhookNotifier::new(url, Duration::from_secs(2)).unwrap();
		assert!(matches!(
			notifier.send(&notification()).await,
			Err(NotificationError::Rejected(_))
		));
	}

	#[test]
	fn test_schema_requires_http_url() {
		let missing = toml::Value::Table(toml::value::Table::new());
		assert!(create_notifier(&missing).is_err());
		let bad: toml::Value = toml::from_str("url = \"ftp://example\"").unwrap();
		assert!(create_notifier(&bad).is_err());
		let good: toml::Value =
			toml::from_str("url = \"https://hooks.example.com/x\"\ntimeout_seconds = 3").unwrap();
		assert!(create_notifier(&good).is_ok());
	}
}
