//! Sender that writes notifications to the tracing log.

use crate::{NotificationError, NotificationInterface};
use async_trait::async_trait;
use trade_types::{
	truncate_id, ConfigSchema, Field, FieldType, ImplementationRegistry, Notification, Schema,
	Severity, ValidationError,
};

/// Emits one log event per notification. Breach and critical notifications
/// are logged at warn level, everything else at info.
pub struct LogNotifier {
	target_label: String,
}

impl LogNotifier {
	pub fn new(target_label: impl Into<String>) -> Self {
		Self {
			target_label: target_label.into(),
		}
	}
}

#[async_trait]
impl NotificationInterface for LogNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogNotifierSchema)
	}

	async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
		let roles: Vec<&str> = notification.target_roles.iter().map(|r| r.as_str()).collect();
		match notification.severity {
			Severity::Breach | Severity::Critical => tracing::warn!(
				channel = %self.target_label,
				org = %notification.organization_id,
				severity = %notification.severity,
				item_id = %truncate_id(&notification.entity_ref.id),
				roles = ?roles,
				"{}: {}",
				notification.title,
				notification.message
			),
			Severity::Info | Severity::Warning => tracing::info!(
				channel = %self.target_label,
				org = %notification.organization_id,
				severity = %notification.severity,
				item_id = %truncate_id(&notification.entity_ref.id),
				roles = ?roles,
				"{}: {}",
				notification.title,
				notification.message
			),
		}
		Ok(())
	}
}

pub struct LogNotifierSchema;

impl ConfigSchema for LogNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(vec![], vec![Field::new("label", FieldType::String)]);
		schema.validate(config)
	}
}

/// Factory function to create a log notifier from configuration.
///
/// Configuration parameters:
/// - `label`: Channel label attached to every event (default: "notifications")
pub fn create_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotificationInterface>, NotificationError> {
	LogNotifierSchema
		.validate(config)
		.map_err(|e| NotificationError::Configuration(e.to_string()))?;

	let label = config
		.get("label")
		.and_then(|v| v.as_str())
		.unwrap_or("notifications");
	Ok(Box::new(LogNotifier::new(label)))
}

/// Registry for the log notifier implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = crate::NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl crate::NotificationRegistry for Registry {}
