//! Notification delivery for the tradeflow system.
//!
//! The engine produces [`Notification`] values for NOTIFY side effects and SLA
//! escalations. This crate hands them to every configured sender. Delivery is
//! best effort: a failing sender is logged and never reported back to the
//! operation that produced the notification.

use async_trait::async_trait;
use thiserror::Error;
use trade_types::{truncate_id, ConfigSchema, ImplementationRegistry, Notification};

/// Re-export implementations
pub mod implementations {
	pub mod log;
	pub mod webhook;
}

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// The receiving end rejected the notification.
	#[error("Rejected: {0}")]
	Rejected(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait implemented by every notification sender.
#[async_trait]
pub trait NotificationInterface: Send + Sync {
	/// Returns the configuration schema for this sender.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Delivers one notification to the sender's channel.
	async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Type alias for notification factory functions.
pub type NotificationFactory =
	fn(&toml::Value) -> Result<Box<dyn NotificationInterface>, NotificationError>;

/// Registry trait for notification implementations.
pub trait NotificationRegistry: ImplementationRegistry<Factory = NotificationFactory> {}

/// Get all registered notification implementations.
pub fn get_all_implementations() -> Vec<(&'static str, NotificationFactory)> {
	use implementations::{log, webhook};

	vec![
		(log::Registry::NAME, log::Registry::factory()),
		(webhook::Registry::NAME, webhook::Registry::factory()),
	]
}

/// Fans each notification out to all configured senders.
pub struct NotificationService {
	senders: Vec<(String, Box<dyn NotificationInterface>)>,
}

impl NotificationService {
	pub fn new(senders: Vec<(String, Box<dyn NotificationInterface>)>) -> Self {
		Self { senders }
	}

	pub fn sender_count(&self) -> usize {
		self.senders.len()
	}

	/// Sends `notification` through every sender concurrently.
	///
	/// Returns the number of senders that accepted it. Failures are logged.
	pub async fn dispatch(&self, notification: &Notification) -> usize {
		let attempts = self.senders.iter().map(|(name, sender)| async move {
			match sender.send(notification).await {
				Ok(()) => true,
				Err(e) => {
					tracing::warn!(
						sender = %name,
						notification_id = %truncate_id(&notification.id),
						severity = %notification.severity,
						error = %e,
						"Notification delivery failed"
					);
					false
				},
			}
		});
		futures::future::join_all(attempts)
			.await
			.into_iter()
			.filter(|delivered| *delivered)
			.count()
	}

	/// Dispatches a batch in order.
	pub async fn dispatch_all(&self, notifications: &[Notification]) -> usize {
		let mut delivered = 0;
		for notification in notifications {
			delivered += self.dispatch(notification).await;
		}
		delivered
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;
	use trade_types::{EntityRef, ItemKind, Role, Schema, Severity, ValidationError};

	struct NoSchema;

	impl ConfigSchema for NoSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	struct Counting {
		sent: Arc<AtomicUsize>,
		fail: bool,
	}

	#[async_trait]
	impl NotificationInterface for Counting {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}

		async fn send(&self, _notification: &Notification) -> Result<(), NotificationError> {
			if self.fail {
				return Err(NotificationError::Network("unreachable".into()));
			}
			self.sent.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	fn notification() -> Notification {
		Notification {
			id: "n-1".into(),
			organization_id: "org-1".into(),
			severity: Severity::Breach,
			target_roles: vec![Role::SalesManager],
			title: "SLA breached".into(),
			message: "Item overdue".into(),
			entity_ref: EntityRef {
				kind: ItemKind::Rfq,
				id: "item-1".into(),
			},
			created_at: Utc::now(),
		}
	}

	#[tokio::test]
	async fn test_failing_sender_does_not_block_others() {
		let sent = Arc::new(AtomicUsize::new(0));
		let service = NotificationService::new(vec![
			(
				"broken".into(),
				Box::new(Counting {
					sent: sent.clone(),
					fail: true,
				}),
			),
			(
				"ok".into(),
				Box::new(Counting {
					sent: sent.clone(),
					fail: false,
				}),
			),
		]);

		assert_eq!(service.dispatch(&notification()).await, 1);
		assert_eq!(
			service
				.dispatch_all(&[notification(), notification()])
				.await,
			2
		);
		assert_eq!(sent.load(Ordering::SeqCst), 3);
	}

	#[test]
	fn test_registered_implementations() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["log", "webhook"]);
	}
}
