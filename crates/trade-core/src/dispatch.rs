//! Fire-and-forget notification hand-off.
//!
//! Notifications are handed over only after the change that produced them is
//! durable. Delivery runs on its own task; its outcome never reaches the
//! caller.

use std::sync::Arc;
use trade_notify::NotificationService;
use trade_types::Notification;

#[derive(Clone)]
pub struct NotificationDispatcher {
	service: Arc<NotificationService>,
}

impl NotificationDispatcher {
	pub fn new(service: Arc<NotificationService>) -> Self {
		Self { service }
	}

	/// A dispatcher with no senders. Notifications are dropped.
	pub fn disabled() -> Self {
		Self::new(Arc::new(NotificationService::new(Vec::new())))
	}

	/// Spawns delivery of `notifications` and returns immediately.
	pub fn dispatch(&self, notifications: Vec<Notification>) {
		if notifications.is_empty() || self.service.sender_count() == 0 {
			return;
		}
		let service = self.service.clone();
		tokio::spawn(async move {
			let delivered = service.dispatch_all(&notifications).await;
			tracing::debug!(
				count = notifications.len(),
				delivered,
				"Notification batch handed to senders"
			);
		});
	}
}
