//! Trade-lifecycle state engine.
//!
//! Drives RFQ and order items through their workflow: catalog-driven
//! transitions with role, field and business checks, per-state SLA windows
//! with escalation, and revision governance for changes to items already in
//! flight. Every state change is version-conditioned and audited.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use trade_config::Config;
use trade_storage::StorageService;

pub mod builder;
pub mod catalog;
pub mod clock;
pub mod collaborators;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod repository;
pub mod revision;
pub mod sla;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{BuilderError, EngineBuilder, TradeFactories};
pub use catalog::{CatalogError, TransitionCatalog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::NotificationDispatcher;
pub use engine::{TransitionEngine, TransitionOutcome};
pub use error::WorkflowError;
pub use escalation::EscalationRouter;
pub use repository::ItemRepository;
pub use revision::{RevisionDecision, RevisionGovernor};
pub use sla::SlaMonitor;

/// Handle to a fully wired engine. Cheap to clone.
#[derive(Clone)]
pub struct TradeEngine {
	config: Arc<Config>,
	storage: Arc<StorageService>,
	repository: Arc<ItemRepository>,
	catalog: Arc<ArcSwap<TransitionCatalog>>,
	transitions: Arc<TransitionEngine>,
	sla: Arc<SlaMonitor>,
	revisions: Arc<RevisionGovernor>,
}

impl TradeEngine {
	pub(crate) fn new(
		config: Config,
		storage: Arc<StorageService>,
		repository: Arc<ItemRepository>,
		catalog: Arc<ArcSwap<TransitionCatalog>>,
		transitions: Arc<TransitionEngine>,
		sla: Arc<SlaMonitor>,
		revisions: Arc<RevisionGovernor>,
	) -> Self {
		Self {
			config: Arc::new(config),
			storage,
			repository,
			catalog,
			transitions,
			sla,
			revisions,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn repository(&self) -> &Arc<ItemRepository> {
		&self.repository
	}

	pub fn transitions(&self) -> &TransitionEngine {
		&self.transitions
	}

	pub fn sla(&self) -> &Arc<SlaMonitor> {
		&self.sla
	}

	pub fn revisions(&self) -> &RevisionGovernor {
		&self.revisions
	}

	pub fn catalog_version(&self) -> String {
		self.catalog.load().version().to_string()
	}

	/// Runs the periodic SLA sweep until the task is dropped.
	///
	/// Returns immediately when the monitor is disabled in configuration.
	pub async fn run_sla_monitor(&self) {
		let sla = &self.config.sla;
		if !sla.monitor_enabled {
			tracing::info!(component = "sla", "SLA monitor disabled");
			return;
		}
		let interval = Duration::from_secs(sla.monitor_interval_seconds.max(1));
		self.sla.clone().run(interval).await;
	}
}
