//! Builder pattern for constructing trade engines.
//!
//! Composes a [`TradeEngine`] from the configured storage backend, notification
//! senders and business collaborators, each created through a named factory.

use crate::catalog::TransitionCatalog;
use crate::collaborators::{
	self, ComplianceFactory, ComplianceService, CreditFactory, CreditService, QuantityConstraintService,
	QuantityFactory,
};
use crate::engine::{validation::Validator, TransitionEngine};
use crate::escalation::EscalationRouter;
use crate::revision::RevisionGovernor;
use crate::sla::SlaMonitor;
use crate::{Clock, ItemRepository, NotificationDispatcher, SystemClock, TradeEngine};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use trade_config::{Config, ServiceSelection};
use trade_notify::{NotificationFactory, NotificationService};
use trade_storage::{StorageFactory, StorageService};

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factories for every pluggable component, keyed by implementation name.
pub struct TradeFactories {
	pub storage_factories: HashMap<String, StorageFactory>,
	pub notification_factories: HashMap<String, NotificationFactory>,
	pub credit_factories: HashMap<String, CreditFactory>,
	pub compliance_factories: HashMap<String, ComplianceFactory>,
	pub quantity_factories: HashMap<String, QuantityFactory>,
}

fn factory_map<F>(entries: Vec<(&'static str, F)>) -> HashMap<String, F> {
	entries
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect()
}

impl TradeFactories {
	/// Collects the factories of every implementation shipped with the workspace.
	pub fn from_registries() -> Self {
		Self {
			storage_factories: factory_map(trade_storage::get_all_implementations()),
			notification_factories: factory_map(trade_notify::get_all_implementations()),
			credit_factories: factory_map(collaborators::get_credit_implementations()),
			compliance_factories: factory_map(collaborators::get_compliance_implementations()),
			quantity_factories: factory_map(collaborators::get_quantity_implementations()),
		}
	}
}

/// Builds the primary implementation of a collaborator selection.
fn build_primary<F, T, E>(
	component: &'static str,
	selection: &ServiceSelection,
	factories: &HashMap<String, F>,
	create: impl Fn(&F, &toml::Value) -> Result<T, E>,
) -> Result<T, BuilderError>
where
	E: std::fmt::Display,
{
	let settings = selection.primary_config().ok_or_else(|| {
		BuilderError::Config(format!(
			"{} primary '{}' has no implementation settings",
			component, selection.primary
		))
	})?;
	let factory = factories.get(&selection.primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!(
			"{} implementation '{}' is not registered",
			component, selection.primary
		))
	})?;
	match create(factory, settings) {
		Ok(implementation) => {
			tracing::info!(component = component, implementation = %selection.primary, enabled = true, "Loaded");
			Ok(implementation)
		},
		Err(e) => {
			tracing::error!(
				component = component,
				implementation = %selection.primary,
				error = %e,
				"Failed to create implementation"
			);
			Err(BuilderError::Config(format!(
				"Failed to create {} implementation '{}': {}",
				component, selection.primary, e
			)))
		},
	}
}

/// Builder for constructing a [`TradeEngine`] with pluggable implementations.
pub struct EngineBuilder {
	config: Config,
	clock: Arc<dyn Clock>,
}

impl EngineBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			clock: Arc::new(SystemClock),
		}
	}

	/// Replaces the wall clock, mainly for deterministic tests.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub async fn build(self, factories: &TradeFactories) -> Result<TradeEngine, BuilderError> {
		// Storage: only the primary backend is created
		let primary_storage = &self.config.storage.primary;
		let storage_config = self
			.config
			.storage
			.implementations
			.get(primary_storage)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Primary storage '{}' has no implementation settings",
					primary_storage
				))
			})?;
		let storage_factory = factories
			.storage_factories
			.get(primary_storage)
			.ok_or_else(|| {
				BuilderError::MissingComponent(format!(
					"storage implementation '{}' is not registered",
					primary_storage
				))
			})?;
		let storage_backend = storage_factory(storage_config).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %primary_storage,
				error = %e,
				"Failed to create storage implementation"
			);
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				primary_storage, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %primary_storage, enabled = true, "Loaded");
		let storage = Arc::new(StorageService::new(storage_backend));

		// Notification senders: all configured ones are active
		let mut senders = Vec::new();
		for (name, settings) in &self.config.notifications.implementations {
			let Some(factory) = factories.notification_factories.get(name) else {
				tracing::warn!(component = "notifications", implementation = %name, "No factory registered, skipping");
				continue;
			};
			match factory(settings) {
				Ok(sender) => {
					tracing::info!(component = "notifications", implementation = %name, enabled = true, "Loaded");
					senders.push((name.clone(), sender));
				},
				Err(e) => {
					return Err(BuilderError::Config(format!(
						"Failed to create notification implementation '{}': {}",
						name, e
					)));
				},
			}
		}
		let dispatcher = NotificationDispatcher::new(Arc::new(NotificationService::new(senders)));

		let collaborators = &self.config.collaborators;
		let credit: Box<dyn CreditService> =
			build_primary("credit", &collaborators.credit, &factories.credit_factories, |f, s| f(s))?;
		let compliance: Box<dyn ComplianceService> = build_primary(
			"compliance",
			&collaborators.compliance,
			&factories.compliance_factories,
			|f, s| f(s),
		)?;
		let quantity: Box<dyn QuantityConstraintService> = build_primary(
			"quantity",
			&collaborators.quantity,
			&factories.quantity_factories,
			|f, s| f(s),
		)?;
		let validator = Validator::new(credit.into(), compliance.into(), quantity.into());

		let catalog = match &self.config.engine.catalog_path {
			Some(path) => TransitionCatalog::load_from_file(path)
				.await
				.map_err(|e| BuilderError::Config(format!("Transition catalog '{}': {}", path, e)))?,
			None => TransitionCatalog::builtin()
				.map_err(|e| BuilderError::Config(format!("Built-in transition catalog: {}", e)))?,
		};
		tracing::info!(
			component = "catalog",
			version = %catalog.version(),
			rfq_edges = catalog.edge_count(trade_types::ItemKind::Rfq),
			order_edges = catalog.edge_count(trade_types::ItemKind::Order),
			"Loaded"
		);
		let catalog = Arc::new(ArcSwap::from_pointee(catalog));

		let repository = Arc::new(ItemRepository::new(storage.clone()));
		let transitions = Arc::new(TransitionEngine::new(
			catalog.clone(),
			repository.clone(),
			validator,
			dispatcher.clone(),
			self.clock.clone(),
		));
		let router = Arc::new(EscalationRouter::new(dispatcher.clone(), self.clock.clone()));
		let sla = Arc::new(SlaMonitor::new(repository.clone(), router, self.clock.clone()));
		let revisions = Arc::new(RevisionGovernor::new(
			repository.clone(),
			dispatcher,
			self.clock.clone(),
		));

		Ok(TradeEngine::new(
			self.config,
			storage,
			repository,
			catalog,
			transitions,
			sla,
			revisions,
		))
	}
}
