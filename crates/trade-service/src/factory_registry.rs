//! Process-wide registry of implementation factories.
//!
//! Every storage backend, notification sender and collaborator shipped with
//! the workspace registers itself here; configuration then picks among them
//! by name.

use std::sync::OnceLock;
use trade_core::TradeFactories;

static REGISTRY: OnceLock<TradeFactories> = OnceLock::new();

/// Initialize the global registry with all available implementations.
pub fn initialize_registry() -> &'static TradeFactories {
	REGISTRY.get_or_init(|| {
		let factories = TradeFactories::from_registries();
		let groups = [
			("storage", names(&factories.storage_factories)),
			("notifications", names(&factories.notification_factories)),
			("credit", names(&factories.credit_factories)),
			("compliance", names(&factories.compliance_factories)),
			("quantity", names(&factories.quantity_factories)),
		];
		for (component, implementations) in groups {
			tracing::debug!(component, implementations = ?implementations, "Registered implementations");
		}
		factories
	})
}

fn names<F>(factories: &std::collections::HashMap<String, F>) -> Vec<&str> {
	let mut names: Vec<&str> = factories.keys().map(String::as_str).collect();
	names.sort_unstable();
	names
}
