//! Transition catalog.
//!
//! Each item kind has a map `(from, to) -> TransitionDescriptor`. The catalog is
//! immutable once built; the engine swaps whole catalogs atomically when a new
//! one is loaded. A built-in catalog is compiled into the crate and a
//! replacement can be loaded from a TOML file with the same shape.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use trade_types::{ItemKind, SideEffect, TransitionDescriptor, ValidationRule, WorkflowState};

use crate::sla::parse_sla_hours;

const BUILTIN_CATALOG: &str = include_str!("default.toml");

#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Parse error: {0}")]
	Parse(String),
	#[error("Invalid catalog: {0}")]
	Invalid(String),
}

impl From<toml::de::Error> for CatalogError {
	fn from(err: toml::de::Error) -> Self {
		CatalogError::Parse(err.to_string())
	}
}

/// On-disk catalog layout.
#[derive(Debug, Deserialize)]
struct CatalogFile {
	version: String,
	#[serde(default)]
	rfq: Vec<TransitionDescriptor>,
	#[serde(default)]
	order: Vec<TransitionDescriptor>,
}

type EdgeMap = BTreeMap<(WorkflowState, WorkflowState), TransitionDescriptor>;

#[derive(Debug, Clone)]
pub struct TransitionCatalog {
	version: String,
	rfq: EdgeMap,
	order: EdgeMap,
}

impl TransitionCatalog {
	/// The catalog compiled into this crate.
	pub fn builtin() -> Result<Self, CatalogError> {
		Self::from_toml_str(BUILTIN_CATALOG)
	}

	pub async fn load_from_file(path: &str) -> Result<Self, CatalogError> {
		let content = tokio::fs::read_to_string(path).await?;
		Self::from_toml_str(&content)
	}

	/// Parses and validates a catalog.
	pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
		let file: CatalogFile = toml::from_str(content)?;
		if file.version.trim().is_empty() {
			return Err(CatalogError::Invalid("version must not be empty".into()));
		}
		Ok(Self {
			version: file.version,
			rfq: build_edges(ItemKind::Rfq, file.rfq)?,
			order: build_edges(ItemKind::Order, file.order)?,
		})
	}

	pub fn version(&self) -> &str {
		&self.version
	}

	fn edges(&self, kind: ItemKind) -> &EdgeMap {
		match kind {
			ItemKind::Rfq => &self.rfq,
			ItemKind::Order => &self.order,
		}
	}

	pub fn descriptor(
		&self,
		kind: ItemKind,
		from: WorkflowState,
		to: WorkflowState,
	) -> Option<&TransitionDescriptor> {
		self.edges(kind).get(&(from, to))
	}

	/// Every edge leaving `from`, ordered by target state.
	pub fn transitions_from(
		&self,
		kind: ItemKind,
		from: WorkflowState,
	) -> Vec<&TransitionDescriptor> {
		self.edges(kind)
			.range((from, WorkflowState::Draft)..)
			.take_while(|((edge_from, _), _)| *edge_from == from)
			.map(|(_, descriptor)| descriptor)
			.collect()
	}

	pub fn edge_count(&self, kind: ItemKind) -> usize {
		self.edges(kind).len()
	}
}

fn build_edges(
	kind: ItemKind,
	descriptors: Vec<TransitionDescriptor>,
) -> Result<EdgeMap, CatalogError> {
	let mut edges = EdgeMap::new();
	for descriptor in descriptors {
		validate_descriptor(kind, &descriptor)?;
		let key = (descriptor.from_state, descriptor.to_state);
		if edges.insert(key, descriptor).is_some() {
			return Err(CatalogError::Invalid(format!(
				"{} edge {} -> {} is declared twice",
				kind, key.0, key.1
			)));
		}
	}
	Ok(edges)
}

fn validate_descriptor(kind: ItemKind, descriptor: &TransitionDescriptor) -> Result<(), CatalogError> {
	let edge = format!("{} {} -> {}", kind, descriptor.from_state, descriptor.to_state);
	let invalid = |message: String| CatalogError::Invalid(format!("{}: {}", edge, message));

	for state in [descriptor.from_state, descriptor.to_state] {
		if !kind.accepts(state) {
			return Err(invalid(format!("{} is not an {} state", state, kind)));
		}
	}
	if descriptor.from_state.is_terminal() {
		return Err(invalid("terminal states have no outgoing edges".into()));
	}
	if descriptor.from_state == descriptor.to_state {
		return Err(invalid("self transitions are not allowed".into()));
	}
	if descriptor.allowed_roles.is_empty() {
		return Err(invalid("allowed_roles must not be empty".into()));
	}

	let mut seen = HashSet::new();
	for field in &descriptor.required_fields {
		if field.trim().is_empty() || !seen.insert(field.as_str()) {
			return Err(invalid(format!("bad required field '{}'", field)));
		}
	}

	for rule in &descriptor.validations {
		if let ValidationRule::MarginThreshold { min_percent } = rule {
			if min_percent.is_sign_negative() || *min_percent >= rust_decimal::Decimal::ONE_HUNDRED {
				return Err(invalid(format!("margin threshold {} out of range", min_percent)));
			}
		}
	}

	for effect in &descriptor.side_effects {
		match effect {
			SideEffect::StartSla { duration } => {
				parse_sla_hours(duration).map_err(|e| invalid(e.to_string()))?;
			},
			SideEffect::Notify { roles, .. } if roles.is_empty() => {
				return Err(invalid("NOTIFY needs at least one role".into()));
			},
			SideEffect::AssignOwner { from_field } if from_field.trim().is_empty() => {
				return Err(invalid("ASSIGN_OWNER needs a source field".into()));
			},
			_ => {},
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use trade_types::Role;

	#[test]
	fn test_builtin_catalog_loads() {
		let catalog = TransitionCatalog::builtin().unwrap();
		assert!(!catalog.version().is_empty());
		assert!(catalog.edge_count(ItemKind::Rfq) > 10);
		assert!(catalog.edge_count(ItemKind::Order) > 10);

		let submit = catalog
			.descriptor(ItemKind::Rfq, WorkflowState::Draft, WorkflowState::RfqSubmitted)
			.unwrap();
		assert!(submit.allowed_roles.contains(&Role::SalesExecutive));
		assert!(catalog
			.descriptor(ItemKind::Rfq, WorkflowState::Draft, WorkflowState::QuoteSent)
			.is_none());
	}

	#[test]
	fn test_every_non_terminal_state_has_a_way_out() {
		let catalog = TransitionCatalog::builtin().unwrap();
		for kind in [ItemKind::Rfq, ItemKind::Order] {
			for state in kind.states().iter().filter(|s| !s.is_terminal()) {
				assert!(
					!catalog.transitions_from(kind, *state).is_empty(),
					"{} {} is a dead end",
					kind,
					state
				);
			}
			for state in kind.states().iter().filter(|s| s.is_terminal()) {
				assert!(catalog.transitions_from(kind, *state).is_empty());
			}
		}
	}

	#[test]
	fn test_transitions_from_only_returns_matching_source() {
		let catalog = TransitionCatalog::builtin().unwrap();
		let edges = catalog.transitions_from(ItemKind::Order, WorkflowState::CreditCheck);
		assert!(edges.iter().all(|d| d.from_state == WorkflowState::CreditCheck));
		let targets: Vec<_> = edges.iter().map(|d| d.to_state).collect();
		assert!(targets.contains(&WorkflowState::PoReleased));
		assert!(targets.contains(&WorkflowState::CreditHold));
	}

	#[test]
	fn test_rejects_edge_out_of_terminal_state() {
		let err = TransitionCatalog::from_toml_str(
			r#"
version = "t"
[[rfq]]
from_state = "RFQ_CLOSED"
to_state = "DRAFT"
allowed_roles = ["ADMIN"]
"#,
		)
		.unwrap_err();
		assert!(matches!(err, CatalogError::Invalid(_)));
	}

	#[test]
	fn test_rejects_foreign_state_and_empty_roles() {
		let foreign = TransitionCatalog::from_toml_str(
			r#"
version = "t"
[[order]]
from_state = "DRAFT"
to_state = "PR_CREATED"
allowed_roles = ["ADMIN"]
"#,
		);
		assert!(matches!(foreign, Err(CatalogError::Invalid(_))));

		let no_roles = TransitionCatalog::from_toml_str(
			r#"
version = "t"
[[rfq]]
from_state = "DRAFT"
to_state = "RFQ_SUBMITTED"
allowed_roles = []
"#,
		);
		assert!(matches!(no_roles, Err(CatalogError::Invalid(_))));
	}

	#[test]
	fn test_rejects_duplicates_and_bad_sla() {
		let duplicate = TransitionCatalog::from_toml_str(
			r#"
version = "t"
[[rfq]]
from_state = "DRAFT"
to_state = "RFQ_SUBMITTED"
allowed_roles = ["ADMIN"]

[[rfq]]
from_state = "DRAFT"
to_state = "RFQ_SUBMITTED"
allowed_roles = ["DIRECTOR"]
"#,
		);
		assert!(matches!(duplicate, Err(CatalogError::Invalid(_))));

		let bad_sla = TransitionCatalog::from_toml_str(
			r#"
version = "t"
[[rfq]]
from_state = "DRAFT"
to_state = "RFQ_SUBMITTED"
allowed_roles = ["ADMIN"]

[[rfq.side_effects]]
type = "START_SLA"
duration = "soon"
"#,
		);
		assert!(matches!(bad_sla, Err(CatalogError::Invalid(_))));
	}

	#[test]
	fn test_unknown_validation_fails_to_parse() {
		let err = TransitionCatalog::from_toml_str(
			r#"
version = "t"
[[rfq]]
from_state = "DRAFT"
to_state = "RFQ_SUBMITTED"
allowed_roles = ["ADMIN"]

[[rfq.validations]]
type = "MOON_PHASE"
"#,
		)
		.unwrap_err();
		assert!(matches!(err, CatalogError::Parse(_)));
	}
}
