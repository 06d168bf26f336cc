//! External collaborators consulted by business validations.
//!
//! Credit exposure, compliance screening and quantity constraints live outside
//! the engine. Each is consumed through an async trait, selected by name from
//! configuration and built by a factory like every other pluggable component.
//! Implementations must be side-effect free.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;
use trade_types::{ConfigSchema, ImplementationRegistry, WorkflowItem};

pub mod compliance;
pub mod credit;
pub mod quantity;

#[derive(Debug, Error)]
pub enum CollaboratorError {
	/// The collaborator could not produce an answer.
	#[error("Service unavailable: {0}")]
	Unavailable(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Answer of a collaborator check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
	Pass,
	/// The check failed; the message explains why.
	Fail(String),
}

impl Decision {
	pub fn is_pass(&self) -> bool {
		matches!(self, Decision::Pass)
	}
}

#[async_trait]
pub trait CreditService: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Checks whether `customer_id` can take on `exposure` more credit.
	async fn check_credit(
		&self,
		organization_id: &str,
		customer_id: &str,
		exposure: Decimal,
	) -> Result<Decision, CollaboratorError>;
}

#[async_trait]
pub trait ComplianceService: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Screens the parties and product of an item.
	async fn screen(
		&self,
		organization_id: &str,
		item: &WorkflowItem,
	) -> Result<Decision, CollaboratorError>;
}

#[async_trait]
pub trait QuantityConstraintService: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Checks the item quantity against the product's ordering constraints.
	async fn check(&self, item: &WorkflowItem) -> Result<Decision, CollaboratorError>;
}

pub type CreditFactory = fn(&toml::Value) -> Result<Box<dyn CreditService>, CollaboratorError>;
pub type ComplianceFactory =
	fn(&toml::Value) -> Result<Box<dyn ComplianceService>, CollaboratorError>;
pub type QuantityFactory =
	fn(&toml::Value) -> Result<Box<dyn QuantityConstraintService>, CollaboratorError>;

pub trait CreditRegistry: ImplementationRegistry<Factory = CreditFactory> {}
pub trait ComplianceRegistry: ImplementationRegistry<Factory = ComplianceFactory> {}
pub trait QuantityRegistry: ImplementationRegistry<Factory = QuantityFactory> {}

pub fn get_credit_implementations() -> Vec<(&'static str, CreditFactory)> {
	vec![(credit::Registry::NAME, credit::Registry::factory())]
}

pub fn get_compliance_implementations() -> Vec<(&'static str, ComplianceFactory)> {
	vec![(compliance::Registry::NAME, compliance::Registry::factory())]
}

pub fn get_quantity_implementations() -> Vec<(&'static str, QuantityFactory)> {
	vec![(quantity::Registry::NAME, quantity::Registry::factory())]
}

/// Validator for settings holding a decimal written as a string.
pub(crate) fn decimal_validator(value: &toml::Value) -> Result<(), String> {
	let text = value.as_str().ok_or("expected a decimal string")?;
	Decimal::from_str(text.trim())
		.map(|_| ())
		.map_err(|e| format!("'{}' is not a decimal: {}", text, e))
}

/// Reads an optional decimal setting.
pub(crate) fn decimal_setting(
	config: &toml::Value,
	key: &str,
) -> Result<Option<Decimal>, CollaboratorError> {
	match config.get(key).and_then(|v| v.as_str()) {
		None => Ok(None),
		Some(text) => Decimal::from_str(text.trim()).map(Some).map_err(|e| {
			CollaboratorError::Configuration(format!("{}: '{}' is not a decimal: {}", key, text, e))
		}),
	}
}

/// Reads an optional array of strings.
pub(crate) fn string_list(config: &toml::Value, key: &str) -> Vec<String> {
	config
		.get(key)
		.and_then(|v| v.as_array())
		.map(|values| {
			values
				.iter()
				.filter_map(|v| v.as_str())
				.map(str::to_string)
				.collect()
		})
		.unwrap_or_default()
}
