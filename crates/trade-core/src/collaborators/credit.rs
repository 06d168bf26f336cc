//! Credit service backed by static limits from configuration.

use super::{decimal_setting, decimal_validator, CollaboratorError, CreditService, Decision};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use trade_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};

/// Applies a per-customer credit limit, falling back to a default limit.
///
/// Exposure already booked elsewhere is not tracked; the limit is compared
/// against the exposure of the item being checked.
pub struct StaticCreditService {
	default_limit: Decimal,
	limits: HashMap<String, Decimal>,
}

impl StaticCreditService {
	pub fn new(default_limit: Decimal, limits: HashMap<String, Decimal>) -> Self {
		Self {
			default_limit,
			limits,
		}
	}

	fn limit_for(&self, customer_id: &str) -> Decimal {
		self.limits
			.get(customer_id)
			.copied()
			.unwrap_or(self.default_limit)
	}
}

#[async_trait]
impl CreditService for StaticCreditService {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(StaticCreditSchema)
	}

	async fn check_credit(
		&self,
		_organization_id: &str,
		customer_id: &str,
		exposure: Decimal,
	) -> Result<Decision, CollaboratorError> {
		let limit = self.limit_for(customer_id);
		if exposure > limit {
			return Ok(Decision::Fail(format!(
				"Exposure {} exceeds the credit limit {} of customer {}",
				exposure, limit, customer_id
			)));
		}
		Ok(Decision::Pass)
	}
}

pub struct StaticCreditSchema;

impl ConfigSchema for StaticCreditSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("default_limit", FieldType::String).with_validator(decimal_validator),
				Field::new("limits", FieldType::Table(Schema::new(vec![], vec![]))).with_validator(
					|value| {
						let table = value.as_table().ok_or("expected a table")?;
						for (customer, limit) in table {
							decimal_validator(limit)
								.map_err(|e| format!("limit for '{}': {}", customer, e))?;
						}
						Ok(())
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create the static credit service.
///
/// Configuration parameters:
/// - `default_limit`: Limit for customers without an entry (default: "1000000")
/// - `limits`: Table of customer id to limit, as decimal strings
pub fn create_credit_service(
	config: &toml::Value,
) -> Result<Box<dyn CreditService>, CollaboratorError> {
	StaticCreditSchema
		.validate(config)
		.map_err(|e| CollaboratorError::Configuration(e.to_string()))?;

	let default_limit = decimal_setting(config, "default_limit")?.unwrap_or(Decimal::from(1_000_000));
	let mut limits = HashMap::new();
	if let Some(table) = config.get("limits").and_then(|v| v.as_table()) {
		for (customer, value) in table {
			let text = value.as_str().unwrap_or_default();
			let limit = Decimal::from_str(text.trim())
				.map_err(|e| CollaboratorError::Configuration(e.to_string()))?;
			limits.insert(customer.clone(), limit);
		}
	}
	Ok(Box::new(StaticCreditService::new(default_limit, limits)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "static";
	type Factory = super::CreditFactory;

	fn factory() -> Self::Factory {
		create_credit_service
	}
}

impl super::CreditRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_customer_limit_overrides_default() {
		let config: toml::Value = toml::from_str(
			r#"
default_limit = "1000"
[limits]
cust-big = "50000"
"#,
		)
		.unwrap();
		let service = create_credit_service(&config).unwrap();

		let small = service
			.check_credit("org", "cust-small", Decimal::from(1500))
			.await
			.unwrap();
		assert!(!small.is_pass());
		let big = service
			.check_credit("org", "cust-big", Decimal::from(1500))
			.await
			.unwrap();
		assert!(big.is_pass());
	}

	#[test]
	fn test_rejects_non_decimal_limit() {
		let config: toml::Value = toml::from_str("default_limit = \"lots\"").unwrap();
		assert!(matches!(
			create_credit_service(&config),
			Err(CollaboratorError::Configuration(_))
		));
	}
}
