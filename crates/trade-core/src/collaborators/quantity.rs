//! Quantity constraints from configured bounds.

use super::{decimal_setting, decimal_validator, CollaboratorError, Decision, QuantityConstraintService};
use async_trait::async_trait;
use rust_decimal::Decimal;
use trade_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError, WorkflowItem,
};

/// Enforces a positive quantity within optional bounds and, when configured,
/// a pack-size multiple.
#[derive(Debug, Clone, Default)]
pub struct BoundsQuantityService {
	pub min_quantity: Option<Decimal>,
	pub max_quantity: Option<Decimal>,
	pub multiple_of: Option<Decimal>,
}

impl BoundsQuantityService {
	fn evaluate(&self, quantity: Decimal) -> Decision {
		if quantity <= Decimal::ZERO {
			return Decision::Fail(format!("Quantity must be positive, got {}", quantity));
		}
		if let Some(min) = self.min_quantity.filter(|min| quantity < *min) {
			return Decision::Fail(format!("Quantity {} is below the minimum order of {}", quantity, min));
		}
		if let Some(max) = self.max_quantity.filter(|max| quantity > *max) {
			return Decision::Fail(format!("Quantity {} exceeds the maximum of {}", quantity, max));
		}
		if let Some(step) = self.multiple_of.filter(|step| !step.is_zero()) {
			if !(quantity % step).is_zero() {
				return Decision::Fail(format!(
					"Quantity {} is not a multiple of the pack size {}",
					quantity, step
				));
			}
		}
		Decision::Pass
	}
}

#[async_trait]
impl QuantityConstraintService for BoundsQuantityService {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(BoundsSchema)
	}

	async fn check(&self, item: &WorkflowItem) -> Result<Decision, CollaboratorError> {
		Ok(self.evaluate(item.quantity))
	}
}

pub struct BoundsSchema;

impl ConfigSchema for BoundsSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("min_quantity", FieldType::String).with_validator(decimal_validator),
				Field::new("max_quantity", FieldType::String).with_validator(decimal_validator),
				Field::new("multiple_of", FieldType::String).with_validator(decimal_validator),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create the bounds quantity service.
///
/// Configuration parameters (decimal strings, all optional):
/// - `min_quantity`, `max_quantity`: Inclusive bounds
/// - `multiple_of`: Required pack-size multiple
pub fn create_quantity_service(
	config: &toml::Value,
) -> Result<Box<dyn QuantityConstraintService>, CollaboratorError> {
	BoundsSchema
		.validate(config)
		.map_err(|e| CollaboratorError::Configuration(e.to_string()))?;

	let service = BoundsQuantityService {
		min_quantity: decimal_setting(config, "min_quantity")?,
		max_quantity: decimal_setting(config, "max_quantity")?,
		multiple_of: decimal_setting(config, "multiple_of")?,
	};
	if let (Some(min), Some(max)) = (service.min_quantity, service.max_quantity) {
		if min > max {
			return Err(CollaboratorError::Configuration(format!(
				"min_quantity {} is greater than max_quantity {}",
				min, max
			)));
		}
	}
	Ok(Box::new(service))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "bounds";
	type Factory = super::QuantityFactory;

	fn factory() -> Self::Factory {
		create_quantity_service
	}
}

impl super::QuantityRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bounds_and_multiple() {
		let service = BoundsQuantityService {
			min_quantity: Some(Decimal::from(10)),
			max_quantity: Some(Decimal::from(1000)),
			multiple_of: Some(Decimal::from(5)),
		};
		assert!(service.evaluate(Decimal::from(25)).is_pass());
		assert!(!service.evaluate(Decimal::from(5)).is_pass());
		assert!(!service.evaluate(Decimal::from(2000)).is_pass());
		assert!(!service.evaluate(Decimal::from(27)).is_pass());
		assert!(!service.evaluate(Decimal::ZERO).is_pass());
	}

	#[test]
	fn test_factory_rejects_inverted_bounds() {
		let config: toml::Value =
			toml::from_str("min_quantity = \"10\"\nmax_quantity = \"5\"").unwrap();
		assert!(matches!(
			create_quantity_service(&config),
			Err(CollaboratorError::Configuration(_))
		));
	}
}
