//! Compliance screening against configured deny lists.

use super::{string_list, CollaboratorError, ComplianceService, Decision};
use async_trait::async_trait;
use std::collections::HashSet;
use trade_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError, WorkflowItem,
};

/// Blocks items whose customer, vendor or product appears on a deny list.
pub struct DenylistComplianceService {
	denied_parties: HashSet<String>,
	denied_products: HashSet<String>,
}

impl DenylistComplianceService {
	pub fn new(
		denied_parties: impl IntoIterator<Item = String>,
		denied_products: impl IntoIterator<Item = String>,
	) -> Self {
		Self {
			denied_parties: denied_parties.into_iter().collect(),
			denied_products: denied_products.into_iter().collect(),
		}
	}
}

#[async_trait]
impl ComplianceService for DenylistComplianceService {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(DenylistSchema)
	}

	async fn screen(
		&self,
		_organization_id: &str,
		item: &WorkflowItem,
	) -> Result<Decision, CollaboratorError> {
		let parties = [
			("customer", item.customer_id.as_deref()),
			("vendor", item.vendor_id.as_deref()),
		];
		for (role, party) in parties {
			if let Some(party) = party.filter(|p| self.denied_parties.contains(*p)) {
				return Ok(Decision::Fail(format!(
					"{} {} is on the compliance deny list",
					role, party
				)));
			}
		}
		if self.denied_products.contains(&item.product_id) {
			return Ok(Decision::Fail(format!(
				"product {} is restricted",
				item.product_id
			)));
		}
		Ok(Decision::Pass)
	}
}

pub struct DenylistSchema;

impl ConfigSchema for DenylistSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("denied_parties", FieldType::Array(Box::new(FieldType::String))),
				Field::new("denied_products", FieldType::Array(Box::new(FieldType::String))),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create the deny-list compliance service.
///
/// Configuration parameters:
/// - `denied_parties`: Customer or vendor ids that may not trade
/// - `denied_products`: Restricted product ids
pub fn create_compliance_service(
	config: &toml::Value,
) -> Result<Box<dyn ComplianceService>, CollaboratorError> {
	DenylistSchema
		.validate(config)
		.map_err(|e| CollaboratorError::Configuration(e.to_string()))?;

	Ok(Box::new(DenylistComplianceService::new(
		string_list(config, "denied_parties"),
		string_list(config, "denied_products"),
	)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "denylist";
	type Factory = super::ComplianceFactory;

	fn factory() -> Self::Factory {
		create_compliance_service
	}
}

impl super::ComplianceRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use rust_decimal::Decimal;
	use trade_types::ItemKind;

	fn item(product: &str, customer: Option<&str>) -> WorkflowItem {
		let mut item = WorkflowItem::new(
			"item-1",
			ItemKind::Order,
			"org",
			"so-1",
			product,
			Decimal::ONE,
			"u1",
			Utc::now(),
		);
		item.customer_id = customer.map(str::to_string);
		item
	}

	#[tokio::test]
	async fn test_blocks_denied_party_and_product() {
		let config: toml::Value = toml::from_str(
			"denied_parties = [\"acme-shell\"]\ndenied_products = [\"dual-use-7\"]",
		)
		.unwrap();
		let service = create_compliance_service(&config).unwrap();

		assert!(!service
			.screen("org", &item("bolt", Some("acme-shell")))
			.await
			.unwrap()
			.is_pass());
		assert!(!service
			.screen("org", &item("dual-use-7", None))
			.await
			.unwrap()
			.is_pass());
		assert!(service
			.screen("org", &item("bolt", Some("acme")))
			.await
			.unwrap()
			.is_pass());
	}

	#[test]
	fn test_rejects_non_string_entries() {
		let config: toml::Value = toml::from_str("denied_parties = [1, 2]").unwrap();
		assert!(create_compliance_service(&config).is_err());
	}
}
