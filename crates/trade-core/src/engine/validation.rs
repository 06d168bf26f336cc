//! Business validations run before a transition is allowed.

use rust_decimal::Decimal;
use std::sync::Arc;
use trade_types::{truncate_id, ValidationRule, WorkflowItem};

use crate::collaborators::{ComplianceService, CreditService, Decision, QuantityConstraintService};
use crate::WorkflowError;

/// Gross margin on price, in percent. `None` when the price is not positive.
pub fn gross_margin_percent(unit_price: Decimal, unit_cost: Decimal) -> Option<Decimal> {
	if unit_price <= Decimal::ZERO {
		return None;
	}
	Some((unit_price - unit_cost) / unit_price * Decimal::ONE_HUNDRED)
}

fn commercial_terms(item: &WorkflowItem) -> Decision {
	let missing: Vec<&str> = [
		("currency", item.currency.is_none()),
		("incoterm", item.incoterm.is_none()),
		("payment_terms", item.payment_terms.is_none()),
		("unit_price", item.unit_price.is_none()),
	]
	.into_iter()
	.filter_map(|(name, absent)| absent.then_some(name))
	.collect();

	if missing.is_empty() {
		Decision::Pass
	} else {
		Decision::Fail(format!("Commercial terms incomplete: missing {}", missing.join(", ")))
	}
}

fn margin(item: &WorkflowItem, min_percent: Decimal) -> Decision {
	let (Some(price), Some(cost)) = (item.unit_price, item.unit_cost) else {
		return Decision::Fail("Margin needs both unit price and unit cost".to_string());
	};
	match gross_margin_percent(price, cost) {
		Some(margin) if margin >= min_percent => Decision::Pass,
		Some(margin) => Decision::Fail(format!(
			"Gross margin {}% is below the required {}%",
			margin.round_dp(2),
			min_percent
		)),
		None => Decision::Fail(format!("Unit price {} must be positive", price)),
	}
}

/// Runs validation rules against the collaborators.
pub struct Validator {
	credit: Arc<dyn CreditService>,
	compliance: Arc<dyn ComplianceService>,
	quantity: Arc<dyn QuantityConstraintService>,
}

impl Validator {
	pub fn new(
		credit: Arc<dyn CreditService>,
		compliance: Arc<dyn ComplianceService>,
		quantity: Arc<dyn QuantityConstraintService>,
	) -> Self {
		Self {
			credit,
			compliance,
			quantity,
		}
	}

	/// Evaluates `rules` in order and stops at the first failure.
	pub async fn run(&self, rules: &[ValidationRule], item: &WorkflowItem) -> Result<(), WorkflowError> {
		for rule in rules {
			if let Decision::Fail(message) = self.evaluate(rule, item).await? {
				tracing::info!(
					item_id = %truncate_id(&item.id),
					rule = rule.name(),
					reason = %message,
					"Validation failed"
				);
				return Err(WorkflowError::ValidationFailed {
					code: rule.failure_code(),
					message,
				});
			}
		}
		Ok(())
	}

	async fn evaluate(&self, rule: &ValidationRule, item: &WorkflowItem) -> Result<Decision, WorkflowError> {
		let decision = match rule {
			ValidationRule::QuantityConstraint => self.quantity.check(item).await?,
			ValidationRule::CreditAvailable => {
				let Some(customer_id) = item.customer_id.as_deref() else {
					return Ok(Decision::Fail("No customer on the item".to_string()));
				};
				let Some(unit_price) = item.unit_price else {
					return Ok(Decision::Fail("No unit price to compute exposure".to_string()));
				};
				let exposure = item.quantity * unit_price;
				self.credit
					.check_credit(&item.organization_id, customer_id, exposure)
					.await?
			},
			ValidationRule::ComplianceCleared => {
				self.compliance.screen(&item.organization_id, item).await?
			},
			ValidationRule::CommercialTermsComplete => commercial_terms(item),
			ValidationRule::MarginThreshold { min_percent } => margin(item, *min_percent),
		};
		Ok(decision)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::collaborators::compliance::DenylistComplianceService;
	use crate::collaborators::credit::StaticCreditService;
	use crate::collaborators::quantity::BoundsQuantityService;
	use chrono::Utc;
	use std::collections::HashMap;
	use trade_types::ItemKind;

	fn validator() -> Validator {
		Validator::new(
			Arc::new(StaticCreditService::new(Decimal::from(1000), HashMap::new())),
			Arc::new(DenylistComplianceService::new(
				vec!["cust-banned".to_string()],
				Vec::new(),
			)),
			Arc::new(BoundsQuantityService::default()),
		)
	}

	fn item() -> WorkflowItem {
		let mut item = WorkflowItem::new(
			"ord-1",
			ItemKind::Order,
			"org-1",
			"so-1",
			"prod-1",
			Decimal::from(10),
			"u1",
			Utc::now(),
		);
		item.customer_id = Some("cust-1".into());
		item.unit_price = Some(Decimal::from(50));
		item
	}

	#[test]
	fn test_gross_margin() {
		assert_eq!(
			gross_margin_percent(Decimal::from(100), Decimal::from(80)),
			Some(Decimal::from(20))
		);
		assert_eq!(gross_margin_percent(Decimal::ZERO, Decimal::ONE), None);
	}

	#[tokio::test]
	async fn test_credit_uses_quantity_times_price() {
		let validator = validator();
		let mut item = item();
		assert!(validator
			.run(&[ValidationRule::CreditAvailable], &item)
			.await
			.is_ok());

		item.unit_price = Some(Decimal::from(101));
		let err = validator
			.run(&[ValidationRule::CreditAvailable], &item)
			.await
			.unwrap_err();
		assert_eq!(err.code(), "CREDIT_LIMIT_EXCEEDED");
	}

	#[tokio::test]
	async fn test_first_failure_wins() {
		let validator = validator();
		let mut item = item();
		item.customer_id = Some("cust-banned".into());
		let rules = [
			ValidationRule::QuantityConstraint,
			ValidationRule::ComplianceCleared,
			ValidationRule::CommercialTermsComplete,
		];
		let err = validator.run(&rules, &item).await.unwrap_err();
		assert_eq!(err.code(), "COMPLIANCE_BLOCKED");
	}

	#[tokio::test]
	async fn test_commercial_terms_and_margin() {
		let validator = validator();
		let mut item = item();
		let err = validator
			.run(&[ValidationRule::CommercialTermsComplete], &item)
			.await
			.unwrap_err();
		assert_eq!(err.code(), "COMMERCIAL_TERMS_INCOMPLETE");
		assert!(err.to_string().contains("incoterm"));

		item.unit_cost = Some(Decimal::from(45));
		let rule = ValidationRule::MarginThreshold {
			min_percent: Decimal::from(15),
		};
		let err = validator.run(&[rule.clone()], &item).await.unwrap_err();
		assert_eq!(err.code(), "MARGIN_BELOW_THRESHOLD");

		item.unit_cost = Some(Decimal::from(40));
		assert!(validator.run(&[rule], &item).await.is_ok());
	}
}
