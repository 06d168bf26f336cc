//! Shared fixtures for engine tests.
//!
//! A [`Harness`] wires a full engine over memory storage with a manual clock.
//! Every item lives under header `hdr-1` of organization `org-1`.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use trade_config::builders::ConfigBuilder;
use trade_types::{
	Actor, CreateItemRequest, ItemKind, RequestMetadata, Role, TransitionRequest, WorkflowItem,
};

use crate::{EngineBuilder, ManualClock, TradeEngine, TradeFactories, TransitionOutcome, WorkflowError};

pub const ORG: &str = "org-1";
pub const HEADER: &str = "hdr-1";

pub fn actor(user_id: &str, roles: impl IntoIterator<Item = Role>) -> Actor {
	Actor::new(user_id, roles, ORG)
}

pub struct Harness {
	pub engine: TradeEngine,
	pub clock: Arc<ManualClock>,
	pub sales: Actor,
	pub admin: Actor,
}

impl Harness {
	pub async fn new() -> Self {
		let clock = Arc::new(ManualClock::new(
			Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap(),
		));
		let engine = EngineBuilder::new(ConfigBuilder::new().build())
			.with_clock(clock.clone())
			.build(&TradeFactories::from_registries())
			.await
			.unwrap();
		Self {
			engine,
			clock,
			sales: actor("sales-1", [Role::SalesExecutive]),
			admin: actor("admin-1", [Role::Admin]),
		}
	}

	fn request(kind: ItemKind, id: &str) -> CreateItemRequest {
		let mut request = CreateItemRequest {
			id: Some(id.to_string()),
			product_id: "prod-1".into(),
			quantity: Decimal::from(10),
			customer_id: Some("cust-1".into()),
			vendor_id: Some("vend-1".into()),
			unit_price: Some(Decimal::from(100)),
			unit_cost: Some(Decimal::from(80)),
			currency: Some("USD".into()),
			incoterm: Some("FOB".into()),
			payment_terms: Some("NET30".into()),
			delivery_date: NaiveDate::from_ymd_opt(2025, 6, 30),
			..Default::default()
		};
		if kind == ItemKind::Order {
			request
				.attributes
				.insert("qc_inspector_id".into(), json!("inspector-1"));
		}
		request
	}

	pub async fn try_create(
		&self,
		kind: ItemKind,
		id: &str,
		customize: impl FnOnce(&mut CreateItemRequest),
	) -> Result<WorkflowItem, WorkflowError> {
		let mut request = Self::request(kind, id);
		customize(&mut request);
		self.engine
			.transitions()
			.create_item(kind, HEADER, request, &self.sales, &RequestMetadata::default())
			.await
	}

	pub async fn create(
		&self,
		kind: ItemKind,
		id: &str,
		customize: impl FnOnce(&mut CreateItemRequest),
	) -> WorkflowItem {
		self.try_create(kind, id, customize).await.unwrap()
	}

	pub async fn rfq_item(&self, id: &str) -> WorkflowItem {
		self.create(ItemKind::Rfq, id, |_| {}).await
	}

	pub async fn order_item(&self, id: &str) -> WorkflowItem {
		self.create(ItemKind::Order, id, |_| {}).await
	}

	/// Raw stored row, deleted or not.
	pub async fn get(&self, kind: ItemKind, id: &str) -> WorkflowItem {
		self.engine
			.repository()
			.find_item(kind, ORG, id)
			.await
			.unwrap()
			.unwrap()
	}

	async fn fire(
		&self,
		kind: ItemKind,
		id: &str,
		request: TransitionRequest,
		actor: &Actor,
	) -> Result<TransitionOutcome, WorkflowError> {
		// Keeps timestamps strictly increasing across steps.
		self.clock.advance(Duration::minutes(1));
		self.engine
			.transitions()
			.execute_transition(kind, HEADER, id, request, actor, &RequestMetadata::default())
			.await
	}

	pub async fn transition(
		&self,
		kind: ItemKind,
		id: &str,
		to_state: &str,
		actor: &Actor,
	) -> Result<TransitionOutcome, WorkflowError> {
		self.fire(kind, id, TransitionRequest::to(to_state), actor)
			.await
	}

	pub async fn transition_with_reason(
		&self,
		kind: ItemKind,
		id: &str,
		to_state: &str,
		actor: &Actor,
		reason: &str,
	) -> Result<TransitionOutcome, WorkflowError> {
		self.fire(kind, id, TransitionRequest::to(to_state).with_reason(reason), actor)
			.await
	}

	pub async fn drive_rfq_to_pricing(&self, id: &str) {
		let tech = actor("tech-1", [Role::TechLead]);
		let procurement = actor("proc-1", [Role::Procurement]);
		let steps = [
			("RFQ_SUBMITTED", &self.sales),
			("TECH_REVIEW", &tech),
			("TECH_APPROVED", &tech),
			("SOURCING", &procurement),
			("PRICING", &procurement),
		];
		for (to_state, by) in steps {
			self.transition(ItemKind::Rfq, id, to_state, by)
				.await
				.unwrap();
		}
	}

	pub async fn drive_rfq_to_price_frozen(&self, id: &str) {
		self.drive_rfq_to_pricing(id).await;
		self.transition(
			ItemKind::Rfq,
			id,
			"PRICE_FROZEN",
			&actor("sm-1", [Role::SalesManager]),
		)
		.await
		.unwrap();
	}
}
