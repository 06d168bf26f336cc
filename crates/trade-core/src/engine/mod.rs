//! Transition engine.
//!
//! Executes state transitions for RFQ and order items. A transition is
//! checked against the catalog, the caller's roles, required fields and the
//! business validations before a single version-conditioned write moves the
//! item. Related records and the audit entry follow the write; notifications
//! are handed over last.

pub mod effects;
pub mod validation;

use arc_swap::ArcSwap;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;
use trade_types::{
	is_empty_value, truncate_id, Actor, AuditAction, AuditLogEntry, CreateItemRequest, ItemKind,
	RelatedRecord, RequestMetadata, Role, TransitionDescriptor, TransitionRequest, WorkflowItem,
};

use crate::catalog::TransitionCatalog;
use crate::sla::{calculate_sla_duration, sla_due_at};
use crate::{Clock, ItemRepository, NotificationDispatcher, WorkflowError};

use self::effects::{plan_side_effects, related_record};
use self::validation::Validator;

/// Roles allowed to soft-delete items.
const DELETE_ROLES: &[Role] = &[Role::Admin, Role::Director, Role::SalesManager];

/// Result of a successful transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
	pub item: WorkflowItem,
	pub audit_log_id: String,
}

pub struct TransitionEngine {
	catalog: Arc<ArcSwap<TransitionCatalog>>,
	repository: Arc<ItemRepository>,
	validator: Validator,
	dispatcher: NotificationDispatcher,
	clock: Arc<dyn Clock>,
}

impl TransitionEngine {
	pub fn new(
		catalog: Arc<ArcSwap<TransitionCatalog>>,
		repository: Arc<ItemRepository>,
		validator: Validator,
		dispatcher: NotificationDispatcher,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			catalog,
			repository,
			validator,
			dispatcher,
			clock,
		}
	}

	/// Moves an item to `request.to_state`.
	///
	/// Checks run in a fixed order and the first failure is reported: item
	/// visibility, terminal state, catalog edge, role, reason, required fields,
	/// validations, side-effect planning and finally the client's expected
	/// version. A stale version at write time fails with `VERSION_CONFLICT`
	/// and is not retried.
	#[instrument(skip_all, fields(kind = %kind, item_id = %truncate_id(item_id), to = %request.to_state))]
	pub async fn execute_transition(
		&self,
		kind: ItemKind,
		header_id: &str,
		item_id: &str,
		request: TransitionRequest,
		actor: &Actor,
		metadata: &RequestMetadata,
	) -> Result<TransitionOutcome, WorkflowError> {
		let item = self
			.repository
			.load_visible(kind, header_id, item_id, actor)
			.await?;
		if item.is_terminal() {
			return Err(WorkflowError::ItemClosed {
				item_id: item.id,
				state: item.state.to_string(),
			});
		}

		let to_state = kind
			.parse_state(request.to_state.trim())
			.map_err(|e| WorkflowError::InvalidTransition(e.to_string()))?;
		let catalog = self.catalog.load_full();
		let descriptor = catalog
			.descriptor(kind, item.state, to_state)
			.ok_or_else(|| {
				WorkflowError::InvalidTransition(format!("{} -> {}", item.state, to_state))
			})?;

		if !actor.holds_any(&descriptor.allowed_roles) {
			return Err(WorkflowError::UnauthorizedTransition {
				from: item.state.to_string(),
				to: to_state.to_string(),
			});
		}
		let reason = request
			.reason
			.as_deref()
			.map(str::trim)
			.filter(|r| !r.is_empty());
		if descriptor.requires_reason && reason.is_none() {
			return Err(WorkflowError::ReasonRequired);
		}
		if let Some(field) = descriptor
			.required_fields
			.iter()
			.find(|field| is_empty_value(item.field_value(field).as_ref()))
		{
			return Err(WorkflowError::RequiredFieldMissing(field.clone()));
		}

		self.validator.run(&descriptor.validations, &item).await?;

		let now = self.clock.now();
		let plan = plan_side_effects(&descriptor.side_effects, &item, to_state, actor, now)?;

		if let Some(expected) = request.expected_version {
			if expected != item.version {
				return Err(WorkflowError::VersionConflict(format!(
					"expected version {}, item is at {}",
					expected, item.version
				)));
			}
		}

		let from_state = item.state;
		let sla_hours = plan
			.sla_override_hours
			.unwrap_or_else(|| calculate_sla_duration(kind, to_state));
		let owner_id = plan
			.owner_override
			.clone()
			.unwrap_or_else(|| actor.user_id.clone());

		let updated = self
			.repository
			.update_item(&item, |row| {
				for (field, value) in &plan.field_updates {
					row.set_field(field, value.clone())?;
				}
				row.state = to_state;
				row.state_entered_at = now;
				row.owner_id = owner_id.clone();
				row.sla_due_at = sla_due_at(now, sla_hours);
				row.sla_warning = false;
				row.sla_breached = false;
				row.updated_at = now;
				Ok(())
			})
			.await?;

		for record_type in &plan.record_types {
			let record = related_record(*record_type, &updated, actor, now);
			self.repository.insert_related_record(&record).await?;
		}

		let audit = AuditLogEntry::new(
			uuid::Uuid::new_v4().to_string(),
			kind.entity_type(),
			&updated.id,
			AuditAction::StateTransition,
			actor,
			metadata,
			now,
		)
		.with_values(
			json!({
				"state": from_state,
				"version": item.version,
				"ownerId": item.owner_id,
			}),
			json!({
				"state": to_state,
				"version": updated.version,
				"ownerId": updated.owner_id,
				"fieldUpdates": plan.field_updates,
				"slaDueAt": updated.sla_due_at,
			}),
		)
		.with_reason(request.reason)
		.with_notes(request.notes);
		self.repository.append_audit(&audit).await?;

		tracing::info!(
			from = %from_state,
			to = %to_state,
			version = updated.version,
			actor = %actor.user_id,
			"Transition applied"
		);
		self.dispatcher.dispatch(plan.notifications);

		Ok(TransitionOutcome {
			item: updated,
			audit_log_id: audit.id,
		})
	}

	/// Edges the caller could fire from the item's current state.
	pub async fn available_transitions(
		&self,
		kind: ItemKind,
		header_id: &str,
		item_id: &str,
		actor: &Actor,
	) -> Result<Vec<TransitionDescriptor>, WorkflowError> {
		let item = self
			.repository
			.load_visible(kind, header_id, item_id, actor)
			.await?;
		if item.is_terminal() {
			return Ok(Vec::new());
		}
		let catalog = self.catalog.load();
		Ok(catalog
			.transitions_from(kind, item.state)
			.into_iter()
			.filter(|descriptor| actor.holds_any(&descriptor.allowed_roles))
			.cloned()
			.collect())
	}

	/// Creates an item in its kind's initial state with the SLA clock running.
	#[instrument(skip_all, fields(kind = %kind, header_id = %truncate_id(header_id)))]
	pub async fn create_item(
		&self,
		kind: ItemKind,
		header_id: &str,
		request: CreateItemRequest,
		actor: &Actor,
		metadata: &RequestMetadata,
	) -> Result<WorkflowItem, WorkflowError> {
		if header_id.trim().is_empty() {
			return Err(WorkflowError::InvalidRequest("header id is required".into()));
		}
		if request.product_id.trim().is_empty() {
			return Err(WorkflowError::InvalidRequest("productId is required".into()));
		}
		if request.quantity <= rust_decimal::Decimal::ZERO {
			return Err(WorkflowError::InvalidRequest(format!(
				"quantity must be positive, got {}",
				request.quantity
			)));
		}
		if kind == ItemKind::Order && request.linked_order_id.is_some() {
			return Err(WorkflowError::InvalidRequest(
				"linkedOrderId only applies to RFQ items".into(),
			));
		}

		let now = self.clock.now();
		let id = request
			.id
			.filter(|id| !id.trim().is_empty())
			.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
		let owner_id = request
			.owner_id
			.filter(|owner| !owner.trim().is_empty())
			.unwrap_or_else(|| actor.user_id.clone());

		let mut item = WorkflowItem::new(
			id,
			kind,
			&actor.organization_id,
			header_id,
			request.product_id,
			request.quantity,
			owner_id,
			now,
		);
		item.customer_id = request.customer_id;
		item.vendor_id = request.vendor_id;
		item.unit_price = request.unit_price;
		item.unit_cost = request.unit_cost;
		item.currency = request.currency;
		item.incoterm = request.incoterm;
		item.payment_terms = request.payment_terms;
		item.delivery_date = request.delivery_date;
		item.linked_order_id = request.linked_order_id;
		for (field, value) in request.attributes {
			item.set_field(&field, value)?;
		}
		item.sla_due_at = sla_due_at(now, calculate_sla_duration(kind, item.state));

		self.repository.insert_item(&item).await?;

		let audit = AuditLogEntry::new(
			uuid::Uuid::new_v4().to_string(),
			kind.entity_type(),
			&item.id,
			AuditAction::ItemCreated,
			actor,
			metadata,
			now,
		)
		.with_values(
			serde_json::Value::Null,
			serde_json::to_value(&item).map_err(|e| WorkflowError::Storage(e.to_string()))?,
		);
		self.repository.append_audit(&audit).await?;

		tracing::info!(item_id = %truncate_id(&item.id), state = %item.state, "Item created");
		Ok(item)
	}

	pub async fn get_item(
		&self,
		kind: ItemKind,
		header_id: &str,
		item_id: &str,
		actor: &Actor,
	) -> Result<WorkflowItem, WorkflowError> {
		self.repository
			.load_visible(kind, header_id, item_id, actor)
			.await
	}

	/// Soft-deletes an item. Allowed in any state, terminal ones included;
	/// only the deletion metadata and the version change.
	#[instrument(skip_all, fields(kind = %kind, item_id = %truncate_id(item_id)))]
	pub async fn soft_delete_item(
		&self,
		kind: ItemKind,
		header_id: &str,
		item_id: &str,
		actor: &Actor,
		metadata: &RequestMetadata,
	) -> Result<WorkflowItem, WorkflowError> {
		if !DELETE_ROLES.iter().any(|role| actor.holds(*role)) {
			return Err(WorkflowError::Unauthorized(
				"deleting items requires ADMIN, DIRECTOR or SALES_MANAGER".into(),
			));
		}
		let item = self
			.repository
			.load_visible(kind, header_id, item_id, actor)
			.await?;

		let now = self.clock.now();
		let deleted = self
			.repository
			.update_item(&item, |row| {
				row.is_deleted = true;
				row.deleted_at = Some(now);
				row.deleted_by = Some(actor.user_id.clone());
				Ok(())
			})
			.await?;

		let audit = AuditLogEntry::new(
			uuid::Uuid::new_v4().to_string(),
			kind.entity_type(),
			&deleted.id,
			AuditAction::ItemDeleted,
			actor,
			metadata,
			now,
		)
		.with_values(
			json!({ "isDeleted": false, "version": item.version }),
			json!({ "isDeleted": true, "version": deleted.version }),
		);
		self.repository.append_audit(&audit).await?;

		tracing::info!(state = %deleted.state, "Item soft-deleted");
		Ok(deleted)
	}

	/// Audit trail of a visible item, oldest first.
	pub async fn list_audit_entries(
		&self,
		kind: ItemKind,
		header_id: &str,
		item_id: &str,
		actor: &Actor,
	) -> Result<Vec<AuditLogEntry>, WorkflowError> {
		let item = self
			.repository
			.load_visible(kind, header_id, item_id, actor)
			.await?;
		self.repository.audit_trail(&item).await
	}

	pub async fn related_records(
		&self,
		kind: ItemKind,
		header_id: &str,
		item_id: &str,
		actor: &Actor,
	) -> Result<Vec<RelatedRecord>, WorkflowError> {
		let item = self
			.repository
			.load_visible(kind, header_id, item_id, actor)
			.await?;
		self.repository.related_records(&item).await
	}

	/// Replaces the catalog. In-flight transitions finish against the catalog
	/// they started with.
	pub fn reload_catalog(&self, catalog: TransitionCatalog) {
		tracing::info!(version = %catalog.version(), "Transition catalog replaced");
		self.catalog.store(Arc::new(catalog));
	}

	pub fn catalog_version(&self) -> String {
		self.catalog.load().version().to_string()
	}
}
