//! Revision governance.
//!
//! How a change to an in-flight item is handled depends on where the item is
//! in its lifecycle. Early changes are merged directly; later ones become
//! pending revisions that a tech lead, director or the customer must approve;
//! closed or shipped items cannot change at all.
//!
//! Approval claims the revision first (a version-conditioned write on the
//! revision row), then applies the snapshot to the item. If the item write
//! fails the claim is released, so a revision is never left approved without
//! its change.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use trade_types::{
	normalize_field_name, truncate_id, Actor, AuditAction, AuditEntityType, AuditLogEntry, EntityRef,
	ItemKind, Notification, RequestMetadata, RevisionCheck, RevisionRecord, RevisionRequest,
	RevisionResult, RevisionStrategy, Severity, WorkflowItem, WorkflowState,
};

use crate::{Clock, ItemRepository, NotificationDispatcher, WorkflowError};

/// Business fields captured in every revision snapshot, besides attributes.
const SNAPSHOT_FIELDS: &[&str] = &[
	"product_id",
	"customer_id",
	"vendor_id",
	"quantity",
	"unit_price",
	"unit_cost",
	"currency",
	"incoterm",
	"payment_terms",
	"delivery_date",
	"linked_order_id",
];

/// Revision policy for an item in `state`.
///
/// Terminal states are immutable; an RFQ item that already produced an order
/// needs a new RFQ; everything else follows the per-state matrix.
pub fn strategy_for(kind: ItemKind, state: WorkflowState, has_linked_order: bool) -> RevisionStrategy {
	use RevisionStrategy as R;
	use WorkflowState as S;

	if state.is_terminal() || !kind.accepts(state) {
		return R::Immutable;
	}
	if kind == ItemKind::Rfq && has_linked_order {
		return R::NewRfq;
	}
	match state {
		S::Draft | S::RfqSubmitted | S::TechReview | S::TechRejected => R::DirectOverwrite,
		S::TechApproved | S::Sourcing | S::Pricing | S::MarginApproval => R::NewRevisionTech,
		S::PriceFrozen => R::NewRevisionDirector,
		S::QuoteSent | S::CustomerAccepted => R::CustomerReaccept,
		S::PrCreated | S::CreditCheck | S::CreditHold => R::DirectOverwrite,
		S::PoReleased
		| S::VendorConfirmed
		| S::QcPending
		| S::QcRejected
		| S::QcApproved
		| S::ReadyToDispatch => R::NewRevisionDirector,
		S::Dispatched | S::Delivered | S::Invoiced => R::Immutable,
		S::RfqClosed | S::OrderClosed | S::ForceClosed => R::Immutable,
	}
}

fn item_strategy(item: &WorkflowItem) -> RevisionStrategy {
	strategy_for(item.kind, item.state, item.has_linked_order())
}

fn snapshot(item: &WorkflowItem, changes: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
	let mut snapshot: BTreeMap<String, Value> = SNAPSHOT_FIELDS
		.iter()
		.map(|field| (field.to_string(), item.field_value(field).unwrap_or(Value::Null)))
		.collect();
	snapshot.extend(item.attributes.clone());
	snapshot.extend(changes.clone());
	snapshot
}

/// An approved revision together with the item it was applied to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionDecision {
	pub revision: RevisionRecord,
	pub item: WorkflowItem,
}

pub struct RevisionGovernor {
	repository: Arc<ItemRepository>,
	dispatcher: NotificationDispatcher,
	clock: Arc<dyn Clock>,
}

impl RevisionGovernor {
	pub fn new(
		repository: Arc<ItemRepository>,
		dispatcher: NotificationDispatcher,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			repository,
			dispatcher,
			clock,
		}
	}

	/// Revision policy for a visible item. Reads only.
	pub async fn check_revision_allowed(
		&self,
		kind: ItemKind,
		header_id: &str,
		item_id: &str,
		actor: &Actor,
	) -> Result<RevisionCheck, WorkflowError> {
		let item = self
			.repository
			.load_visible(kind, header_id, item_id, actor)
			.await?;
		Ok(RevisionCheck::from(item_strategy(&item)))
	}

	/// Requests a change to an item.
	///
	/// A disallowed change returns `allowed: false` and writes nothing. When no
	/// approval is needed the change is merged straight away and recorded as an
	/// approved revision; otherwise a pending revision is stored and the
	/// approving role is notified.
	#[instrument(skip_all, fields(kind = %request.kind, item_id = %truncate_id(&request.item_id)))]
	pub async fn create_revision(
		&self,
		request: RevisionRequest,
		actor: &Actor,
		metadata: &RequestMetadata,
	) -> Result<RevisionResult, WorkflowError> {
		let item = self
			.repository
			.load_visible(request.kind, &request.header_id, &request.item_id, actor)
			.await?;
		let strategy = item_strategy(&item);
		if !strategy.is_allowed() {
			return Ok(RevisionResult {
				allowed: false,
				requires_approval: false,
				revision_strategy: strategy,
				revision_id: None,
				revision_number: None,
				applied: false,
				message: strategy.message().to_string(),
			});
		}

		if request.changes.is_empty() {
			return Err(WorkflowError::InvalidRequest("a revision needs at least one change".into()));
		}
		let reason = request.reason.trim();
		if reason.is_empty() {
			return Err(WorkflowError::ReasonRequired);
		}

		// Field names are normalized and every value is checked on a scratch copy.
		let mut scratch = item.clone();
		let mut changes = BTreeMap::new();
		for (name, value) in &request.changes {
			let field = normalize_field_name(name);
			scratch.set_field(&field, value.clone())?;
			changes.insert(field, value.clone());
		}

		let now = self.clock.now();
		let mut revision = RevisionRecord {
			id: uuid::Uuid::new_v4().to_string(),
			item_id: item.id.clone(),
			item_kind: item.kind,
			header_id: item.header_id.clone(),
			organization_id: item.organization_id.clone(),
			revision_number: 0,
			strategy,
			snapshot: snapshot(&item, &changes),
			proposed_changes: changes,
			revision_reason: reason.to_string(),
			requested_by: actor.user_id.clone(),
			created_at: now,
			approved_by: None,
			approved_at: None,
			rejected_by: None,
			rejection_reason: None,
			is_deleted: false,
			deleted_at: None,
			version: 1,
		};

		let Some(approval_role) = strategy.approval_role() else {
			let previous: BTreeMap<String, Value> = revision
				.proposed_changes
				.keys()
				.map(|field| (field.clone(), item.field_value(field).unwrap_or(Value::Null)))
				.collect();
			// The number is claimed only once the change is on the item, so a
			// write lost to a concurrent change never consumes one.
			let updated = self
				.repository
				.update_item(&item, |row| {
					for (field, value) in &revision.proposed_changes {
						row.set_field(field, value.clone())?;
					}
					row.updated_at = now;
					Ok(())
				})
				.await?;

			revision.approved_by = Some(actor.user_id.clone());
			revision.approved_at = Some(now);
			if let Err(e) = self.number_and_store(&item, &mut revision).await {
				self.restore_fields(&updated, &previous).await;
				return Err(e);
			}

			let audit = AuditLogEntry::new(
				uuid::Uuid::new_v4().to_string(),
				item.kind.entity_type(),
				&item.id,
				AuditAction::RevisionAutoApplied,
				actor,
				metadata,
				now,
			)
			.with_values(
				json!({ "fields": previous, "version": item.version }),
				json!({
					"revisionId": revision.id,
					"revisionNumber": revision.revision_number,
					"fields": revision.proposed_changes,
					"version": updated.version,
				}),
			)
			.with_reason(Some(revision.revision_reason.clone()));
			self.repository.append_audit(&audit).await?;

			tracing::info!(revision = revision.revision_number, "Revision applied directly");
			return Ok(RevisionResult {
				allowed: true,
				requires_approval: false,
				revision_strategy: strategy,
				revision_id: Some(revision.id),
				revision_number: Some(revision.revision_number),
				applied: true,
				message: strategy.message().to_string(),
			});
		};

		self.number_and_store(&item, &mut revision).await?;
		let audit = AuditLogEntry::new(
			uuid::Uuid::new_v4().to_string(),
			AuditEntityType::Revision,
			&revision.id,
			AuditAction::RevisionCreated,
			actor,
			metadata,
			now,
		)
		.with_values(
			Value::Null,
			json!({
				"itemId": item.id,
				"itemKind": item.kind,
				"revisionNumber": revision.revision_number,
				"strategy": strategy,
				"changes": revision.proposed_changes,
			}),
		)
		.with_reason(Some(revision.revision_reason.clone()));
		self.repository.append_audit(&audit).await?;

		tracing::info!(
			revision = revision.revision_number,
			strategy = %strategy,
			approver = %approval_role,
			"Revision awaiting approval"
		);
		self.dispatcher.dispatch(vec![Notification {
			id: uuid::Uuid::new_v4().to_string(),
			organization_id: item.organization_id.clone(),
			severity: Severity::Info,
			target_roles: vec![approval_role],
			title: format!("Revision {} awaiting approval", revision.revision_number),
			message: format!(
				"{} {} revision {} requested by {}: {}",
				item.kind, item.id, revision.revision_number, actor.user_id, revision.revision_reason
			),
			entity_ref: EntityRef {
				kind: item.kind,
				id: item.id.clone(),
			},
			created_at: now,
		}]);

		Ok(RevisionResult {
			allowed: true,
			requires_approval: true,
			revision_strategy: strategy,
			revision_id: Some(revision.id),
			revision_number: Some(revision.revision_number),
			applied: false,
			message: strategy.message().to_string(),
		})
	}

	/// Claims the next revision number and stores the record. The number is
	/// given back when the record cannot be written.
	async fn number_and_store(
		&self,
		item: &WorkflowItem,
		revision: &mut RevisionRecord,
	) -> Result<(), WorkflowError> {
		revision.revision_number = self
			.repository
			.claim_revision_number(item, &revision.id)
			.await?;
		if let Err(e) = self.repository.insert_revision(revision).await {
			if let Err(release_error) = self
				.repository
				.release_revision_number(item, revision.revision_number)
				.await
			{
				tracing::error!(
					error = %release_error,
					revision = revision.revision_number,
					"Failed to release revision number"
				);
			}
			return Err(e);
		}
		Ok(())
	}

	/// Puts back the field values a directly applied change replaced.
	async fn restore_fields(&self, updated: &WorkflowItem, previous: &BTreeMap<String, Value>) {
		let restored = self
			.repository
			.update_item(updated, |row| {
				for (field, value) in previous {
					row.set_field(field, value.clone())?;
				}
				Ok(())
			})
			.await;
		if let Err(e) = restored {
			tracing::error!(
				error = %e,
				item_id = %truncate_id(&updated.id),
				"Failed to restore item after its revision could not be recorded"
			);
		}
	}

	async fn load_revision(
		&self,
		revision_id: &str,
		actor: &Actor,
	) -> Result<RevisionRecord, WorkflowError> {
		match self.repository.find_revision(revision_id).await? {
			Some(revision)
				if !revision.is_deleted && revision.organization_id == actor.organization_id =>
			{
				Ok(revision)
			},
			_ => Err(WorkflowError::RevisionNotFound(revision_id.to_string())),
		}
	}

	/// Shared gate for approve and reject: the revision must be pending, the
	/// item must still accept revisions and the actor must hold the approving
	/// role.
	async fn authorize_decision(
		&self,
		revision_id: &str,
		actor: &Actor,
	) -> Result<(RevisionRecord, WorkflowItem), WorkflowError> {
		let revision = self.load_revision(revision_id, actor).await?;
		if revision.is_approved() {
			return Err(WorkflowError::RevisionAlreadyProcessed(revision_id.to_string()));
		}
		let item = self
			.repository
			.load_visible(revision.item_kind, &revision.header_id, &revision.item_id, actor)
			.await?;

		let strategy = item_strategy(&item);
		if !strategy.is_allowed() {
			return Err(WorkflowError::RevisionNotAllowed(strategy.message().to_string()));
		}
		// An item that moved back to a direct-overwrite state still needs the
		// role the revision was raised for.
		if let Some(role) = strategy.approval_role().or(revision.strategy.approval_role()) {
			if !actor.holds(role) {
				return Err(WorkflowError::Unauthorized(format!(
					"deciding this revision requires the {} role",
					role
				)));
			}
		}
		Ok((revision, item))
	}

	/// Approves a pending revision and applies its snapshot to the item.
	#[instrument(skip_all, fields(revision_id = %truncate_id(revision_id)))]
	pub async fn approve_revision(
		&self,
		revision_id: &str,
		actor: &Actor,
		metadata: &RequestMetadata,
	) -> Result<RevisionDecision, WorkflowError> {
		let (revision, item) = self.authorize_decision(revision_id, actor).await?;
		let now = self.clock.now();

		let claimed = self
			.repository
			.update_revision(revision_id, revision.version, |row| {
				if !row.is_pending() {
					return Err(WorkflowError::RevisionAlreadyProcessed(row.id.clone()));
				}
				row.approved_by = Some(actor.user_id.clone());
				row.approved_at = Some(now);
				Ok(())
			})
			.await
			.map_err(|e| match e {
				WorkflowError::VersionConflict(_) => {
					WorkflowError::RevisionAlreadyProcessed(revision_id.to_string())
				},
				other => other,
			})?;

		let applied = self
			.repository
			.update_item(&item, |row| {
				for field in claimed.proposed_changes.keys() {
					let value = claimed.snapshot.get(field).cloned().unwrap_or(Value::Null);
					row.set_field(field, value)?;
				}
				row.updated_at = now;
				Ok(())
			})
			.await;

		let updated = match applied {
			Ok(updated) => updated,
			Err(e) => {
				let released = self
					.repository
					.update_revision(revision_id, claimed.version, |row| {
						row.approved_by = None;
						row.approved_at = None;
						Ok(())
					})
					.await;
				if let Err(release_error) = released {
					tracing::error!(
						error = %release_error,
						"Failed to release revision claim after item update failed"
					);
				}
				return Err(e);
			},
		};

		let audit = AuditLogEntry::new(
			uuid::Uuid::new_v4().to_string(),
			AuditEntityType::Revision,
			&claimed.id,
			AuditAction::RevisionApproved,
			actor,
			metadata,
			now,
		)
		.with_values(
			json!({ "itemVersion": item.version }),
			json!({
				"itemId": updated.id,
				"itemKind": updated.kind,
				"revisionNumber": claimed.revision_number,
				"fields": claimed.proposed_changes,
				"itemVersion": updated.version,
			}),
		);
		self.repository.append_audit(&audit).await?;

		tracing::info!(
			item_id = %truncate_id(&updated.id),
			revision = claimed.revision_number,
			"Revision approved"
		);
		Ok(RevisionDecision {
			revision: claimed,
			item: updated,
		})
	}

	/// Rejects a pending revision. The item is not touched and the revision is
	/// soft-deleted.
	#[instrument(skip_all, fields(revision_id = %truncate_id(revision_id)))]
	pub async fn reject_revision(
		&self,
		revision_id: &str,
		actor: &Actor,
		reason: &str,
		metadata: &RequestMetadata,
	) -> Result<RevisionRecord, WorkflowError> {
		let (revision, _item) = self.authorize_decision(revision_id, actor).await?;
		let reason = reason.trim();
		if reason.is_empty() {
			return Err(WorkflowError::ReasonRequired);
		}
		let now = self.clock.now();

		let rejected = self
			.repository
			.update_revision(revision_id, revision.version, |row| {
				if !row.is_pending() {
					return Err(WorkflowError::RevisionAlreadyProcessed(row.id.clone()));
				}
				row.rejected_by = Some(actor.user_id.clone());
				row.rejection_reason = Some(reason.to_string());
				row.is_deleted = true;
				row.deleted_at = Some(now);
				Ok(())
			})
			.await
			.map_err(|e| match e {
				WorkflowError::VersionConflict(_) => {
					WorkflowError::RevisionAlreadyProcessed(revision_id.to_string())
				},
				other => other,
			})?;

		let audit = AuditLogEntry::new(
			uuid::Uuid::new_v4().to_string(),
			AuditEntityType::Revision,
			&rejected.id,
			AuditAction::RevisionRejected,
			actor,
			metadata,
			now,
		)
		.with_values(
			Value::Null,
			json!({
				"itemId": rejected.item_id,
				"itemKind": rejected.item_kind,
				"revisionNumber": rejected.revision_number,
			}),
		)
		.with_reason(Some(reason.to_string()));
		self.repository.append_audit(&audit).await?;

		tracing::info!(revision = rejected.revision_number, "Revision rejected");
		Ok(rejected)
	}

	/// Live revisions of an item, by revision number.
	pub async fn list_revisions(
		&self,
		kind: ItemKind,
		header_id: &str,
		item_id: &str,
		actor: &Actor,
	) -> Result<Vec<RevisionRecord>, WorkflowError> {
		self.repository
			.load_visible(kind, header_id, item_id, actor)
			.await?;
		let mut revisions: Vec<RevisionRecord> = self
			.repository
			.list_revisions()
			.await?
			.into_iter()
			.filter(|r| {
				r.item_id == item_id
					&& r.item_kind == kind
					&& r.organization_id == actor.organization_id
					&& !r.is_deleted
			})
			.collect();
		revisions.sort_by_key(|r| r.revision_number);
		Ok(revisions)
	}

	/// Revisions waiting for a decision in an organization, oldest first.
	pub async fn pending_revisions(
		&self,
		organization_id: &str,
	) -> Result<Vec<RevisionRecord>, WorkflowError> {
		let mut pending: Vec<RevisionRecord> = self
			.repository
			.list_revisions()
			.await?
			.into_iter()
			.filter(|r| r.organization_id == organization_id && r.is_pending())
			.collect();
		pending.sort_by(|a, b| {
			a.created_at
				.cmp(&b.created_at)
				.then(a.revision_number.cmp(&b.revision_number))
		});
		Ok(pending)
	}
}
