//! Common types module for the tradeflow system.
//!
//! This module defines the core data types shared by the state engine, the
//! storage and notification backends, and the HTTP service. Keeping them in one
//! crate lets every component agree on item states, roles and record shapes.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Append-only audit records.
pub mod audit;
/// Workflow items, item kinds and the state enumeration.
pub mod item;
/// Notification payloads produced by side effects and SLA escalation.
pub mod notification;
/// Implementation registry trait for pluggable backends.
pub mod registry;
/// Related documents created by side effects.
pub mod record;
/// Revision governance records and policy outcomes.
pub mod revision;
/// Roles, actors and request metadata.
pub mod role;
/// SLA status and sweep summaries.
pub mod sla;
/// Storage namespaces and versioning.
pub mod storage;
/// Transition descriptors, validation rules and side effects.
pub mod transition;
/// Utility functions shared across crates.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use api::*;
pub use audit::*;
pub use item::*;
pub use notification::*;
pub use record::RelatedRecord;
pub use registry::ImplementationRegistry;
pub use revision::*;
pub use role::*;
pub use sla::*;
pub use storage::*;
pub use transition::*;
pub use utils::{is_empty_value, normalize_field_name, truncate_id};
pub use validation::*;
