//! Registry trait for self-registering implementations.
//!
//! Storage backends, notification senders and collaborator services each
//! expose a `Registry` type that ties the name used in configuration to a
//! factory function.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// e.g. "memory" for `storage.implementations.memory` or "webhook" for
	/// `notifications.implementations.webhook`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
