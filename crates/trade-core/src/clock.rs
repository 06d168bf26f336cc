//! Time source for the engine.
//!
//! Every timestamp the engine writes comes from a [`Clock`], so SLA arithmetic
//! can be driven deterministically in tests.

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A clock that only moves when told to.
pub struct ManualClock {
	now: ArcSwap<DateTime<Utc>>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			now: ArcSwap::from_pointee(start),
		}
	}

	pub fn set(&self, now: DateTime<Utc>) {
		self.now.store(Arc::new(now));
	}

	pub fn advance(&self, by: Duration) {
		let next = **self.now.load() + by;
		self.set(next);
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		**self.now.load()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_manual_clock_advances() {
		let start = Utc::now();
		let clock = ManualClock::new(start);
		clock.advance(Duration::hours(3));
		assert_eq!(clock.now(), start + Duration::hours(3));
		clock.set(start);
		assert_eq!(clock.now(), start);
	}
}
