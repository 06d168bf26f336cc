//! Roles, actors and request metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Business roles used for transition authorization and notification fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
	Admin,
	Director,
	SalesManager,
	SalesExecutive,
	TechLead,
	TechEngineer,
	Procurement,
	Finance,
	QualityControl,
	Logistics,
	Accounts,
	/// Customer principal, used for quote re-acceptance.
	Customer,
}

impl Role {
	pub const ALL: &'static [Role] = &[
		Role::Admin,
		Role::Director,
		Role::SalesManager,
		Role::SalesExecutive,
		Role::TechLead,
		Role::TechEngineer,
		Role::Procurement,
		Role::Finance,
		Role::QualityControl,
		Role::Logistics,
		Role::Accounts,
		Role::Customer,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Admin => "ADMIN",
			Role::Director => "DIRECTOR",
			Role::SalesManager => "SALES_MANAGER",
			Role::SalesExecutive => "SALES_EXECUTIVE",
			Role::TechLead => "TECH_LEAD",
			Role::TechEngineer => "TECH_ENGINEER",
			Role::Procurement => "PROCUREMENT",
			Role::Finance => "FINANCE",
			Role::QualityControl => "QUALITY_CONTROL",
			Role::Logistics => "LOGISTICS",
			Role::Accounts => "ACCOUNTS",
			Role::Customer => "CUSTOMER",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let wanted = s.trim().to_ascii_uppercase();
		Role::ALL
			.iter()
			.copied()
			.find(|role| role.as_str() == wanted)
			.ok_or_else(|| format!("Unknown role: {}", s))
	}
}

/// The authenticated caller of an engine operation.
///
/// Authentication happens upstream; the engine trusts the user id, roles and
/// organization it is handed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
	pub user_id: String,
	pub roles: BTreeSet<Role>,
	pub organization_id: String,
}

impl Actor {
	pub fn new(
		user_id: impl Into<String>,
		roles: impl IntoIterator<Item = Role>,
		organization_id: impl Into<String>,
	) -> Self {
		Self {
			user_id: user_id.into(),
			roles: roles.into_iter().collect(),
			organization_id: organization_id.into(),
		}
	}

	pub fn holds(&self, role: Role) -> bool {
		self.roles.contains(&role)
	}

	/// True if at least one held role is in `allowed`.
	pub fn holds_any(&self, allowed: &BTreeSet<Role>) -> bool {
		self.roles.iter().any(|role| allowed.contains(role))
	}
}

/// Request context captured in audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ip_address: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_role_parse_is_case_insensitive() {
		assert_eq!("tech_lead".parse::<Role>().unwrap(), Role::TechLead);
		assert_eq!(" DIRECTOR ".parse::<Role>().unwrap(), Role::Director);
		assert!("janitor".parse::<Role>().is_err());
	}

	#[test]
	fn test_holds_any() {
		let actor = Actor::new("u1", [Role::SalesExecutive, Role::Finance], "org");
		let allowed: BTreeSet<Role> = [Role::Finance, Role::Director].into_iter().collect();
		assert!(actor.holds_any(&allowed));
		let other: BTreeSet<Role> = [Role::Director].into_iter().collect();
		assert!(!actor.holds_any(&other));
	}
}
