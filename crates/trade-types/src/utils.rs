//! Small helpers shared across the tradeflow crates.

use serde_json::Value;

/// Shortens an identifier for log output.
///
/// Shows only the first 8 characters followed by ".." for longer ids.
pub fn truncate_id(id: &str) -> String {
	if id.chars().count() <= 8 {
		id.to_string()
	} else {
		let head: String = id.chars().take(8).collect();
		format!("{}..", head)
	}
}

/// Returns true when a field value counts as "not supplied".
///
/// Absent values, JSON null, blank strings and empty arrays or objects are
/// empty. Numbers and booleans never are, so a zero quantity is left for the
/// business validations to judge.
pub fn is_empty_value(value: Option<&Value>) -> bool {
	match value {
		None | Some(Value::Null) => true,
		Some(Value::String(s)) => s.trim().is_empty(),
		Some(Value::Array(items)) => items.is_empty(),
		Some(Value::Object(map)) => map.is_empty(),
		Some(Value::Bool(_)) | Some(Value::Number(_)) => false,
	}
}

/// Converts a field name to its snake_case storage form.
///
/// Clients send camelCase (`unitPrice`), catalogs use snake_case
/// (`unit_price`); both resolve to the same field.
pub fn normalize_field_name(name: &str) -> String {
	let trimmed = name.trim();
	let mut out = String::with_capacity(trimmed.len() + 4);
	for (i, ch) in trimmed.chars().enumerate() {
		if ch.is_ascii_uppercase() {
			if i > 0 && !out.ends_with('_') {
				out.push('_');
			}
			out.push(ch.to_ascii_lowercase());
		} else if ch == '-' {
			out.push('_');
		} else {
			out.push(ch);
		}
	}
	out
}
