//! Configuration schema validation.
//!
//! Implementation tables in the TOML configuration (storage backends,
//! notification senders, collaborator services) are free-form. Each
//! implementation describes the keys it understands with a [`Schema`] and the
//! loader checks the table before the factory runs.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

impl ValidationError {
	/// Prefixes the field path with `parent`, used when descending into tables.
	fn nested_under(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => {
				ValidationError::MissingField(format!("{}.{}", parent, f))
			},
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
			other => other,
		}
	}
}

/// The expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// An integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	/// A float or integer with optional inclusive bounds.
	Number { min: Option<f64>, max: Option<f64> },
	Boolean,
	/// A string restricted to the listed values.
	OneOf(&'static [&'static str]),
	Array(Box<FieldType>),
	Table(Schema),
}

/// Custom check run after the type check passes.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator to this field.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		validate_field_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of one TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML table against this schema.
	///
	/// Required fields must be present; optional fields are checked only when
	/// present. Unknown keys are ignored.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| mismatch("root", "table", config))?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn mismatch(field: &str, expected: &str, actual: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: actual.type_str().to_string(),
	}
}

fn out_of_range<T: std::fmt::Display>(field: &str, value: T, min: Option<T>, max: Option<T>) -> ValidationError
where
	T: PartialOrd + Copy,
{
	let message = match (min, max) {
		(Some(min), _) if value < min => format!("Value {} is less than minimum {}", value, min),
		(_, Some(max)) => format!("Value {} is greater than maximum {}", value, max),
		_ => format!("Value {} is out of range", value),
	};
	ValidationError::InvalidValue {
		field: field.to_string(),
		message,
	}
}

fn validate_field_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String => {
			if !value.is_str() {
				return Err(mismatch(field_name, "string", value));
			}
		},
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| mismatch(field_name, "integer", value))?;
			if min.is_some_and(|m| int_val < m) || max.is_some_and(|m| int_val > m) {
				return Err(out_of_range(field_name, int_val, *min, *max));
			}
		},
		FieldType::Number { min, max } => {
			let num = value
				.as_float()
				.or_else(|| value.as_integer().map(|i| i as f64))
				.ok_or_else(|| mismatch(field_name, "number", value))?;
			if min.is_some_and(|m| num < m) || max.is_some_and(|m| num > m) {
				return Err(out_of_range(field_name, num, *min, *max));
			}
		},
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(mismatch(field_name, "boolean", value));
			}
		},
		FieldType::OneOf(allowed) => {
			let text = value
				.as_str()
				.ok_or_else(|| mismatch(field_name, "string", value))?;
			if !allowed.contains(&text) {
				return Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: format!("'{}' is not one of {}", text, allowed.join(", ")),
				});
			}
		},
		FieldType::Array(inner_type) => {
			let array = value
				.as_array()
				.ok_or_else(|| mismatch(field_name, "array", value))?;
			for (i, item) in array.iter().enumerate() {
				validate_field_type(&format!("{}[{}]", field_name, i), item, inner_type)?;
			}
		},
		FieldType::Table(schema) => {
			schema
				.validate(value)
				.map_err(|e| e.nested_under(field_name))?;
		},
	}

	Ok(())
}

/// A configuration schema that can validate a TOML table.
///
/// Every pluggable implementation exposes one so the configuration loader can
/// reject bad tables before any factory runs.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table(src: &str) -> toml::Value {
		toml::from_str(src).unwrap()
	}

	#[test]
	fn test_required_and_bounds() {
		let schema = Schema::new(
			vec![Field::new("url", FieldType::String)],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(300),
				},
			)],
		);
		assert!(schema.validate(&table(r#"url = "http://x""#)).is_ok());
		assert_eq!(
			schema.validate(&table("timeout_seconds = 5")),
			Err(ValidationError::MissingField("url".into()))
		);
		assert!(matches!(
			schema.validate(&table("url = \"u\"\ntimeout_seconds = 0")),
			Err(ValidationError::InvalidValue { .. })
		));
	}

	#[test]
	fn test_one_of_and_nested_paths() {
		let schema = Schema::new(
			vec![Field::new(
				"limits",
				FieldType::Table(Schema::new(
					vec![Field::new("mode", FieldType::OneOf(&["strict", "lenient"]))],
					vec![],
				)),
			)],
			vec![],
		);
		let err = schema
			.validate(&table("[limits]\nmode = \"chaotic\""))
			.unwrap_err();
		assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "limits.mode"));
		assert_eq!(
			schema.validate(&table("[limits]\n")),
			Err(ValidationError::MissingField("limits.mode".into()))
		);
	}

	#[test]
	fn test_custom_validator() {
		let schema = Schema::new(
			vec![Field::new("path", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(s) if !s.is_empty() => Ok(()),
					_ => Err("path cannot be empty".into()),
				}
			})],
			vec![],
		);
		assert!(schema.validate(&table(r#"path = """#)).is_err());
		assert!(schema.validate(&table(r#"path = "./data""#)).is_ok());
	}
}
