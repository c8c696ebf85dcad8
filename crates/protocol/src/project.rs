//! Payload projection: untyped JSON payloads into typed shapes.
//!
//! Each target shape implements [`Decode`] by reading its fields through a
//! [`Projection`]. The projection resolves a field name to a wire key with
//! [`field_key`], looks the key up at the payload's top level and then inside
//! nested `result` and `response` objects, and decodes the value found.
//!
//! A field that is absent everywhere (or `null`) yields the type's default:
//! `""`, `0`, `false`, an empty collection, `None`, or a nested shape projected
//! from an empty payload. Only a value that is present but structurally
//! incompatible produces a [`ProjectionError`].
//!
//! # Example
//!
//! ```ignore
//! struct Entry { level: String, text: String }
//!
//! impl Decode for Entry {
//!     fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
//!         Ok(Self { level: p.string("level")?, text: p.string("getText")? })
//!     }
//! }
//! ```

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Nested objects searched when a key is missing at the top level.
const FALLBACK_CONTAINERS: [&str; 2] = ["result", "response"];

static NULL: Value = Value::Null;

/// A payload value is present but cannot be decoded into the requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
	#[error("field '{field}' is not {expected}: {reason}")]
	Mismatch {
		/// Dotted path of the offending field.
		field: String,
		expected: &'static str,
		reason: String,
	},
}

impl ProjectionError {
	fn mismatch(field: &str, expected: &'static str, reason: impl ToString) -> Self {
		ProjectionError::Mismatch {
			field: field.to_string(),
			expected,
			reason: reason.to_string(),
		}
	}

	/// Prefixes the field path with the enclosing field.
	fn within(self, parent: &str) -> Self {
		match self {
			ProjectionError::Mismatch {
				field,
				expected,
				reason,
			} => ProjectionError::Mismatch {
				field: format!("{parent}.{field}"),
				expected,
				reason,
			},
		}
	}
}

/// A shape that can be projected from an untyped payload.
pub trait Decode: Sized {
	fn decode(payload: &Projection<'_>) -> Result<Self, ProjectionError>;
}

/// Projects `payload` into `T`.
pub fn project<T: Decode>(payload: &Value) -> Result<T, ProjectionError> {
	T::decode(&Projection::new(payload))
}

impl Decode for Value {
	fn decode(payload: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(payload.payload().clone())
	}
}

impl Decode for () {
	fn decode(_: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(())
	}
}

/// Derives the wire key for a field or accessor name.
///
/// Strips a leading `get`/`is` accessor prefix (`getStatus`, `get_status`,
/// `isBlocked`), converts snake_case to camelCase and lower-cases the first
/// character.
///
/// ```ignore
/// assert_eq!(field_key("getStatusText"), "statusText");
/// assert_eq!(field_key("redirect_count"), "redirectCount");
/// assert_eq!(field_key("url"), "url");
/// ```
pub fn field_key(accessor: &str) -> Cow<'_, str> {
	let stripped = strip_accessor_prefix(accessor);
	let starts_upper = stripped.chars().next().is_some_and(char::is_uppercase);
	if stripped.len() == accessor.len() && !starts_upper && !stripped.contains('_') {
		return Cow::Borrowed(accessor);
	}

	let mut key = String::with_capacity(stripped.len());
	let mut upper_next = false;
	for c in stripped.chars() {
		if c == '_' {
			upper_next = !key.is_empty();
		} else if key.is_empty() {
			key.extend(c.to_lowercase());
		} else if upper_next {
			key.extend(c.to_uppercase());
			upper_next = false;
		} else {
			key.push(c);
		}
	}
	Cow::Owned(key)
}

fn strip_accessor_prefix(accessor: &str) -> &str {
	for prefix in ["get", "is"] {
		let Some(rest) = accessor.strip_prefix(prefix) else {
			continue;
		};
		if let Some(snake) = rest.strip_prefix('_').filter(|r| !r.is_empty()) {
			return snake;
		}
		if rest.chars().next().is_some_and(char::is_uppercase) {
			return rest;
		}
	}
	accessor
}

/// Read-only view over a payload used by [`Decode`] implementations.
#[derive(Debug, Clone, Copy)]
pub struct Projection<'a> {
	payload: &'a Value,
}

impl<'a> Projection<'a> {
	pub fn new(payload: &'a Value) -> Self {
		Self { payload }
	}

	/// Projection over nothing; every lookup misses.
	pub fn empty() -> Projection<'static> {
		Projection { payload: &NULL }
	}

	/// The underlying payload.
	pub fn payload(&self) -> &'a Value {
		self.payload
	}

	/// Finds the value for `accessor`, or `None` if absent or `null`.
	///
	/// Tries the derived key and then the literal name, first at the top level,
	/// then inside `result`, then inside `response`.
	pub fn lookup(&self, accessor: &str) -> Option<&'a Value> {
		let derived = field_key(accessor);
		let literal = (derived != accessor).then_some(accessor);
		let keys = [Some(derived.as_ref()), literal];

		std::iter::once(self.payload)
			.chain(
				FALLBACK_CONTAINERS
					.iter()
					.filter_map(|container| self.payload.get(container)),
			)
			.find_map(|scope| {
				keys.iter()
					.flatten()
					.find_map(|key| scope.get(*key).filter(|v| !v.is_null()))
			})
	}

	/// Returns true if [`lookup`](Self::lookup) would find a value.
	pub fn has(&self, accessor: &str) -> bool {
		self.lookup(accessor).is_some()
	}

	/// Decodes a field through serde, defaulting when absent.
	pub fn field<T>(&self, accessor: &str) -> Result<T, ProjectionError>
	where
		T: DeserializeOwned + Default,
	{
		match self.lookup(accessor) {
			Some(value) => T::deserialize(value).map_err(|e| {
				ProjectionError::mismatch(&field_key(accessor), std::any::type_name::<T>(), e)
			}),
			None => Ok(T::default()),
		}
	}

	/// String field; `""` when absent. Numbers and booleans are stringified.
	pub fn string(&self, accessor: &str) -> Result<String, ProjectionError> {
		match self.lookup(accessor) {
			None => Ok(String::new()),
			Some(Value::String(s)) => Ok(s.clone()),
			Some(Value::Number(n)) => Ok(n.to_string()),
			Some(Value::Bool(b)) => Ok(b.to_string()),
			Some(other) => Err(ProjectionError::mismatch(
				&field_key(accessor),
				"a string",
				kind(other),
			)),
		}
	}

	/// Boolean field; `false` when absent.
	pub fn boolean(&self, accessor: &str) -> Result<bool, ProjectionError> {
		self.field(accessor)
	}

	/// Unsigned integer field; `0` when absent. Integral floats are accepted.
	pub fn u64(&self, accessor: &str) -> Result<u64, ProjectionError> {
		match self.lookup(accessor) {
			None => Ok(0),
			Some(value) => value
				.as_u64()
				.or_else(|| value.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
				.ok_or_else(|| {
					ProjectionError::mismatch(&field_key(accessor), "an unsigned integer", value)
				}),
		}
	}

	/// Signed integer field; `0` when absent.
	pub fn i64(&self, accessor: &str) -> Result<i64, ProjectionError> {
		self.field(accessor)
	}

	/// Floating point field; `0.0` when absent.
	pub fn f64(&self, accessor: &str) -> Result<f64, ProjectionError> {
		self.field(accessor)
	}

	/// Optional string; `None` when absent.
	pub fn opt_string(&self, accessor: &str) -> Result<Option<String>, ProjectionError> {
		match self.lookup(accessor) {
			None => Ok(None),
			Some(_) => self.string(accessor).map(Some),
		}
	}

	/// Raw value; `Value::Null` when absent.
	pub fn raw(&self, accessor: &str) -> Value {
		self.lookup(accessor).cloned().unwrap_or(Value::Null)
	}

	/// Nested shape; projected from an empty payload when absent.
	pub fn nested<T: Decode>(&self, accessor: &str) -> Result<T, ProjectionError> {
		match self.lookup(accessor) {
			None => T::decode(&Projection::empty()),
			Some(value @ Value::Object(_)) => {
				T::decode(&Projection::new(value)).map_err(|e| e.within(&field_key(accessor)))
			}
			Some(other) => Err(ProjectionError::mismatch(
				&field_key(accessor),
				"an object",
				kind(other),
			)),
		}
	}

	/// Nested shape; `None` when absent.
	pub fn nested_opt<T: Decode>(&self, accessor: &str) -> Result<Option<T>, ProjectionError> {
		match self.lookup(accessor) {
			None => Ok(None),
			Some(_) => self.nested(accessor).map(Some),
		}
	}

	/// Sequence of nested shapes; empty when absent.
	pub fn list<T: Decode>(&self, accessor: &str) -> Result<Vec<T>, ProjectionError> {
		match self.lookup(accessor) {
			None => Ok(Vec::new()),
			Some(Value::Array(items)) => items
				.iter()
				.enumerate()
				.map(|(i, item)| {
					T::decode(&Projection::new(item))
						.map_err(|e| e.within(&format!("{}[{i}]", field_key(accessor))))
				})
				.collect(),
			Some(other) => Err(ProjectionError::mismatch(
				&field_key(accessor),
				"an array",
				kind(other),
			)),
		}
	}
}

fn kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}
