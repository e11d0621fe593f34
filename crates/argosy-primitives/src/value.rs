//! Dynamically typed property values.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::anymap::AnyMap;

#[cfg(test)]
mod tests;

/// A dynamically typed value stored in an [`AnyMap`].
///
/// Values are a tagged variant over the types a bundle manifest or a service
/// property map can carry. Comparisons in the filter engine dispatch on the
/// tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	/// 64-bit signed integer.
	Int(i64),
	/// 64-bit float.
	Double(f64),
	/// Boolean.
	Bool(bool),
	/// UTF-8 string.
	String(String),
	/// Ordered list of values.
	List(Vec<Value>),
	/// Nested map.
	Map(AnyMap),
}

impl Value {
	/// Returns the integer payload, if this is an `Int`.
	pub fn as_int(&self) -> Option<i64> {
		match self {
			Value::Int(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the float payload, if this is a `Double`.
	pub fn as_double(&self) -> Option<f64> {
		match self {
			Value::Double(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns a numeric view of this value, promoting `Int` to `f64`.
	pub fn as_number(&self) -> Option<f64> {
		match self {
			Value::Int(v) => Some(*v as f64),
			Value::Double(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the boolean payload, if this is a `Bool`.
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the string payload, if this is a `String`.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(v) => Some(v),
			_ => None,
		}
	}

	/// Returns the list payload, if this is a `List`.
	pub fn as_list(&self) -> Option<&[Value]> {
		match self {
			Value::List(v) => Some(v),
			_ => None,
		}
	}

	/// Returns the nested map, if this is a `Map`.
	pub fn as_map(&self) -> Option<&AnyMap> {
		match self {
			Value::Map(v) => Some(v),
			_ => None,
		}
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Int(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Value::Int(v as i64)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Double(v)
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::String(v.to_owned())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::String(v)
	}
}

impl From<Vec<Value>> for Value {
	fn from(v: Vec<Value>) -> Self {
		Value::List(v)
	}
}

impl From<AnyMap> for Value {
	fn from(v: AnyMap) -> Self {
		Value::Map(v)
	}
}

impl From<Vec<String>> for Value {
	fn from(v: Vec<String>) -> Self {
		Value::List(v.into_iter().map(Value::String).collect())
	}
}

impl From<serde_json::Value> for Value {
	fn from(v: serde_json::Value) -> Self {
		match v {
			serde_json::Value::Null => Value::String(String::new()),
			serde_json::Value::Bool(b) => Value::Bool(b),
			serde_json::Value::Number(n) => {
				if let Some(i) = n.as_i64() {
					Value::Int(i)
				} else {
					Value::Double(n.as_f64().unwrap_or(f64::NAN))
				}
			}
			serde_json::Value::String(s) => Value::String(s),
			serde_json::Value::Array(items) => {
				Value::List(items.into_iter().map(Value::from).collect())
			}
			serde_json::Value::Object(entries) => {
				// Nested objects follow the manifest convention: keys look
				// up case-insensitively, like the enclosing map.
				let mut map = AnyMap::case_insensitive();
				for (k, v) in entries {
					map.insert(k, Value::from(v));
				}
				Value::Map(map)
			}
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Int(v) => write!(f, "{v}"),
			Value::Double(v) => write!(f, "{v}"),
			Value::Bool(v) => write!(f, "{v}"),
			Value::String(v) => write!(f, "{v}"),
			Value::List(items) => {
				write!(f, "[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						write!(f, ",")?;
					}
					write!(f, "{item}")?;
				}
				write!(f, "]")
			}
			Value::Map(map) => write!(f, "{map}"),
		}
	}
}

impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Value::Int(v) => serializer.serialize_i64(*v),
			Value::Double(v) => serializer.serialize_f64(*v),
			Value::Bool(v) => serializer.serialize_bool(*v),
			Value::String(v) => serializer.serialize_str(v),
			Value::List(items) => {
				let mut seq = serializer.serialize_seq(Some(items.len()))?;
				for item in items {
					seq.serialize_element(item)?;
				}
				seq.end()
			}
			Value::Map(map) => {
				let mut out = serializer.serialize_map(Some(map.len()))?;
				for (k, v) in map.iter() {
					out.serialize_entry(k, v)?;
				}
				out.end()
			}
		}
	}
}
