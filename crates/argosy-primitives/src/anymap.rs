//! String-keyed property maps.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::value::Value;

#[cfg(test)]
mod tests;

/// How an [`AnyMap`] treats key case on lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPolicy {
	/// Keys compare byte-for-byte.
	#[default]
	CaseSensitive,
	/// Keys compare with ASCII case folded; the inserted spelling is
	/// preserved for iteration.
	CaseInsensitive,
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
	/// Key spelling as inserted.
	key: String,
	value: Value,
}

/// A string-keyed map of dynamically typed [`Value`]s.
///
/// Iteration order is deterministic (sorted by lookup key). The lookup policy
/// is fixed at construction: service property maps and manifests use
/// case-insensitive lookup, framework-internal maps default to
/// case-sensitive.
#[derive(Debug, Clone, Default)]
pub struct AnyMap {
	policy: KeyPolicy,
	entries: BTreeMap<String, Entry>,
}

impl AnyMap {
	/// Creates an empty case-sensitive map.
	pub fn new() -> Self {
		Self::with_policy(KeyPolicy::CaseSensitive)
	}

	/// Creates an empty case-insensitive map.
	pub fn case_insensitive() -> Self {
		Self::with_policy(KeyPolicy::CaseInsensitive)
	}

	/// Creates an empty map with the given key policy.
	pub fn with_policy(policy: KeyPolicy) -> Self {
		Self { policy, entries: BTreeMap::new() }
	}

	/// Returns the key policy fixed at construction.
	pub fn policy(&self) -> KeyPolicy {
		self.policy
	}

	fn lookup_key(&self, key: &str) -> String {
		match self.policy {
			KeyPolicy::CaseSensitive => key.to_owned(),
			KeyPolicy::CaseInsensitive => key.to_ascii_lowercase(),
		}
	}

	/// Inserts a value, returning the previous value for the key if any.
	///
	/// Under case-insensitive lookup a re-insert with different spelling
	/// replaces the stored spelling as well.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
		let key = key.into();
		let lookup = self.lookup_key(&key);
		self.entries
			.insert(lookup, Entry { key, value: value.into() })
			.map(|e| e.value)
	}

	/// Returns the value for `key`, if present.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.entries.get(&self.lookup_key(key)).map(|e| &e.value)
	}

	/// Removes and returns the value for `key`, if present.
	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.entries.remove(&self.lookup_key(key)).map(|e| e.value)
	}

	/// Returns true if `key` is present.
	pub fn contains_key(&self, key: &str) -> bool {
		self.entries.contains_key(&self.lookup_key(key))
	}

	/// Number of entries.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns true if the map has no entries.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Iterates entries as `(inserted key spelling, value)` in deterministic
	/// order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.entries.values().map(|e| (e.key.as_str(), &e.value))
	}

	/// Iterates key spellings in deterministic order.
	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.entries.values().map(|e| e.key.as_str())
	}

	/// Looks up a dotted path, descending nested maps and lists.
	///
	/// List elements are addressed by decimal index segments, e.g.
	/// `bundle.exports.0.name`.
	pub fn get_path(&self, path: &str) -> Option<&Value> {
		let mut segments = path.split('.');
		let first = segments.next()?;
		let mut current = self.get(first)?;
		for segment in segments {
			current = match current {
				Value::Map(map) => map.get(segment)?,
				Value::List(items) => {
					let idx: usize = segment.parse().ok()?;
					items.get(idx)?
				}
				_ => return None,
			};
		}
		Some(current)
	}
}

impl PartialEq for AnyMap {
	fn eq(&self, other: &Self) -> bool {
		self.entries.len() == other.entries.len()
			&& self
				.entries
				.iter()
				.zip(other.entries.iter())
				.all(|((lk, le), (rk, re))| lk == rk && le.value == re.value)
	}
}

impl FromIterator<(String, Value)> for AnyMap {
	fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
		let mut map = AnyMap::new();
		for (k, v) in iter {
			map.insert(k, v);
		}
		map
	}
}

impl fmt::Display for AnyMap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{{")?;
		for (i, (k, v)) in self.iter().enumerate() {
			if i > 0 {
				write!(f, ",")?;
			}
			match v {
				Value::String(s) => write!(f, "\"{k}\":\"{s}\"")?,
				other => write!(f, "\"{k}\":{other}")?,
			}
		}
		write!(f, "}}")
	}
}

impl Serialize for AnyMap {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut out = serializer.serialize_map(Some(self.len()))?;
		for (k, v) in self.iter() {
			out.serialize_entry(k, v)?;
		}
		out.end()
	}
}

impl TryFrom<serde_json::Value> for AnyMap {
	type Error = serde_json::Value;

	/// Converts a JSON object into a case-insensitive map (the manifest
	/// convention). Non-object input is handed back as the error.
	fn try_from(v: serde_json::Value) -> Result<Self, Self::Error> {
		match v {
			serde_json::Value::Object(entries) => {
				let mut map = AnyMap::case_insensitive();
				for (k, v) in entries {
					map.insert(k, Value::from(v));
				}
				Ok(map)
			}
			other => Err(other),
		}
	}
}
