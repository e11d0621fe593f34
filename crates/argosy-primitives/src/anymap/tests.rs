use super::{AnyMap, KeyPolicy};
use crate::value::Value;

#[test]
fn test_case_sensitive_lookup() {
	let mut map = AnyMap::new();
	map.insert("Color", "red");
	assert_eq!(map.get("Color"), Some(&Value::String("red".into())));
	assert_eq!(map.get("color"), None);
	assert_eq!(map.policy(), KeyPolicy::CaseSensitive);
}

#[test]
fn test_case_insensitive_lookup_preserves_spelling() {
	let mut map = AnyMap::case_insensitive();
	map.insert("Color", "red");
	assert_eq!(map.get("color"), Some(&Value::String("red".into())));
	assert_eq!(map.get("COLOR"), Some(&Value::String("red".into())));
	assert_eq!(map.keys().collect::<Vec<_>>(), vec!["Color"]);

	let previous = map.insert("COLOR", "blue");
	assert_eq!(previous, Some(Value::String("red".into())));
	assert_eq!(map.len(), 1);
	assert_eq!(map.keys().collect::<Vec<_>>(), vec!["COLOR"]);
}

#[test]
fn test_remove_and_contains() {
	let mut map = AnyMap::case_insensitive();
	map.insert("a", 1i64);
	assert!(map.contains_key("A"));
	assert_eq!(map.remove("A"), Some(Value::Int(1)));
	assert!(map.is_empty());
	assert_eq!(map.remove("a"), None);
}

#[test]
fn test_iteration_is_sorted() {
	let mut map = AnyMap::new();
	map.insert("b", 2i64);
	map.insert("a", 1i64);
	map.insert("c", 3i64);
	let keys: Vec<&str> = map.keys().collect();
	assert_eq!(keys, vec!["a", "b", "c"]);
}

#[test]
fn test_get_path() {
	let mut inner = AnyMap::new();
	inner.insert("name", "first");
	let mut map = AnyMap::new();
	map.insert("exports", Value::List(vec![Value::Map(inner)]));
	map.insert("plain", 1i64);

	assert_eq!(
		map.get_path("exports.0.name"),
		Some(&Value::String("first".into()))
	);
	assert_eq!(map.get_path("plain"), Some(&Value::Int(1)));
	assert_eq!(map.get_path("exports.1.name"), None);
	assert_eq!(map.get_path("exports.x"), None);
	assert_eq!(map.get_path("plain.deeper"), None);
}

#[test]
fn test_equality_ignores_spelling_differences_only_in_value() {
	let mut a = AnyMap::case_insensitive();
	a.insert("Key", 1i64);
	let mut b = AnyMap::case_insensitive();
	b.insert("key", 1i64);
	// Same lookup key, same value.
	assert_eq!(a, b);

	let mut c = AnyMap::case_insensitive();
	c.insert("key", 2i64);
	assert_ne!(a, c);
}

#[test]
fn test_try_from_json_object() {
	let json = serde_json::json!({ "Bundle.Symbolic_Name": "demo" });
	let map = AnyMap::try_from(json).expect("object converts");
	assert_eq!(
		map.get("bundle.symbolic_name"),
		Some(&Value::String("demo".into()))
	);

	let err = AnyMap::try_from(serde_json::json!(42)).unwrap_err();
	assert_eq!(err, serde_json::json!(42));
}
