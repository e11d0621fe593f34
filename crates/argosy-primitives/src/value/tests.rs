use super::Value;
use crate::anymap::AnyMap;

#[test]
fn test_accessors() {
	assert_eq!(Value::Int(3).as_int(), Some(3));
	assert_eq!(Value::Int(3).as_number(), Some(3.0));
	assert_eq!(Value::Double(1.5).as_double(), Some(1.5));
	assert_eq!(Value::Bool(true).as_bool(), Some(true));
	assert_eq!(Value::String("x".into()).as_str(), Some("x"));
	assert_eq!(Value::Int(3).as_str(), None);
	assert_eq!(Value::String("x".into()).as_int(), None);
}

#[test]
fn test_from_impls() {
	assert_eq!(Value::from(7i64), Value::Int(7));
	assert_eq!(Value::from(7i32), Value::Int(7));
	assert_eq!(Value::from(0.5), Value::Double(0.5));
	assert_eq!(Value::from("hi"), Value::String("hi".into()));
	assert_eq!(
		Value::from(vec!["a".to_owned(), "b".to_owned()]),
		Value::List(vec![Value::String("a".into()), Value::String("b".into())])
	);
}

#[test]
fn test_from_json() {
	let json: serde_json::Value = serde_json::json!({
		"name": "demo",
		"count": 4,
		"ratio": 0.25,
		"flags": [true, false],
		"nested": { "k": "v" },
	});
	let value = Value::from(json);
	let map = value.as_map().expect("object becomes map");
	assert_eq!(map.get("name"), Some(&Value::String("demo".into())));
	assert_eq!(map.get("count"), Some(&Value::Int(4)));
	assert_eq!(map.get("ratio"), Some(&Value::Double(0.25)));
	assert_eq!(
		map.get("flags"),
		Some(&Value::List(vec![Value::Bool(true), Value::Bool(false)]))
	);
	assert_eq!(
		map.get("nested").and_then(Value::as_map).and_then(|m| m.get("k")),
		Some(&Value::String("v".into()))
	);
	// Nested objects keep the case-insensitive manifest convention.
	assert_eq!(
		map.get("NESTED").and_then(Value::as_map).and_then(|m| m.get("K")),
		Some(&Value::String("v".into()))
	);
}

#[test]
fn test_display() {
	let mut map = AnyMap::new();
	map.insert("b", 2i64);
	map.insert("a", "x");
	let value = Value::List(vec![Value::Int(1), Value::Map(map)]);
	assert_eq!(value.to_string(), "[1,{\"a\":\"x\",\"b\":2}]");
}

#[test]
fn test_serialize_round_trips_through_json() {
	let mut map = AnyMap::new();
	map.insert("n", 1i64);
	map.insert("s", "v");
	let text = serde_json::to_string(&Value::Map(map)).expect("serializes");
	assert_eq!(text, "{\"n\":1,\"s\":\"v\"}");
}
