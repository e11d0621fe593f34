use proptest::prelude::*;

use super::{CompareOp, Filter, FilterError, Node};
use crate::anymap::AnyMap;
use crate::value::Value;

fn props(entries: &[(&str, Value)]) -> AnyMap {
	let mut map = AnyMap::case_insensitive();
	for (k, v) in entries {
		map.insert(*k, v.clone());
	}
	map
}

#[test]
fn test_parse_simple_equality() {
	let f = Filter::new("(color=red)").expect("parses");
	assert!(f.matches(&props(&[("color", Value::from("red"))])));
	assert!(!f.matches(&props(&[("color", Value::from("blue"))])));
	assert!(!f.matches(&props(&[])));
}

#[test]
fn test_parse_composites() {
	let f = Filter::new("(&(a=1)(|(b=2)(b=3))(!(c=*)))").expect("parses");
	assert!(f.matches(&props(&[("a", Value::Int(1)), ("b", Value::Int(3))])));
	assert!(!f.matches(&props(&[("a", Value::Int(1)), ("b", Value::Int(4))])));
	assert!(!f.matches(&props(&[
		("a", Value::Int(1)),
		("b", Value::Int(2)),
		("c", Value::Int(0)),
	])));
}

#[test]
fn test_numeric_comparison() {
	let ge = Filter::new("(rank>=3)").expect("parses");
	assert!(ge.matches(&props(&[("rank", Value::Int(3))])));
	assert!(ge.matches(&props(&[("rank", Value::Int(10))])));
	assert!(!ge.matches(&props(&[("rank", Value::Int(2))])));

	let le = Filter::new("(ratio<=0.5)").expect("parses");
	assert!(le.matches(&props(&[("ratio", Value::Double(0.25))])));
	assert!(!le.matches(&props(&[("ratio", Value::Double(0.75))])));

	// Numeric property, non-numeric literal: no match.
	let junk = Filter::new("(rank>=abc)").expect("parses");
	assert!(!junk.matches(&props(&[("rank", Value::Int(3))])));
}

#[test]
fn test_int_property_with_float_literal() {
	let f = Filter::new("(rank>=2.5)").expect("parses");
	assert!(f.matches(&props(&[("rank", Value::Int(3))])));
	assert!(!f.matches(&props(&[("rank", Value::Int(2))])));
}

#[test]
fn test_string_ordering_is_lexicographic() {
	let f = Filter::new("(name<=m)").expect("parses");
	assert!(f.matches(&props(&[("name", Value::from("apple"))])));
	assert!(!f.matches(&props(&[("name", Value::from("zebra"))])));
}

#[test]
fn test_bool_matching() {
	let f = Filter::new("(enabled=TRUE)").expect("parses");
	assert!(f.matches(&props(&[("enabled", Value::Bool(true))])));
	assert!(!f.matches(&props(&[("enabled", Value::Bool(false))])));

	let junk = Filter::new("(enabled=yes)").expect("parses");
	assert!(!junk.matches(&props(&[("enabled", Value::Bool(true))])));
}

#[test]
fn test_list_matches_any_element() {
	let f = Filter::new("(objectclass=com.example.Greeter)").expect("parses");
	let list = Value::from(vec![
		"com.example.Greeter".to_owned(),
		"com.example.Farewell".to_owned(),
	]);
	assert!(f.matches(&props(&[("objectclass", list)])));
	assert!(!f.matches(&props(&[("objectclass", Value::from(vec!["other".to_owned()]))])));
}

#[test]
fn test_presence_and_negation_of_absent_key() {
	let present = Filter::new("(color=*)").expect("parses");
	assert!(present.matches(&props(&[("color", Value::from("red"))])));
	assert!(!present.matches(&props(&[])));

	// Absent keys fail leaves but succeed under explicit negation.
	let negated = Filter::new("(!(color=red))").expect("parses");
	assert!(negated.matches(&props(&[])));
	assert!(!negated.matches(&props(&[("color", Value::from("red"))])));
}

#[test]
fn test_substring_patterns() {
	let f = Filter::new("(name=foo*bar*baz)").expect("parses");
	assert!(f.matches(&props(&[("name", Value::from("foo-bar-baz"))])));
	assert!(f.matches(&props(&[("name", Value::from("foobarbaz"))])));
	assert!(!f.matches(&props(&[("name", Value::from("foo-baz"))])));
	assert!(!f.matches(&props(&[("name", Value::from("xfoo-bar-baz"))])));

	let suffix = Filter::new("(name=*.rs)").expect("parses");
	assert!(suffix.matches(&props(&[("name", Value::from("main.rs"))])));
	assert!(!suffix.matches(&props(&[("name", Value::from("main.go"))])));
}

#[test]
fn test_approx_match() {
	let f = Filter::new("(vendor~=Acme Corp)").expect("parses");
	assert!(f.matches(&props(&[("vendor", Value::from("acmecorp"))])));
	assert!(f.matches(&props(&[("vendor", Value::from("ACME CORP"))])));
	assert!(!f.matches(&props(&[("vendor", Value::from("acme inc"))])));
}

#[test]
fn test_escaped_specials() {
	let f = Filter::new(r"(path=a\*b\(c\))").expect("parses");
	assert!(f.matches(&props(&[("path", Value::from("a*b(c)"))])));
	assert!(!f.matches(&props(&[("path", Value::from("aXb(c)"))])));
}

#[test]
fn test_key_lookup_ignores_case() {
	// Case-sensitive map, differently cased filter attribute.
	let mut map = AnyMap::new();
	map.insert("Color", "red");
	let f = Filter::new("(color=red)").expect("parses");
	assert!(f.matches(&map));
}

#[test]
fn test_parse_errors() {
	assert_eq!(Filter::new(""), Err(FilterError::Empty));
	assert_eq!(Filter::new("   "), Err(FilterError::Empty));
	assert_eq!(Filter::new("(a=1"), Err(FilterError::UnexpectedEnd));
	assert!(matches!(Filter::new("(=1)"), Err(FilterError::EmptyAttribute { .. })));
	assert!(matches!(Filter::new("(a=1)x"), Err(FilterError::Trailing { .. })));
	assert!(matches!(Filter::new("(&)"), Err(FilterError::Unexpected { .. })));
	assert!(matches!(Filter::new("((a=1))"), Err(FilterError::Unexpected { .. })));
}

#[test]
fn test_render_round_trip_examples() {
	for input in [
		"(color=red)",
		"(&(a=1)(b<=2)(c>=3))",
		"(|(x=*)(!(y~=z)))",
		"(name=foo*bar*baz)",
		"(name=*mid*)",
		r"(path=a\*b)",
	] {
		let parsed = Filter::new(input).expect("parses");
		let rendered = parsed.to_string();
		let reparsed = Filter::new(&rendered).expect("rendered form parses");
		assert_eq!(parsed, reparsed, "round trip of {input} via {rendered}");
	}
}

fn attr_strategy() -> impl Strategy<Value = String> {
	"[a-zA-Z][a-zA-Z0-9_.]{0,8}"
}

fn literal_strategy() -> impl Strategy<Value = String> {
	// Printable ASCII including filter specials, which rendering escapes.
	"[ -~]{1,8}"
}

fn leaf_strategy() -> impl Strategy<Value = Node> {
	let compare = (
		attr_strategy(),
		prop_oneof![
			Just(CompareOp::Eq),
			Just(CompareOp::Le),
			Just(CompareOp::Ge),
			Just(CompareOp::Approx),
		],
		literal_strategy(),
	)
		.prop_map(|(attr, op, literal)| Node::Compare { attr, op, literal });
	let present = attr_strategy().prop_map(|attr| Node::Present { attr });
	let substring = (
		attr_strategy(),
		proptest::option::of(literal_strategy()),
		proptest::collection::vec(literal_strategy(), 0..3),
		proptest::option::of(literal_strategy()),
	)
		.prop_filter_map("degenerate substring", |(attr, initial, inner, fin)| {
			if initial.is_none() && inner.is_empty() && fin.is_none() {
				None
			} else {
				Some(Node::Substring { attr, initial, inner, fin })
			}
		});
	prop_oneof![compare, present, substring]
}

fn node_strategy() -> impl Strategy<Value = Node> {
	leaf_strategy().prop_recursive(3, 24, 3, |inner| {
		prop_oneof![
			proptest::collection::vec(inner.clone(), 1..4).prop_map(Node::And),
			proptest::collection::vec(inner.clone(), 1..4).prop_map(Node::Or),
			inner.prop_map(|n| Node::Not(Box::new(n))),
		]
	})
}

proptest! {
	/// Rendering then reparsing yields an equivalent predicate.
	#[test]
	fn prop_parse_render_round_trip(root in node_strategy()) {
		let filter = Filter { root };
		let rendered = filter.to_string();
		let reparsed = Filter::new(&rendered).expect("rendered filter parses");
		prop_assert_eq!(filter, reparsed);
	}
}
