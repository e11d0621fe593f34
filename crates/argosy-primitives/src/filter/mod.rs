//! LDAP-style filters over property maps.
//!
//! The grammar is the classic parenthesized form: `(&(a=1)(b>=2))`,
//! `(|(x=*)(!(y=z)))`, substring patterns `(name=foo*bar*)` and approximate
//! match `(vendor~=acme)`. Parsing fails with a [`FilterError`]; evaluation
//! never fails - a missing key simply makes the enclosing leaf false.

use std::fmt;

use crate::anymap::{AnyMap, KeyPolicy};
use crate::value::Value;

mod parse;
#[cfg(test)]
mod tests;

/// Error raised while parsing a filter string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
	/// The input was empty or all whitespace.
	#[error("empty filter")]
	Empty,
	/// The input ended inside an unfinished expression.
	#[error("unexpected end of filter")]
	UnexpectedEnd,
	/// An unexpected character at the given byte offset.
	#[error("unexpected `{ch}` at byte {pos}")]
	Unexpected { ch: char, pos: usize },
	/// An attribute name was empty.
	#[error("empty attribute at byte {pos}")]
	EmptyAttribute { pos: usize },
	/// Input remained after the closing parenthesis of the outermost
	/// expression.
	#[error("trailing input at byte {pos}")]
	Trailing { pos: usize },
}

/// Comparison operator of a leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
	Eq,
	Le,
	Ge,
	Approx,
}

/// Parsed filter node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
	And(Vec<Node>),
	Or(Vec<Node>),
	Not(Box<Node>),
	/// `(attr=*)` - the key exists.
	Present { attr: String },
	/// `(attr=value)`, `(attr<=value)`, `(attr>=value)`, `(attr~=value)`.
	Compare { attr: String, op: CompareOp, literal: String },
	/// `(attr=init*mid*...*fin)` with at least one `*`.
	Substring {
		attr: String,
		initial: Option<String>,
		inner: Vec<String>,
		fin: Option<String>,
	},
}

/// A compiled LDAP filter.
///
/// Cheap to clone; evaluation takes a property map and returns whether it
/// matches. `Display` renders a string that parses back to an equivalent
/// filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
	root: Node,
}

impl Filter {
	/// Parses a filter string.
	pub fn new(input: &str) -> Result<Self, FilterError> {
		parse::parse(input).map(|root| Self { root })
	}

	/// Evaluates this filter against a property map.
	pub fn matches(&self, props: &AnyMap) -> bool {
		eval(&self.root, props)
	}
}

impl fmt::Display for Filter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		render(&self.root, f)
	}
}

impl std::str::FromStr for Filter {
	type Err = FilterError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

fn render(node: &Node, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match node {
		Node::And(children) => {
			write!(f, "(&")?;
			for child in children {
				render(child, f)?;
			}
			write!(f, ")")
		}
		Node::Or(children) => {
			write!(f, "(|")?;
			for child in children {
				render(child, f)?;
			}
			write!(f, ")")
		}
		Node::Not(child) => {
			write!(f, "(!")?;
			render(child, f)?;
			write!(f, ")")
		}
		Node::Present { attr } => write!(f, "({attr}=*)"),
		Node::Compare { attr, op, literal } => {
			let op = match op {
				CompareOp::Eq => "=",
				CompareOp::Le => "<=",
				CompareOp::Ge => ">=",
				CompareOp::Approx => "~=",
			};
			write!(f, "({attr}{op}")?;
			render_literal(literal, f)?;
			write!(f, ")")
		}
		Node::Substring { attr, initial, inner, fin } => {
			write!(f, "({attr}=")?;
			if let Some(initial) = initial {
				render_literal(initial, f)?;
			}
			write!(f, "*")?;
			for chunk in inner {
				render_literal(chunk, f)?;
				write!(f, "*")?;
			}
			if let Some(fin) = fin {
				render_literal(fin, f)?;
			}
			write!(f, ")")
		}
	}
}

/// Writes a literal with LDAP escapes for `( ) * \`.
fn render_literal(literal: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	for ch in literal.chars() {
		if matches!(ch, '(' | ')' | '*' | '\\') {
			write!(f, "\\")?;
		}
		write!(f, "{ch}")?;
	}
	Ok(())
}

fn eval(node: &Node, props: &AnyMap) -> bool {
	match node {
		Node::And(children) => children.iter().all(|c| eval(c, props)),
		Node::Or(children) => children.iter().any(|c| eval(c, props)),
		Node::Not(child) => !eval(child, props),
		Node::Present { attr } => lookup(props, attr).is_some(),
		Node::Compare { attr, op, literal } => match lookup(props, attr) {
			Some(value) => compare(value, *op, literal),
			None => false,
		},
		Node::Substring { attr, initial, inner, fin } => match lookup(props, attr) {
			Some(value) => substring_value(value, initial.as_deref(), inner, fin.as_deref()),
			None => false,
		},
	}
}

/// Filter attribute lookup is case-insensitive regardless of the map's own
/// policy.
fn lookup<'a>(props: &'a AnyMap, attr: &str) -> Option<&'a Value> {
	if props.policy() == KeyPolicy::CaseInsensitive {
		return props.get(attr);
	}
	if let Some(v) = props.get(attr) {
		return Some(v);
	}
	props
		.iter()
		.find(|(k, _)| k.eq_ignore_ascii_case(attr))
		.map(|(_, v)| v)
}

fn compare(value: &Value, op: CompareOp, literal: &str) -> bool {
	match value {
		Value::Int(v) => {
			let lit = literal.trim();
			if let Ok(rhs) = lit.parse::<i64>() {
				ordered(v.cmp(&rhs), op)
			} else if let Ok(rhs) = lit.parse::<f64>() {
				match (*v as f64).partial_cmp(&rhs) {
					Some(ord) => ordered(ord, op),
					None => false,
				}
			} else {
				false
			}
		}
		Value::Double(v) => match literal.trim().parse::<f64>() {
			Ok(rhs) => match v.partial_cmp(&rhs) {
				Some(ord) => ordered(ord, op),
				None => false,
			},
			Err(_) => false,
		},
		Value::Bool(v) => {
			let rhs = if literal.eq_ignore_ascii_case("true") {
				true
			} else if literal.eq_ignore_ascii_case("false") {
				false
			} else {
				return false;
			};
			*v == rhs
		}
		Value::String(v) => match op {
			CompareOp::Eq => v == literal,
			CompareOp::Le => v.as_str() <= literal,
			CompareOp::Ge => v.as_str() >= literal,
			CompareOp::Approx => approx_eq(v, literal),
		},
		Value::List(items) => items.iter().any(|item| compare(item, op, literal)),
		Value::Map(_) => false,
	}
}

fn ordered(ord: std::cmp::Ordering, op: CompareOp) -> bool {
	use std::cmp::Ordering::*;
	match op {
		CompareOp::Eq | CompareOp::Approx => ord == Equal,
		CompareOp::Le => matches!(ord, Less | Equal),
		CompareOp::Ge => matches!(ord, Greater | Equal),
	}
}

/// Approximate string equality: ASCII case and whitespace are ignored.
fn approx_eq(lhs: &str, rhs: &str) -> bool {
	let mut l = lhs.chars().filter(|c| !c.is_whitespace());
	let mut r = rhs.chars().filter(|c| !c.is_whitespace());
	loop {
		match (l.next(), r.next()) {
			(None, None) => return true,
			(Some(a), Some(b)) if a.eq_ignore_ascii_case(&b) => {}
			_ => return false,
		}
	}
}

fn substring_value(value: &Value, initial: Option<&str>, inner: &[String], fin: Option<&str>) -> bool {
	match value {
		Value::String(s) => substring_match(s, initial, inner, fin),
		Value::List(items) => items
			.iter()
			.any(|item| substring_value(item, initial, inner, fin)),
		_ => false,
	}
}

fn substring_match(s: &str, initial: Option<&str>, inner: &[String], fin: Option<&str>) -> bool {
	let mut rest = s;
	if let Some(prefix) = initial {
		match rest.strip_prefix(prefix) {
			Some(r) => rest = r,
			None => return false,
		}
	}
	if let Some(suffix) = fin {
		match rest.strip_suffix(suffix) {
			Some(r) => rest = r,
			None => return false,
		}
	}
	for chunk in inner {
		if chunk.is_empty() {
			continue;
		}
		match rest.find(chunk.as_str()) {
			Some(at) => rest = &rest[at + chunk.len()..],
			None => return false,
		}
	}
	true
}
