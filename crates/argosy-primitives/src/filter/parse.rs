//! Recursive-descent parser for the filter grammar.

use super::{CompareOp, FilterError, Node};

pub(super) fn parse(input: &str) -> Result<Node, FilterError> {
	let mut parser = Parser { input, pos: 0 };
	parser.skip_ws();
	if parser.at_end() {
		return Err(FilterError::Empty);
	}
	let root = parser.filter()?;
	parser.skip_ws();
	if !parser.at_end() {
		return Err(FilterError::Trailing { pos: parser.pos });
	}
	Ok(root)
}

struct Parser<'a> {
	input: &'a str,
	pos: usize,
}

impl Parser<'_> {
	fn at_end(&self) -> bool {
		self.pos >= self.input.len()
	}

	fn peek(&self) -> Option<char> {
		self.input[self.pos..].chars().next()
	}

	fn bump(&mut self) -> Option<char> {
		let ch = self.peek()?;
		self.pos += ch.len_utf8();
		Some(ch)
	}

	fn skip_ws(&mut self) {
		while let Some(ch) = self.peek() {
			if !ch.is_whitespace() {
				break;
			}
			self.bump();
		}
	}

	fn expect(&mut self, want: char) -> Result<(), FilterError> {
		match self.peek() {
			Some(ch) if ch == want => {
				self.bump();
				Ok(())
			}
			Some(ch) => Err(FilterError::Unexpected { ch, pos: self.pos }),
			None => Err(FilterError::UnexpectedEnd),
		}
	}

	/// `filter := '(' filtercomp ')'`
	fn filter(&mut self) -> Result<Node, FilterError> {
		self.skip_ws();
		self.expect('(')?;
		self.skip_ws();
		let node = match self.peek() {
			Some('&') => {
				self.bump();
				Node::And(self.filter_list()?)
			}
			Some('|') => {
				self.bump();
				Node::Or(self.filter_list()?)
			}
			Some('!') => {
				self.bump();
				Node::Not(Box::new(self.filter()?))
			}
			Some(_) => self.item()?,
			None => return Err(FilterError::UnexpectedEnd),
		};
		self.skip_ws();
		self.expect(')')?;
		Ok(node)
	}

	/// One or more sub-filters, up to the enclosing `)`.
	fn filter_list(&mut self) -> Result<Vec<Node>, FilterError> {
		let mut children = Vec::new();
		loop {
			self.skip_ws();
			match self.peek() {
				Some('(') => children.push(self.filter()?),
				Some(ch) => {
					if ch == ')' && !children.is_empty() {
						return Ok(children);
					}
					return Err(FilterError::Unexpected { ch, pos: self.pos });
				}
				None => return Err(FilterError::UnexpectedEnd),
			}
		}
	}

	/// `item := attr ('=' | '<=' | '>=' | '~=') value`
	fn item(&mut self) -> Result<Node, FilterError> {
		let attr_start = self.pos;
		let mut attr = String::new();
		let op = loop {
			match self.peek() {
				Some('=') => {
					self.bump();
					break CompareOp::Eq;
				}
				Some(ch @ ('<' | '>' | '~')) => {
					self.bump();
					self.expect('=')?;
					break match ch {
						'<' => CompareOp::Le,
						'>' => CompareOp::Ge,
						_ => CompareOp::Approx,
					};
				}
				Some(ch @ ('(' | ')' | '*')) => {
					return Err(FilterError::Unexpected { ch, pos: self.pos });
				}
				Some(ch) => {
					self.bump();
					attr.push(ch);
				}
				None => return Err(FilterError::UnexpectedEnd),
			}
		};
		let attr = attr.trim().to_owned();
		if attr.is_empty() {
			return Err(FilterError::EmptyAttribute { pos: attr_start });
		}

		// Value runs to the closing paren. Unescaped `*` splits an equality
		// into substring segments; for the other operators it is literal.
		let mut segments: Vec<String> = Vec::new();
		let mut current = String::new();
		loop {
			match self.peek() {
				Some(')') | None => break,
				Some('\\') => {
					self.bump();
					match self.bump() {
						Some(escaped) => current.push(escaped),
						None => return Err(FilterError::UnexpectedEnd),
					}
				}
				Some('*') if op == CompareOp::Eq => {
					self.bump();
					segments.push(std::mem::take(&mut current));
				}
				Some(ch) => {
					self.bump();
					current.push(ch);
				}
			}
		}

		if segments.is_empty() {
			return Ok(Node::Compare { attr, op, literal: current });
		}
		segments.push(current);

		// At least one wildcard: presence test or substring pattern.
		if segments.iter().all(String::is_empty) && segments.len() == 2 {
			return Ok(Node::Present { attr });
		}
		let fin = match segments.pop() {
			Some(last) if !last.is_empty() => Some(last),
			_ => None,
		};
		let initial = if segments[0].is_empty() {
			None
		} else {
			Some(segments.remove(0))
		};
		let inner: Vec<String> = segments.into_iter().filter(|s| !s.is_empty()).collect();
		Ok(Node::Substring { attr, initial, inner, fin })
	}
}
