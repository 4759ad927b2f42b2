//! Line-oriented wiki markup.
//!
//! Recognized constructs:
//!
//! ```text
//! + Heading               one to fifteen `+`, then whitespace
//! todo: call Bob          todo keywords, optional `.sub` suffix, `:` delimiter
//! anchor: name            named anchor
//! [[Page]] [[Page|label]] links
//! CamelCase               links, when the format enables them
//! [key: value; value2]    properties (`=` also accepted as separator)
//! ```

use std::sync::LazyLock;

use quire_primitives::CancellationToken;
use regex::{Captures, Regex};

use crate::{FormatConfig, NodeKind, ParseError, Parser, SyntaxNode, SyntaxTree};

/// Language name served by [`WikiParser`].
pub const WIKI_LANGUAGE: &str = "wiki";

const TODO_KEYWORDS: &[&str] = &["todo", "done", "wait", "action", "track", "issue", "question", "project"];

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\+{1,15})[ \t]+(.*)$").expect("valid heading regex"));

static TODO: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[ \t]*(?P<key>[a-z]+(?:\.[A-Za-z0-9_]+)*)(?P<delim>:[ \t]*)(?P<value>.*)$").expect("valid todo regex"));

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[ \t]*anchor:[ \t]*(?P<name>[A-Za-z0-9_]+)[ \t]*$").expect("valid anchor regex"));

static INLINE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(concat!(
		r"(?P<link>\[\[(?P<target>[^\]|\n]+)(?:\|[^\]\n]*)?\]\])",
		r"|(?P<prop>\[(?P<key>[A-Za-z0-9_.\-]+)[ \t]*[:=][ \t]*(?P<values>[^\]\n]*)\])",
		r"|(?P<camel>\b[A-Z][a-z0-9]+[A-Z][A-Za-z0-9]*\b)",
	))
	.expect("valid inline regex")
});

/// Built-in parser for the `wiki` markup language.
#[derive(Debug, Default, Clone, Copy)]
pub struct WikiParser;

impl WikiParser {
	pub const fn new() -> Self {
		Self
	}
}

impl Parser for WikiParser {
	fn parse(&self, language: &str, text: &str, format: &FormatConfig, token: &CancellationToken) -> Result<SyntaxTree, ParseError> {
		if language != WIKI_LANGUAGE {
			return Err(ParseError::UnknownLanguage(language.to_string()));
		}
		if text.is_empty() {
			return Ok(SyntaxTree::empty());
		}
		if format.no_format {
			return Ok(SyntaxTree::plain(text));
		}

		let mut children = Vec::new();
		let mut offset = 0;
		for raw in text.split_inclusive('\n') {
			token.check()?;
			let line = raw.strip_suffix('\n').unwrap_or(raw);
			parse_line(line, offset, format, &mut children);
			offset += raw.len();
		}
		token.check()?;

		tracing::trace!(bytes = text.len(), nodes = children.len(), "wiki text parsed");
		Ok(SyntaxTree::new(SyntaxNode::new(NodeKind::Text, 0, text).with_children(children)))
	}
}

fn parse_line(line: &str, offset: usize, format: &FormatConfig, out: &mut Vec<SyntaxNode>) {
	if let Some(caps) = HEADING.captures(line) {
		let level = caps[1].len() as u8;
		let title = caps.get(2).map_or("", |m| m.as_str());
		let title_pos = offset + caps.get(2).map_or(0, |m| m.start());
		let children = parse_inline(title, title_pos, format);
		out.push(SyntaxNode::new(NodeKind::Heading { level }, offset, title).with_children(children));
		return;
	}

	if let Some(caps) = ANCHOR.captures(line) {
		out.push(SyntaxNode::new(NodeKind::Anchor { name: caps["name"].to_string() }, offset, line));
		return;
	}

	if let Some(caps) = TODO.captures(line)
		&& is_todo_key(&caps["key"])
	{
		out.push(todo_node(&caps, line, offset, format));
		return;
	}

	out.extend(parse_inline(line, offset, format));
}

fn is_todo_key(key: &str) -> bool {
	let base = key.split('.').next().unwrap_or(key);
	TODO_KEYWORDS.contains(&base)
}

fn todo_node(caps: &Captures<'_>, line: &str, offset: usize, format: &FormatConfig) -> SyntaxNode {
	let value = caps.name("value").map_or("", |m| m.as_str());
	let value_pos = offset + caps.name("value").map_or(0, |m| m.start());
	let kind = NodeKind::TodoEntry {
		key: caps["key"].to_string(),
		delimiter: caps["delim"].to_string(),
		value: value.to_string(),
	};
	SyntaxNode::new(kind, offset, line.trim_start()).with_children(parse_inline(value, value_pos, format))
}

fn parse_inline(text: &str, offset: usize, format: &FormatConfig) -> Vec<SyntaxNode> {
	let mut nodes = Vec::new();
	let mut last = 0;

	for caps in INLINE.captures_iter(text) {
		let Some(whole) = caps.get(0) else { continue };
		let node = if let Some(target) = caps.name("target") {
			SyntaxNode::new(
				NodeKind::WikiLink {
					target: target.as_str().trim().to_string(),
				},
				offset + whole.start(),
				whole.as_str(),
			)
		} else if caps.name("prop").is_some() {
			let key = &caps["key"];
			let entries = caps["values"]
				.split(';')
				.map(str::trim)
				.filter(|v| !v.is_empty())
				.map(|v| (key.to_string(), v.to_string()))
				.collect();
			SyntaxNode::new(NodeKind::Property { entries }, offset + whole.start(), whole.as_str())
		} else if format.camel_case_links {
			SyntaxNode::new(
				NodeKind::WikiLink {
					target: whole.as_str().to_string(),
				},
				offset + whole.start(),
				whole.as_str(),
			)
		} else {
			continue;
		};

		if whole.start() > last {
			nodes.push(SyntaxNode::new(NodeKind::PlainText, offset + last, &text[last..whole.start()]));
		}
		nodes.push(node);
		last = whole.end();
	}

	if last < text.len() {
		nodes.push(SyntaxNode::new(NodeKind::PlainText, offset + last, &text[last..]));
	}
	nodes
}
