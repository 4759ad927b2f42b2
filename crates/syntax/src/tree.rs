use std::sync::Arc;

/// Node classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
	/// Container node; the root of every tree.
	Text,
	/// Unrecognized text.
	PlainText,
	/// Heading line; `level` 1 is the outermost.
	Heading { level: u8 },
	/// Link to another page.
	WikiLink { target: String },
	/// Property declaration; one bracket may declare several values.
	Property { entries: Vec<(String, String)> },
	/// Todo line such as `todo: buy milk`.
	TodoEntry { key: String, delimiter: String, value: String },
	/// Named anchor inside the page.
	Anchor { name: String },
}

impl NodeKind {
	/// Stable short name, used in logs and tests.
	pub const fn name(&self) -> &'static str {
		match self {
			Self::Text => "text",
			Self::PlainText => "plainText",
			Self::Heading { .. } => "heading",
			Self::WikiLink { .. } => "wikiWord",
			Self::Property { .. } => "property",
			Self::TodoEntry { .. } => "todoEntry",
			Self::Anchor { .. } => "anchorDef",
		}
	}
}

/// One node of a parsed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
	pub kind: NodeKind,
	/// Byte offset of the node in the parsed text.
	pub pos: usize,
	/// Source text covered by the node (heading nodes hold the title only).
	pub text: String,
	pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
	pub fn new(kind: NodeKind, pos: usize, text: impl Into<String>) -> Self {
		Self {
			kind,
			pos,
			text: text.into(),
			children: Vec::new(),
		}
	}

	pub fn with_children(mut self, children: Vec<SyntaxNode>) -> Self {
		self.children = children;
		self
	}
}

/// Immutable parsed page.
///
/// Clones share the same allocation. [`Self::same_tree`] tells two handles to
/// one parse apart from two structurally equal parses.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
	root: Arc<SyntaxNode>,
}

impl SyntaxTree {
	pub fn new(root: SyntaxNode) -> Self {
		Self { root: Arc::new(root) }
	}

	/// Tree of an empty page: a root without children.
	pub fn empty() -> Self {
		Self::new(SyntaxNode::new(NodeKind::Text, 0, ""))
	}

	/// Tree holding `text` verbatim as one plain-text node.
	pub fn plain(text: &str) -> Self {
		let child = SyntaxNode::new(NodeKind::PlainText, 0, text);
		Self::new(SyntaxNode::new(NodeKind::Text, 0, text).with_children(vec![child]))
	}

	pub fn root(&self) -> &SyntaxNode {
		&self.root
	}

	pub fn is_empty(&self) -> bool {
		self.root.children.is_empty()
	}

	/// True iff both handles refer to the same parse result.
	pub fn same_tree(a: &Self, b: &Self) -> bool {
		Arc::ptr_eq(&a.root, &b.root)
	}

	/// Depth-first pre-order walk over all nodes below the root.
	pub fn iter_deep(&self) -> DeepIter<'_> {
		DeepIter::new(&self.root, |_| false)
	}

	/// Depth-first walk that does not descend into nodes matching `skip`.
	/// Skipped nodes themselves are still yielded.
	pub fn iter_deep_skipping(&self, skip: fn(&NodeKind) -> bool) -> DeepIter<'_> {
		DeepIter::new(&self.root, skip)
	}

	/// Direct children of the root.
	pub fn iter_flat(&self) -> std::slice::Iter<'_, SyntaxNode> {
		self.root.children.iter()
	}
}

impl PartialEq for SyntaxTree {
	fn eq(&self, other: &Self) -> bool {
		Self::same_tree(self, other) || self.root == other.root
	}
}

impl Eq for SyntaxTree {}

/// Iterator returned by [`SyntaxTree::iter_deep`].
pub struct DeepIter<'a> {
	stack: Vec<&'a SyntaxNode>,
	skip: fn(&NodeKind) -> bool,
}

impl<'a> DeepIter<'a> {
	fn new(root: &'a SyntaxNode, skip: fn(&NodeKind) -> bool) -> Self {
		Self {
			stack: root.children.iter().rev().collect(),
			skip,
		}
	}
}

impl<'a> Iterator for DeepIter<'a> {
	type Item = &'a SyntaxNode;

	fn next(&mut self) -> Option<Self::Item> {
		let node = self.stack.pop()?;
		if !(self.skip)(&node.kind) {
			self.stack.extend(node.children.iter().rev());
		}
		Some(node)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> SyntaxTree {
		let link = SyntaxNode::new(NodeKind::WikiLink { target: "B".into() }, 8, "[[B]]");
		let nested_prop = SyntaxNode::new(
			NodeKind::Property {
				entries: vec![("k".into(), "v".into())],
			},
			14,
			"[k: v]",
		);
		let todo = SyntaxNode::new(
			NodeKind::TodoEntry {
				key: "todo".into(),
				delimiter: ":".into(),
				value: "x [k: v]".into(),
			},
			8,
			"todo: x [k: v]",
		)
		.with_children(vec![nested_prop]);
		SyntaxTree::new(SyntaxNode::new(NodeKind::Text, 0, "").with_children(vec![link, todo]))
	}

	#[test]
	fn deep_walk_is_preorder() {
		let tree = sample();
		let names: Vec<_> = tree.iter_deep().map(|n| n.kind.name()).collect();
		assert_eq!(names, ["wikiWord", "todoEntry", "property"]);
	}

	#[test]
	fn skipping_walk_yields_but_does_not_descend() {
		let tree = sample();
		let names: Vec<_> = tree
			.iter_deep_skipping(|k| matches!(k, NodeKind::TodoEntry { .. }))
			.map(|n| n.kind.name())
			.collect();
		assert_eq!(names, ["wikiWord", "todoEntry"]);
	}

	#[test]
	fn identity_differs_from_equality() {
		let a = sample();
		let b = sample();
		assert_eq!(a, b);
		assert!(!SyntaxTree::same_tree(&a, &b));
		assert!(SyntaxTree::same_tree(&a, &a.clone()));
	}
}
