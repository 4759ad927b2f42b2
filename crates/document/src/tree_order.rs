//! Child ordering for tree views.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;

use crate::document::Document;
use crate::error::Result;
use crate::page::{DocPage, WikiPage};

/// Property selecting how a page's children are sorted.
pub const CHILD_SORT_ORDER_KEY: &str = "child_sort_order";
/// Property placing a page at a 1-based slot among its siblings.
pub const TREE_POSITION_KEY: &str = "tree_position";
/// Property ordering a page before unprioritized siblings, lowest first.
pub const PRIORITY_KEY: &str = "priority";

/// Sort mode from the `child_sort_order` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildSortOrder {
	/// Position of the first link in the parent's text.
	Natural,
	/// Modification time, oldest first.
	ModifiedOldest,
	/// Modification time, newest first.
	ModifiedNewest,
	/// Case-insensitive name.
	#[default]
	Ascending,
	/// Case-insensitive name, reversed.
	Descending,
	/// Unrecognized setting: store order.
	Unsorted,
}

impl ChildSortOrder {
	pub fn from_property(value: Option<&str>) -> Self {
		let Some(value) = value else {
			return Self::default();
		};
		match value {
			"natural" => Self::Natural,
			"mod_oldest" => Self::ModifiedOldest,
			"mod_newest" => Self::ModifiedNewest,
			v if v.starts_with("desc") => Self::Descending,
			v if v.starts_with("asc") => Self::Ascending,
			_ => Self::Unsorted,
		}
	}

	fn sort(self, children: &mut [Child]) {
		match self {
			Self::Natural => children.sort_by_key(|c| c.pos),
			Self::ModifiedOldest => children.sort_by_key(|c| c.modified),
			Self::ModifiedNewest => children.sort_by_key(|c| Reverse(c.modified)),
			Self::Ascending => children.sort_by_cached_key(|c| c.name.to_lowercase()),
			Self::Descending => children.sort_by_cached_key(|c| Reverse(c.name.to_lowercase())),
			Self::Unsorted => {}
		}
	}
}

#[derive(Debug, Clone)]
struct Child {
	name: String,
	pos: usize,
	modified: DateTime<Utc>,
	placement: Placement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
	/// Zero-based slot.
	Positioned(i64),
	Prioritized(i64),
	Other,
}

/// A 1-based `tree_position` value as a zero-based slot.
fn tree_position(value: &str) -> Placement {
	value.parse::<i64>().map_or(Placement::Other, |slot| Placement::Positioned(slot.saturating_sub(1)))
}

fn placement(page: &WikiPage) -> Result<Placement> {
	let properties = page.properties()?;
	let last = |key: &str| properties.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.trim().to_string());
	Ok(if let Some(value) = last(TREE_POSITION_KEY) {
		tree_position(&value)
	} else if let Some(value) = last(PRIORITY_KEY) {
		value.parse::<i64>().map_or(Placement::Other, Placement::Prioritized)
	} else {
		Placement::Other
	})
}

/// Interleaves the sorted groups: a positioned child takes its slot once the
/// output reaches it, prioritized children fill slots before the rest.
fn merge(children: Vec<Child>) -> Vec<String> {
	let total = children.len();
	let mut positioned = Vec::new();
	let mut prioritized = Vec::new();
	let mut other = Vec::new();
	for child in children {
		match child.placement {
			Placement::Positioned(slot) => positioned.push((slot, child.name)),
			Placement::Prioritized(priority) => prioritized.push((priority, child.name)),
			Placement::Other => other.push(child.name),
		}
	}
	positioned.sort_by_key(|(slot, _)| *slot);
	prioritized.sort_by_key(|(priority, _)| *priority);

	let mut positioned = positioned.into_iter().peekable();
	let mut prioritized = prioritized.into_iter().map(|(_, name)| name);
	let mut other = other.into_iter();
	let mut result = Vec::with_capacity(total);

	for i in 0..total {
		let slot_due = positioned.peek().is_some_and(|(slot, _)| *slot <= i as i64);
		let next = if slot_due {
			positioned.next().map(|(_, name)| name)
		} else {
			prioritized.next().or_else(|| other.next())
		};
		match next.or_else(|| positioned.next().map(|(_, name)| name)) {
			Some(name) => result.push(name),
			None => break,
		}
	}
	result
}

impl Document {
	/// Children of `page` in tree order. Self-links are excluded; with
	/// `existing_only`, so are links to undefined pages.
	pub fn child_relations_tree_order(&self, page: &str, existing_only: bool) -> Result<Vec<String>> {
		let page = self.resolve_page(page)?;
		self.children_in_tree_order(&page, existing_only)
	}

	fn children_in_tree_order(&self, page: &WikiPage, existing_only: bool) -> Result<Vec<String>> {
		let order = ChildSortOrder::from_property(page.property_or_global(CHILD_SORT_ORDER_KEY)?.as_deref());

		let mut children = Vec::new();
		for relation in page.child_relations()? {
			if relation.target == page.name() || (existing_only && !self.is_defined_link(&relation.target)?) {
				continue;
			}
			let Ok(child) = self.resolve_page(&relation.target) else {
				continue;
			};
			children.push(Child {
				pos: relation.pos,
				modified: child.timestamps()?.modified,
				placement: placement(&child)?,
				name: relation.target,
			});
		}

		order.sort(&mut children);
		Ok(merge(children))
	}

	/// Depth-first listing of `page` and its descendants as `(name, depth)`,
	/// starting with `page` at depth 0.
	///
	/// No page appears twice, not even once under its real name and once
	/// under an alias. With `unalias`, aliases are listed as their real
	/// names.
	pub fn flat_tree(&self, page: &str, unalias: bool) -> Result<Vec<(String, usize)>> {
		let root = self.resolve_page(page)?;
		let first = if unalias { root.name().to_string() } else { page.to_string() };
		let mut result = vec![(first, 0)];
		let mut excluded = FxHashSet::default();
		self.flat_tree_into(&root, 0, unalias, &mut excluded, &mut result)?;
		Ok(result)
	}

	fn flat_tree_into(
		&self,
		page: &Arc<WikiPage>,
		depth: usize,
		unalias: bool,
		excluded: &mut FxHashSet<String>,
		result: &mut Vec<(String, usize)>,
	) -> Result<()> {
		excluded.insert(page.name().to_string());
		for child in self.children_in_tree_order(page, true)? {
			let real = self.resolve_page(&child)?;
			if excluded.contains(real.name()) {
				continue;
			}
			let listed = if unalias { real.name().to_string() } else { child };
			result.push((listed, depth + 1));
			self.flat_tree_into(&real, depth + 1, unalias, excluded, result)?;
		}
		Ok(())
	}
}
