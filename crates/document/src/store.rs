//! Persistence backend seam.
//!
//! [`PageStore`] is the narrow interface the page cache talks to; storage
//! engines live behind it. [`MemoryStore`] is the in-process implementation
//! used by tests and embedders without a database.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;

/// Ordered `(key, value)` property pairs; keys may repeat.
pub type Properties = Vec<(String, String)>;

/// Key prefix marking a property as document-wide.
pub const GLOBAL_PREFIX: &str = "global.";

/// Progress of the metadata pipeline as recorded by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MetadataState {
	/// Nothing derived from the current content has been committed.
	#[default]
	Dirty,
	/// Stage A (properties) committed.
	PropertiesProcessed,
	/// Stage B (relations, todos, alias terms) committed.
	UpToDate,
}

/// Origin of a match term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchTermKind {
	/// The page's own name; refreshed synchronously on every save.
	PageName,
	/// Declared with an `alias` property.
	ExplicitAlias,
	/// Derived from a heading up to the configured depth.
	Heading,
}

/// A term that resolves to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchTerm {
	pub term: String,
	pub kind: MatchTermKind,
	/// Page the term resolves to.
	pub page: String,
	/// Byte position of the declaration, if it came from page text.
	pub pos: Option<usize>,
}

/// Outgoing link from one page to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
	pub target: String,
	/// Byte position of the first occurrence of the link.
	pub pos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTimestamps {
	pub modified: DateTime<Utc>,
	pub created: DateTime<Utc>,
	pub visited: DateTime<Utc>,
}

impl PageTimestamps {
	pub fn all(at: DateTime<Utc>) -> Self {
		Self {
			modified: at,
			created: at,
			visited: at,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
	/// Metadata was written for a page with no stored content.
	#[error("page {0:?} is not defined")]
	Undefined(String),
	#[error("storage backend failure: {0}")]
	Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence backend consumed by pages.
///
/// Bulk setters replace the whole table for one page. Implementations must be
/// internally synchronized; pages call them while holding their own locks,
/// so a store must never call back into pages.
pub trait PageStore: Send + Sync {
	/// Stored content, or `None` if the page is undefined.
	fn content(&self, page: &str) -> StoreResult<Option<String>>;
	/// Creates or overwrites a page. Resets its metadata state to
	/// [`MetadataState::Dirty`].
	fn set_content(&self, page: &str, text: &str) -> StoreResult<()>;
	fn delete_page(&self, page: &str) -> StoreResult<()>;

	fn is_defined(&self, page: &str) -> StoreResult<bool> {
		Ok(self.content(page)?.is_some())
	}

	fn timestamps(&self, page: &str) -> StoreResult<Option<PageTimestamps>>;

	fn metadata_state(&self, page: &str) -> StoreResult<MetadataState>;
	fn set_metadata_state(&self, page: &str, state: MetadataState) -> StoreResult<()>;

	fn update_properties(&self, page: &str, properties: &[(String, String)]) -> StoreResult<()>;
	fn properties(&self, page: &str) -> StoreResult<Properties>;
	/// Every `global.*` property declared on any page, in declaration order.
	fn global_properties(&self) -> StoreResult<Properties>;

	fn update_todos(&self, page: &str, todos: &[String]) -> StoreResult<()>;
	fn todos(&self, page: &str) -> StoreResult<Vec<String>>;

	fn update_child_relations(&self, page: &str, relations: &[Relation]) -> StoreResult<()>;
	fn child_relations(&self, page: &str) -> StoreResult<Vec<Relation>>;
	/// Pages linking to `page`.
	fn parent_relations(&self, page: &str) -> StoreResult<Vec<String>>;

	/// Replaces the terms of `kinds` declared by `page` with `terms`.
	fn update_match_terms(&self, page: &str, kinds: &[MatchTermKind], terms: &[MatchTerm]) -> StoreResult<()>;
	fn match_terms(&self, page: &str) -> StoreResult<Vec<MatchTerm>>;
	/// Page owning a term of `kind`, if any.
	fn resolve_match_term(&self, term: &str, kind: MatchTermKind) -> StoreResult<Option<String>>;

	fn data_block(&self, key: &str) -> StoreResult<Option<String>>;
	fn store_data_block(&self, key: &str, text: &str) -> StoreResult<()>;
	fn delete_data_block(&self, key: &str) -> StoreResult<()>;
}

#[derive(Debug)]
struct PageRecord {
	content: String,
	state: MetadataState,
	timestamps: PageTimestamps,
	properties: Properties,
	todos: Vec<String>,
	relations: Vec<Relation>,
	match_terms: Vec<MatchTerm>,
}

impl PageRecord {
	fn new(content: String, now: DateTime<Utc>) -> Self {
		Self {
			content,
			state: MetadataState::Dirty,
			timestamps: PageTimestamps::all(now),
			properties: Vec::new(),
			todos: Vec::new(),
			relations: Vec::new(),
			match_terms: Vec::new(),
		}
	}
}

#[derive(Debug, Default)]
struct MemoryInner {
	pages: IndexMap<String, PageRecord>,
	data_blocks: IndexMap<String, String>,
}

/// In-memory [`PageStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
	inner: RwLock<MemoryInner>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Overrides the modification time of a defined page.
	pub fn set_modified(&self, page: &str, modified: DateTime<Utc>) -> StoreResult<()> {
		self.with_page(page, |record| record.timestamps.modified = modified)
	}

	fn with_page<R>(&self, page: &str, f: impl FnOnce(&mut PageRecord) -> R) -> StoreResult<R> {
		let mut inner = self.inner.write();
		let record = inner.pages.get_mut(page).ok_or_else(|| StoreError::Undefined(page.to_string()))?;
		Ok(f(record))
	}

	fn read_page<R>(&self, page: &str, f: impl FnOnce(&PageRecord) -> R) -> Option<R> {
		self.inner.read().pages.get(page).map(f)
	}
}

impl PageStore for MemoryStore {
	fn content(&self, page: &str) -> StoreResult<Option<String>> {
		Ok(self.read_page(page, |r| r.content.clone()))
	}

	fn set_content(&self, page: &str, text: &str) -> StoreResult<()> {
		let now = Utc::now();
		let mut inner = self.inner.write();
		match inner.pages.get_mut(page) {
			Some(record) => {
				record.content = text.to_string();
				record.state = MetadataState::Dirty;
				record.timestamps.modified = now;
			}
			None => {
				inner.pages.insert(page.to_string(), PageRecord::new(text.to_string(), now));
			}
		}
		Ok(())
	}

	fn delete_page(&self, page: &str) -> StoreResult<()> {
		self.inner.write().pages.shift_remove(page);
		Ok(())
	}

	fn timestamps(&self, page: &str) -> StoreResult<Option<PageTimestamps>> {
		Ok(self.read_page(page, |r| r.timestamps))
	}

	fn metadata_state(&self, page: &str) -> StoreResult<MetadataState> {
		Ok(self.read_page(page, |r| r.state).unwrap_or_default())
	}

	fn set_metadata_state(&self, page: &str, state: MetadataState) -> StoreResult<()> {
		self.with_page(page, |r| r.state = state)
	}

	fn update_properties(&self, page: &str, properties: &[(String, String)]) -> StoreResult<()> {
		self.with_page(page, |r| r.properties = properties.to_vec())
	}

	fn properties(&self, page: &str) -> StoreResult<Properties> {
		Ok(self.read_page(page, |r| r.properties.clone()).unwrap_or_default())
	}

	fn global_properties(&self) -> StoreResult<Properties> {
		let inner = self.inner.read();
		Ok(inner
			.pages
			.values()
			.flat_map(|r| r.properties.iter())
			.filter(|(key, _)| key.starts_with(GLOBAL_PREFIX))
			.cloned()
			.collect())
	}

	fn update_todos(&self, page: &str, todos: &[String]) -> StoreResult<()> {
		self.with_page(page, |r| r.todos = todos.to_vec())
	}

	fn todos(&self, page: &str) -> StoreResult<Vec<String>> {
		Ok(self.read_page(page, |r| r.todos.clone()).unwrap_or_default())
	}

	fn update_child_relations(&self, page: &str, relations: &[Relation]) -> StoreResult<()> {
		self.with_page(page, |r| r.relations = relations.to_vec())
	}

	fn child_relations(&self, page: &str) -> StoreResult<Vec<Relation>> {
		Ok(self.read_page(page, |r| r.relations.clone()).unwrap_or_default())
	}

	fn parent_relations(&self, page: &str) -> StoreResult<Vec<String>> {
		let inner = self.inner.read();
		Ok(inner
			.pages
			.iter()
			.filter(|(_, r)| r.relations.iter().any(|rel| rel.target == page))
			.map(|(name, _)| name.clone())
			.collect())
	}

	fn update_match_terms(&self, page: &str, kinds: &[MatchTermKind], terms: &[MatchTerm]) -> StoreResult<()> {
		self.with_page(page, |r| {
			r.match_terms.retain(|t| !kinds.contains(&t.kind));
			r.match_terms.extend(terms.iter().cloned());
		})
	}

	fn match_terms(&self, page: &str) -> StoreResult<Vec<MatchTerm>> {
		Ok(self.read_page(page, |r| r.match_terms.clone()).unwrap_or_default())
	}

	fn resolve_match_term(&self, term: &str, kind: MatchTermKind) -> StoreResult<Option<String>> {
		let inner = self.inner.read();
		Ok(inner
			.pages
			.values()
			.flat_map(|r| r.match_terms.iter())
			.find(|t| t.kind == kind && t.term == term)
			.map(|t| t.page.clone()))
	}

	fn data_block(&self, key: &str) -> StoreResult<Option<String>> {
		Ok(self.inner.read().data_blocks.get(key).cloned())
	}

	fn store_data_block(&self, key: &str, text: &str) -> StoreResult<()> {
		self.inner.write().data_blocks.insert(key.to_string(), text.to_string());
		Ok(())
	}

	fn delete_data_block(&self, key: &str) -> StoreResult<()> {
		self.inner.write().data_blocks.shift_remove(key);
		Ok(())
	}
}
