use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use quire_primitives::{CancellationToken, ContentEpoch};
use quire_syntax::{FormatConfig, NodeKind, SyntaxTree};

use super::core::Backing;
use super::{DirtyFlags, DirtySince, DocPage, PageCore};
use crate::context::DocumentContext;
use crate::error::Result;
use crate::format::property_or_global;
use crate::pipeline::{self, StageOutcome, UpdateStep};
use crate::store::{MatchTerm, MatchTermKind, MetadataState, PageStore, PageTimestamps, Properties, Relation};

/// An ordinary page: text from the store, tree from the document parser,
/// metadata maintained by the update pipeline.
pub struct WikiPage {
	core: PageCore,
	me: Weak<WikiPage>,
	timestamps: Mutex<Option<PageTimestamps>>,
}

impl WikiPage {
	pub(crate) fn new(name: String, ctx: Arc<DocumentContext>) -> Arc<Self> {
		Arc::new_cyclic(|me| Self {
			core: PageCore::new(name, ctx),
			me: me.clone(),
			timestamps: Mutex::new(None),
		})
	}

	pub(crate) fn core(&self) -> &PageCore {
		&self.core
	}

	pub(crate) fn ctx(&self) -> &Arc<DocumentContext> {
		self.core.ctx()
	}

	pub(crate) fn store(&self) -> &dyn PageStore {
		self.core.ctx().store.as_ref()
	}

	pub(crate) fn arc(&self) -> Option<Arc<Self>> {
		self.me.upgrade()
	}

	pub fn is_defined(&self) -> Result<bool> {
		Ok(self.store().is_defined(self.name())?)
	}

	pub fn metadata_state(&self) -> Result<MetadataState> {
		Ok(self.store().metadata_state(self.name())?)
	}

	/// Committed properties, in declaration order.
	pub fn properties(&self) -> Result<Properties> {
		Ok(self.store().properties(self.name())?)
	}

	/// Last value of `key` on this page, else of `global.<key>` anywhere.
	pub fn property_or_global(&self, key: &str) -> Result<Option<String>> {
		let properties = self.properties()?;
		let globals = self.store().global_properties()?;
		Ok(property_or_global(&properties, &globals, key).map(str::to_string))
	}

	pub fn todos(&self) -> Result<Vec<String>> {
		Ok(self.store().todos(self.name())?)
	}

	pub fn child_relations(&self) -> Result<Vec<Relation>> {
		Ok(self.store().child_relations(self.name())?)
	}

	pub fn parent_relations(&self) -> Result<Vec<String>> {
		Ok(self.store().parent_relations(self.name())?)
	}

	pub fn match_terms(&self) -> Result<Vec<MatchTerm>> {
		Ok(self.store().match_terms(self.name())?)
	}

	/// Anchor names declared in the live text.
	pub fn anchors(&self) -> Result<Vec<String>> {
		let tree = self.live_tree(&CancellationToken::always_live())?;
		Ok(tree
			.iter_deep()
			.filter_map(|node| match &node.kind {
				NodeKind::Anchor { name } => Some(name.clone()),
				_ => None,
			})
			.collect())
	}

	/// Modification, creation and visit times; pages unknown to the store
	/// report the current time for all three.
	pub fn timestamps(&self) -> Result<PageTimestamps> {
		let mut cached = self.timestamps.lock();
		if let Some(timestamps) = *cached {
			return Ok(timestamps);
		}
		let timestamps = self
			.store()
			.timestamps(self.name())?
			.unwrap_or_else(|| PageTimestamps::all(chrono::Utc::now()));
		*cached = Some(timestamps);
		Ok(timestamps)
	}

	/// Runs the metadata pipeline for this page.
	pub fn run_update(&self, step: UpdateStep, token: &CancellationToken) -> Result<StageOutcome> {
		pipeline::run_update(self, step, token)
	}

	fn refresh_sync_match_terms(&self) -> Result<()> {
		let term = MatchTerm {
			term: self.name().to_string(),
			kind: MatchTermKind::PageName,
			page: self.name().to_string(),
			pos: None,
		};
		self.store()
			.update_match_terms(self.name(), &[MatchTermKind::PageName], std::slice::from_ref(&term))?;
		Ok(())
	}
}

impl Backing for WikiPage {
	fn read_only(&self) -> bool {
		self.ctx().is_read_only()
	}

	fn load(&self) -> Result<Option<String>> {
		Ok(self.store().content(self.name())?)
	}

	fn persist(&self, text: &str) -> Result<()> {
		if !self.is_defined()? {
			tracing::debug!(page = %self.name(), "creating page");
		}
		self.store().set_content(self.name(), text)?;
		self.refresh_sync_match_terms()?;
		*self.timestamps.lock() = None;
		Ok(())
	}

	fn metadata_current(&self) -> Result<bool> {
		Ok(self.metadata_state()? == MetadataState::UpToDate)
	}

	fn resolve_format(&self) -> Result<FormatConfig> {
		let properties = self.properties()?;
		let globals = self.store().global_properties()?;
		Ok(self.ctx().resolver.resolve(self.name(), &properties, &globals))
	}

	fn build_tree(&self, text: &str, format: &FormatConfig, token: &CancellationToken) -> Result<SyntaxTree> {
		let ctx = self.ctx();
		Ok(ctx.parser.parse(&ctx.config.language, text, format, token)?)
	}

	fn start_update(&self) -> Result<()> {
		pipeline::schedule_update(self)
	}
}

impl DocPage for WikiPage {
	fn name(&self) -> &str {
		self.core.name()
	}

	fn title(&self) -> String {
		self.name().to_string()
	}

	fn live_text(&self) -> Result<String> {
		self.core.live_text(self)
	}

	fn live_text_no_template(&self) -> Result<Option<String>> {
		let _guard = self.core.guard()?;
		if self.core.editor_attached()? || self.is_defined()? {
			return self.live_text().map(Some);
		}
		Ok(None)
	}

	fn set_editor_text(&self, text: Option<String>, dirty: bool) -> Result<()> {
		self.core.set_editor_text(self, text, dirty)
	}

	fn append_live_text(&self, text: &str) -> Result<()> {
		self.core.append_live_text(self, text)
	}

	fn replace_live_text(&self, text: &str) -> Result<()> {
		self.core.replace_live_text(self, text)
	}

	fn mark_text_changed(&self) -> Result<()> {
		self.core.mark_text_changed()
	}

	fn live_tree(&self, token: &CancellationToken) -> Result<SyntaxTree> {
		self.core.live_tree(self, token)
	}

	fn live_tree_if_available(&self) -> Result<Option<SyntaxTree>> {
		self.core.live_tree_if_available(self)
	}

	fn format(&self) -> Result<FormatConfig> {
		self.resolve_format()
	}

	fn current_epoch(&self) -> Result<ContentEpoch> {
		let _guard = self.core.guard()?;
		Ok(self.core.epoch())
	}

	fn dirty(&self) -> Result<DirtyFlags> {
		self.core.dirty()
	}

	fn dirty_since(&self) -> Result<DirtySince> {
		self.core.dirty_since()
	}

	fn is_read_only_effective(&self) -> bool {
		self.read_only()
	}

	fn save(&self) -> Result<bool> {
		self.core.save(self)
	}

	fn write_to_store(&self) -> Result<()> {
		self.core.write_to_store(self)
	}

	fn initiate_update(&self) -> Result<()> {
		self.start_update()
	}

	fn invalidate(&self) {
		self.core.invalidate();
	}

	fn is_invalid(&self) -> bool {
		self.core.is_invalid()
	}
}

impl std::fmt::Debug for WikiPage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WikiPage")
			.field("name", &self.name())
			.field("epoch", &self.core.epoch())
			.field("invalid", &self.is_invalid())
			.finish()
	}
}
