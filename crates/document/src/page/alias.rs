use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use quire_primitives::{CancellationToken, ContentEpoch};
use quire_syntax::{FormatConfig, SyntaxTree};

use super::{DirtyFlags, DirtySince, DocPage, WikiPage};
use crate::error::{PageError, Result};

/// A page requested under one of its explicit aliases.
///
/// Holds no text of its own. Only the name, title and validity are the
/// alias's; content, tree, dirty state and metadata belong to the real page.
/// Invalidating an alias leaves the real page usable.
#[derive(Debug)]
pub struct AliasPage {
	alias: String,
	real: Arc<WikiPage>,
	invalid: AtomicBool,
}

impl AliasPage {
	pub(crate) fn new(alias: String, real: Arc<WikiPage>) -> Self {
		Self {
			alias,
			real,
			invalid: AtomicBool::new(false),
		}
	}

	fn target(&self) -> Result<&WikiPage> {
		if self.invalid.load(Ordering::Acquire) {
			return Err(PageError::Invalidated(self.alias.clone()));
		}
		Ok(&self.real)
	}

	pub fn real_page(&self) -> &Arc<WikiPage> {
		&self.real
	}

	/// Name of the real page.
	pub fn real_name(&self) -> &str {
		self.real.name()
	}
}

impl DocPage for AliasPage {
	fn name(&self) -> &str {
		&self.alias
	}

	fn title(&self) -> String {
		self.alias.clone()
	}

	fn live_text(&self) -> Result<String> {
		self.target()?.live_text()
	}

	fn live_text_no_template(&self) -> Result<Option<String>> {
		self.target()?.live_text_no_template()
	}

	fn set_editor_text(&self, text: Option<String>, dirty: bool) -> Result<()> {
		self.target()?.set_editor_text(text, dirty)
	}

	fn append_live_text(&self, text: &str) -> Result<()> {
		self.target()?.append_live_text(text)
	}

	fn replace_live_text(&self, text: &str) -> Result<()> {
		self.target()?.replace_live_text(text)
	}

	fn mark_text_changed(&self) -> Result<()> {
		self.target()?.mark_text_changed()
	}

	fn live_tree(&self, token: &CancellationToken) -> Result<SyntaxTree> {
		self.target()?.live_tree(token)
	}

	fn live_tree_if_available(&self) -> Result<Option<SyntaxTree>> {
		self.target()?.live_tree_if_available()
	}

	fn format(&self) -> Result<FormatConfig> {
		self.target()?.format()
	}

	fn current_epoch(&self) -> Result<ContentEpoch> {
		self.target()?.current_epoch()
	}

	fn dirty(&self) -> Result<DirtyFlags> {
		self.target()?.dirty()
	}

	fn dirty_since(&self) -> Result<DirtySince> {
		self.target()?.dirty_since()
	}

	fn is_read_only_effective(&self) -> bool {
		self.real.is_read_only_effective()
	}

	fn save(&self) -> Result<bool> {
		self.target()?.save()
	}

	fn write_to_store(&self) -> Result<()> {
		self.target()?.write_to_store()
	}

	fn initiate_update(&self) -> Result<()> {
		self.target()?.initiate_update()
	}

	fn invalidate(&self) {
		self.invalid.store(true, Ordering::Release);
	}

	fn is_invalid(&self) -> bool {
		self.invalid.load(Ordering::Acquire) || self.real.is_invalid()
	}
}
