use std::fmt;
use std::sync::Arc;

use quire_primitives::{CancellationToken, ContentEpoch};
use quire_syntax::{FormatConfig, SyntaxTree};

use super::core::Backing;
use super::{DirtyFlags, DirtySince, DocPage, PageCore};
use crate::context::DocumentContext;
use crate::error::{PageError, Result};

/// Application data edited like a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncTag {
	GlobalTextBlocks,
	WikiTextBlocks,
	GlobalPersonalWordList,
	WikiPersonalWordList,
	GlobalCamelCaseBlacklist,
	WikiCamelCaseBlacklist,
	GlobalFavoriteWikis,
}

impl FuncTag {
	pub const ALL: [Self; 7] = [
		Self::GlobalTextBlocks,
		Self::WikiTextBlocks,
		Self::GlobalPersonalWordList,
		Self::WikiPersonalWordList,
		Self::GlobalCamelCaseBlacklist,
		Self::WikiCamelCaseBlacklist,
		Self::GlobalFavoriteWikis,
	];

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::GlobalTextBlocks => "global/TextBlocks",
			Self::WikiTextBlocks => "wiki/TextBlocks",
			Self::GlobalPersonalWordList => "global/PWL",
			Self::WikiPersonalWordList => "wiki/PWL",
			Self::GlobalCamelCaseBlacklist => "global/CCBlacklist",
			Self::WikiCamelCaseBlacklist => "wiki/CCBlacklist",
			Self::GlobalFavoriteWikis => "global/FavoriteWikis",
		}
	}

	pub fn from_tag(tag: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|candidate| candidate.as_str() == tag)
	}

	/// Global tags hold per-user data shared by every wiki.
	pub const fn is_global(self) -> bool {
		matches!(
			self,
			Self::GlobalTextBlocks | Self::GlobalPersonalWordList | Self::GlobalCamelCaseBlacklist | Self::GlobalFavoriteWikis
		)
	}

	pub const fn human_name(self) -> &'static str {
		match self {
			Self::GlobalTextBlocks => "Global text blocks",
			Self::WikiTextBlocks => "Wiki text blocks",
			Self::GlobalPersonalWordList => "Global personal word list",
			Self::WikiPersonalWordList => "Wiki personal word list",
			Self::GlobalCamelCaseBlacklist => "Global camel case blacklist",
			Self::WikiCamelCaseBlacklist => "Wiki camel case blacklist",
			Self::GlobalFavoriteWikis => "Favorite wikis",
		}
	}

	/// Which application data consumers re-read after an update.
	const fn reread(self) -> &'static str {
		match self {
			Self::GlobalTextBlocks | Self::WikiTextBlocks => "text blocks",
			Self::GlobalPersonalWordList | Self::WikiPersonalWordList => "personal word list",
			Self::GlobalCamelCaseBlacklist | Self::WikiCamelCaseBlacklist => "camel case blacklist",
			Self::GlobalFavoriteWikis => "favorite wikis",
		}
	}
}

impl fmt::Display for FuncTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for FuncTag {
	type Err = PageError;

	fn from_str(tag: &str) -> Result<Self> {
		Self::from_tag(tag).ok_or_else(|| PageError::NotFound(tag.to_string()))
	}
}

/// A functional page. Text lives in a store data block keyed by the tag;
/// it is never parsed as markup.
pub struct FunctionalPage {
	tag: FuncTag,
	core: PageCore,
}

impl FunctionalPage {
	pub(crate) fn new(tag: FuncTag, ctx: Arc<DocumentContext>) -> Self {
		Self {
			tag,
			core: PageCore::new(tag.as_str().to_string(), ctx),
		}
	}

	pub fn tag(&self) -> FuncTag {
		self.tag
	}
}

impl Backing for FunctionalPage {
	fn read_only(&self) -> bool {
		!self.tag.is_global() && self.core.ctx().is_read_only()
	}

	fn load(&self) -> Result<Option<String>> {
		Ok(self.core.ctx().store.data_block(self.tag.as_str())?)
	}

	fn persist(&self, text: &str) -> Result<()> {
		let store = &self.core.ctx().store;
		if text.is_empty() {
			store.delete_data_block(self.tag.as_str())?;
		} else {
			store.store_data_block(self.tag.as_str(), text)?;
		}
		Ok(())
	}

	fn metadata_current(&self) -> Result<bool> {
		Ok(true)
	}

	fn resolve_format(&self) -> Result<FormatConfig> {
		Ok(FormatConfig::plain())
	}

	fn build_tree(&self, text: &str, _format: &FormatConfig, token: &CancellationToken) -> Result<SyntaxTree> {
		token.check()?;
		Ok(SyntaxTree::plain(text))
	}

	fn start_update(&self) -> Result<()> {
		if self.read_only() {
			return Ok(());
		}
		self.core.clear_update_dirty()?;
		tracing::info!(tag = %self.tag, reread = self.tag.reread(), "functional page updated");
		Ok(())
	}
}

impl DocPage for FunctionalPage {
	fn name(&self) -> &str {
		self.tag.as_str()
	}

	fn title(&self) -> String {
		format!("<{}>", self.tag.human_name())
	}

	fn live_text(&self) -> Result<String> {
		self.core.live_text(self)
	}

	fn live_text_no_template(&self) -> Result<Option<String>> {
		self.live_text().map(Some)
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

impl fmt::Debug for FunctionalPage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FunctionalPage").field("tag", &self.tag).finish_non_exhaustive()
	}
}
