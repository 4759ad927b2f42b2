//! Cached pages.
//!
//! Every page variant implements [`DocPage`]. [`Page`] is the closed set of
//! variants a [`crate::Document`] hands out:
//!
//! * [`WikiPage`] owns text, tree cache and metadata of an ordinary page
//! * [`AliasPage`] carries only an alias name and forwards to its real page
//! * [`FunctionalPage`] holds application data blocks as plain text

mod alias;
mod core;
mod functional;
mod wiki;

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use quire_primitives::{CancellationToken, ContentEpoch};
use quire_syntax::{FormatConfig, SyntaxTree};

pub use self::alias::AliasPage;
pub(crate) use self::core::PageCore;
pub use self::functional::{FuncTag, FunctionalPage};
pub use self::wiki::WikiPage;
use crate::error::Result;

/// Which kinds of work are outstanding for a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlags {
	/// Live text differs from stored text.
	pub save: bool,
	/// Derived metadata lags behind the live text.
	pub update: bool,
}

/// When the page became save- and update-dirty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtySince {
	pub save: Option<DateTime<Utc>>,
	pub update: Option<DateTime<Utc>>,
}

/// Content contract shared by every page variant.
pub trait DocPage: Send + Sync {
	/// Name the page was requested under (alias name for alias pages,
	/// functional tag for functional pages).
	fn name(&self) -> &str;

	/// Human-readable title.
	fn title(&self) -> String;

	/// Editor text if an editor is attached, otherwise the stored text.
	fn live_text(&self) -> Result<String>;

	/// Like [`Self::live_text`], but `None` for a page that does not exist
	/// yet.
	fn live_text_no_template(&self) -> Result<Option<String>>;

	/// Attaches (`Some`) or detaches (`None`) editor-owned text.
	fn set_editor_text(&self, text: Option<String>, dirty: bool) -> Result<()>;

	fn append_live_text(&self, text: &str) -> Result<()>;

	fn replace_live_text(&self, text: &str) -> Result<()>;

	/// Forces a new epoch after an external change to the stored text.
	fn mark_text_changed(&self) -> Result<()>;

	/// Parsed tree of the live text under the current format.
	fn live_tree(&self, token: &CancellationToken) -> Result<SyntaxTree>;

	fn live_tree_if_available(&self) -> Result<Option<SyntaxTree>>;

	fn format(&self) -> Result<FormatConfig>;

	fn current_epoch(&self) -> Result<ContentEpoch>;

	fn dirty(&self) -> Result<DirtyFlags>;

	fn dirty_since(&self) -> Result<DirtySince>;

	fn is_read_only_effective(&self) -> bool;

	/// Persists unsaved text. Returns whether anything was written.
	fn save(&self) -> Result<bool>;

	/// Saves if needed and starts a metadata update if one is outstanding.
	fn write_to_store(&self) -> Result<()>;

	fn initiate_update(&self) -> Result<()>;

	fn invalidate(&self);

	fn is_invalid(&self) -> bool;
}

/// A page handed out by a document.
#[derive(Clone)]
pub enum Page {
	Ordinary(Arc<WikiPage>),
	Alias(Arc<AliasPage>),
	Functional(Arc<FunctionalPage>),
}

impl Page {
	/// The ordinary page behind this one; alias pages resolve to their real
	/// page.
	pub fn wiki_page(&self) -> Option<&Arc<WikiPage>> {
		match self {
			Self::Ordinary(page) => Some(page),
			Self::Alias(alias) => Some(alias.real_page()),
			Self::Functional(_) => None,
		}
	}

	pub fn is_alias(&self) -> bool {
		matches!(self, Self::Alias(_))
	}
}

impl Deref for Page {
	type Target = dyn DocPage;

	fn deref(&self) -> &Self::Target {
		match self {
			Self::Ordinary(page) => page.as_ref(),
			Self::Alias(page) => page.as_ref(),
			Self::Functional(page) => page.as_ref(),
		}
	}
}

impl std::fmt::Debug for Page {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let kind = match self {
			Self::Ordinary(_) => "Ordinary",
			Self::Alias(_) => "Alias",
			Self::Functional(_) => "Functional",
		};
		f.debug_struct("Page").field("kind", &kind).field("name", &self.name()).finish()
	}
}

#[cfg(test)]
mod tests;
