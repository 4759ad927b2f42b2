//! Text state and tree cache shared by every data-carrying page.
//!
//! Two locks per page:
//!
//! * the text lock guards [`TextState`]; every field change and every epoch
//!   mint happens under it
//! * the build lock serializes tree construction, so concurrent readers of a
//!   missing tree parse it once
//!
//! Parsing runs under the build lock only. The text lock is taken briefly to
//! snapshot (epoch, format, text) and again to publish, and the publish
//! re-validates the snapshot. Editors therefore never wait for a parse; they
//! only make it stale.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use quire_primitives::{BoundedGuard, BoundedLock, CancellationToken, ContentEpoch, EpochClock};
use quire_syntax::{FormatConfig, SyntaxTree};

use super::{DirtyFlags, DirtySince};
use crate::context::DocumentContext;
use crate::error::{PageError, Result};

/// Variant-specific behavior plugged into [`PageCore`].
pub(crate) trait Backing {
	fn read_only(&self) -> bool;
	/// Stored text, `None` if nothing is stored yet.
	fn load(&self) -> Result<Option<String>>;
	fn persist(&self, text: &str) -> Result<()>;
	/// Whether the store already holds fully processed metadata.
	fn metadata_current(&self) -> Result<bool>;
	fn resolve_format(&self) -> Result<FormatConfig>;
	fn build_tree(&self, text: &str, format: &FormatConfig, token: &CancellationToken) -> Result<SyntaxTree>;
	fn start_update(&self) -> Result<()>;
}

/// Tree plus the snapshot it was built from.
#[derive(Debug, Clone)]
pub(crate) struct CachedTree {
	pub tree: SyntaxTree,
	pub epoch: ContentEpoch,
	pub format: FormatConfig,
}

#[derive(Debug, Default)]
pub(crate) struct TextState {
	/// Text owned by an attached editor; wins over stored text.
	pub editor_text: Option<String>,
	/// Cached stored text.
	pub loaded_text: Option<String>,
	pub save_dirty_since: Option<DateTime<Utc>>,
	pub update_dirty_since: Option<DateTime<Utc>>,
	pub tree: Option<CachedTree>,
}

impl TextState {
	fn current_text(&self) -> Option<&str> {
		self.editor_text.as_deref().or(self.loaded_text.as_deref())
	}

	fn valid_tree(&self, epoch: ContentEpoch, format: &FormatConfig) -> Option<SyntaxTree> {
		self.tree
			.as_ref()
			.filter(|cached| cached.epoch == epoch && cached.format.is_equivalent(format))
			.map(|cached| cached.tree.clone())
	}
}

pub(crate) struct PageCore {
	name: String,
	ctx: Arc<DocumentContext>,
	clock: Arc<EpochClock>,
	invalid: AtomicBool,
	text: BoundedLock<RefCell<TextState>>,
	build: BoundedLock<()>,
}

impl PageCore {
	pub fn new(name: String, ctx: Arc<DocumentContext>) -> Self {
		let text = ctx.new_lock("page text", RefCell::new(TextState::default()));
		let build = ctx.new_lock("page tree build", ());
		Self {
			name,
			ctx,
			clock: Arc::new(EpochClock::new()),
			invalid: AtomicBool::new(false),
			text,
			build,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn ctx(&self) -> &Arc<DocumentContext> {
		&self.ctx
	}

	pub fn epoch(&self) -> ContentEpoch {
		self.clock.current()
	}

	/// Acquires the text lock of a live page.
	///
	/// Borrows of the returned cell must stay short and must not span calls
	/// that take the lock again.
	pub fn guard(&self) -> Result<BoundedGuard<'_, RefCell<TextState>>> {
		let guard = self.text.acquire()?;
		self.ensure_valid()?;
		Ok(guard)
	}

	fn ensure_valid(&self) -> Result<()> {
		if self.is_invalid() {
			return Err(PageError::Invalidated(self.name.clone()));
		}
		Ok(())
	}

	pub fn is_invalid(&self) -> bool {
		self.invalid.load(Ordering::SeqCst)
	}

	/// Drops all derived state and kills in-flight computations.
	pub fn invalidate(&self) {
		self.invalid.store(true, Ordering::SeqCst);
		self.clock.advance();
		match self.text.acquire() {
			Ok(guard) => *guard.borrow_mut() = TextState::default(),
			Err(err) => tracing::warn!(page = %self.name, %err, "invalidated page without clearing its state"),
		}
		tracing::debug!(page = %self.name, "page invalidated");
	}

	/// Mints a new epoch and drops the cached tree; with `dirty`, also marks
	/// the page save- and update-dirty.
	fn touch(&self, state: &mut TextState, dirty: bool) -> ContentEpoch {
		let epoch = self.clock.advance();
		state.tree = None;
		if dirty {
			let now = Utc::now();
			state.save_dirty_since.get_or_insert(now);
			state.update_dirty_since.get_or_insert(now);
		}
		tracing::trace!(page = %self.name, epoch = epoch.generation(), dirty, "text epoch advanced");
		epoch
	}

	pub fn live_text(&self, backing: &impl Backing) -> Result<String> {
		let guard = self.guard()?;
		if let Some(text) = guard.borrow().current_text() {
			return Ok(text.to_string());
		}
		let loaded = backing.load()?.unwrap_or_default();
		guard.borrow_mut().loaded_text = Some(loaded.clone());
		Ok(loaded)
	}

	pub fn editor_attached(&self) -> Result<bool> {
		Ok(self.guard()?.borrow().editor_text.is_some())
	}

	/// Attaches (`Some`) or detaches (`None`) editor-owned text.
	///
	/// Attaching with `dirty == false` assumes the editor text came from the
	/// store. Detaching while save-dirty discards the unsaved text.
	pub fn set_editor_text(&self, backing: &impl Backing, text: Option<String>, dirty: bool) -> Result<()> {
		let guard = self.guard()?;
		let mut state = guard.borrow_mut();
		match text {
			Some(text) => {
				state.editor_text = Some(text);
				if dirty {
					self.touch(&mut state, !backing.read_only());
				}
			}
			None => {
				state.editor_text = None;
				if state.save_dirty_since.take().is_some() {
					self.touch(&mut state, false);
					tracing::debug!(page = %self.name, "editor detached with unsaved text");
				}
			}
		}
		Ok(())
	}

	pub fn append_live_text(&self, backing: &impl Backing, text: &str) -> Result<()> {
		self.mutate(backing, |current| current.push_str(text))
	}

	pub fn replace_live_text(&self, backing: &impl Backing, text: &str) -> Result<()> {
		self.mutate(backing, |current| {
			current.clear();
			current.push_str(text);
		})
	}

	/// Applies `edit` to the editor text if one is attached, otherwise to the
	/// stored text, which is then written back. No-op on read-only pages.
	fn mutate(&self, backing: &impl Backing, edit: impl FnOnce(&mut String)) -> Result<()> {
		let guard = self.guard()?;
		if backing.read_only() {
			tracing::debug!(page = %self.name, "ignoring edit of read-only page");
			return Ok(());
		}

		let editor_text = guard.borrow().editor_text.clone();
		let (mut text, in_editor) = match editor_text {
			Some(editor) => (editor, true),
			None => (self.live_text(backing)?, false),
		};
		edit(&mut text);

		{
			let mut state = guard.borrow_mut();
			self.touch(&mut state, true);
			if in_editor {
				state.editor_text = Some(text);
				return Ok(());
			}
			state.loaded_text = Some(text);
		}
		self.write_to_store(backing)
	}

	/// External change detection: the text may differ from what was cached.
	pub fn mark_text_changed(&self) -> Result<()> {
		let guard = self.guard()?;
		let mut state = guard.borrow_mut();
		state.loaded_text = None;
		self.touch(&mut state, false);
		Ok(())
	}

	pub fn dirty(&self) -> Result<DirtyFlags> {
		let guard = self.guard()?;
		let state = guard.borrow();
		Ok(DirtyFlags {
			save: state.save_dirty_since.is_some(),
			update: state.update_dirty_since.is_some(),
		})
	}

	pub fn dirty_since(&self) -> Result<DirtySince> {
		let guard = self.guard()?;
		let state = guard.borrow();
		Ok(DirtySince {
			save: state.save_dirty_since,
			update: state.update_dirty_since,
		})
	}

	/// Persists the live text if it has unsaved changes.
	pub fn save(&self, backing: &impl Backing) -> Result<bool> {
		let guard = self.guard()?;
		if guard.borrow().save_dirty_since.is_none() || backing.read_only() {
			return Ok(false);
		}
		let text = self.live_text(backing)?;
		backing.persist(&text)?;

		let mut state = guard.borrow_mut();
		state.save_dirty_since = None;
		if state.editor_text.is_none() {
			state.loaded_text = Some(text);
		}
		tracing::debug!(page = %self.name, "page saved");
		Ok(true)
	}

	/// Saves if save-dirty, then starts a metadata update when anything is
	/// outstanding.
	pub fn write_to_store(&self, backing: &impl Backing) -> Result<()> {
		let guard = self.guard()?;
		let flags = self.dirty()?;
		if flags.save {
			self.save(backing)?;
			return backing.start_update();
		}
		if flags.update {
			return backing.start_update();
		}
		if !backing.metadata_current()? {
			guard.borrow_mut().update_dirty_since.get_or_insert_with(Utc::now);
			return backing.start_update();
		}
		Ok(())
	}

	/// Returns the tree for the current text and format, building it if
	/// needed.
	///
	/// # Errors
	///
	/// [`PageError::Stale`] if the text or format changed while the tree was
	/// being built; the result is discarded rather than cached.
	pub fn live_tree(&self, backing: &impl Backing, token: &CancellationToken) -> Result<SyntaxTree> {
		let _build = self.build.acquire()?;

		let (text, epoch, format) = {
			let guard = self.guard()?;
			let format = backing.resolve_format()?;
			let epoch = self.epoch();
			if let Some(tree) = guard.borrow().valid_tree(epoch, &format) {
				tracing::trace!(page = %self.name, "tree cache hit");
				return Ok(tree);
			}
			(self.live_text(backing)?, epoch, format)
		};

		let tree = if text.is_empty() {
			SyntaxTree::empty()
		} else {
			tracing::trace!(page = %self.name, epoch = epoch.generation(), "tree cache miss");
			let epoch_token = self.clock.token(epoch);
			let token = token.clone().and_predicate(move || epoch_token.is_live());
			backing.build_tree(&text, &format, &token)?
		};

		let guard = self.guard()?;
		let format_now = backing.resolve_format()?;
		if self.epoch() != epoch || !format_now.is_equivalent(&format) {
			tracing::debug!(page = %self.name, epoch = epoch.generation(), "discarding stale tree");
			return Err(PageError::Stale);
		}
		guard.borrow_mut().tree = Some(CachedTree {
			tree: tree.clone(),
			epoch,
			format,
		});
		Ok(tree)
	}

	/// The cached tree, only if it is valid for the current text and format.
	pub fn live_tree_if_available(&self, backing: &impl Backing) -> Result<Option<SyntaxTree>> {
		let guard = self.guard()?;
		let format = backing.resolve_format()?;
		Ok(guard.borrow().valid_tree(self.epoch(), &format))
	}

	/// Runs `commit` under the text lock iff nothing is unsaved and `tree` is
	/// still the cached tree for the current epoch and format. Returns `None`
	/// when the check fails.
	pub fn commit_if_current<R>(&self, backing: &impl Backing, tree: &SyntaxTree, commit: impl FnOnce(&mut TextState) -> Result<R>) -> Result<Option<R>> {
		let guard = self.guard()?;
		let format = backing.resolve_format()?;
		let epoch = self.epoch();
		let current = {
			let state = guard.borrow();
			state.save_dirty_since.is_none()
				&& state
					.tree
					.as_ref()
					.is_some_and(|cached| cached.epoch == epoch && cached.format.is_equivalent(&format) && SyntaxTree::same_tree(&cached.tree, tree))
		};
		if !current {
			tracing::debug!(page = %self.name, "skipping commit of outdated metadata");
			return Ok(None);
		}
		let mut state = guard.borrow_mut();
		commit(&mut state).map(Some)
	}

	/// Clears the update-dirty mark directly (pages without a pipeline).
	pub fn clear_update_dirty(&self) -> Result<()> {
		let guard = self.guard()?;
		guard.borrow_mut().update_dirty_since = None;
		Ok(())
	}
}
