use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use quire_primitives::CancellationToken;
use quire_syntax::Parser;
use quire_worker::JobExecutor;
use rustc_hash::FxHashMap;

use crate::config::DocumentConfig;
use crate::context::{DocumentContext, QUEUE_PROPERTIES, QUEUE_SYNC};
use crate::error::{PageError, Result};
use crate::format::FormatResolver;
use crate::naming::validate_page_name;
use crate::page::{AliasPage, DocPage, FuncTag, FunctionalPage, Page, WikiPage};
use crate::pipeline::{StageOutcome, UpdateStep};
use crate::store::{MatchTermKind, PageStore};

/// A set of pages over one store, with one background update executor.
///
/// Pages are created on first reference and cached by name. Dropping the
/// document tears it down.
pub struct Document {
	ctx: Arc<DocumentContext>,
	pages: Mutex<FxHashMap<String, Arc<WikiPage>>>,
	functional: Mutex<FxHashMap<FuncTag, Arc<FunctionalPage>>>,
	torn_down: AtomicBool,
}

impl Document {
	/// Opens a document and starts its update executor.
	pub fn new(store: Arc<dyn PageStore>, parser: Arc<dyn Parser>, resolver: Arc<dyn FormatResolver>, config: DocumentConfig) -> Result<Self> {
		config.validate()?;
		let ctx = Arc::new(DocumentContext::new(store, parser, resolver, config));
		ctx.executor.start()?;
		tracing::debug!(language = %ctx.config.language, read_only = ctx.config.read_only, "document opened");
		Ok(Self {
			ctx,
			pages: Mutex::new(FxHashMap::default()),
			functional: Mutex::new(FxHashMap::default()),
			torn_down: AtomicBool::new(false),
		})
	}

	pub fn config(&self) -> &DocumentConfig {
		&self.ctx.config
	}

	pub fn store(&self) -> &Arc<dyn PageStore> {
		&self.ctx.store
	}

	pub fn executor(&self) -> &JobExecutor {
		&self.ctx.executor
	}

	fn ensure_open(&self, name: &str) -> Result<()> {
		if self.torn_down.load(Ordering::SeqCst) {
			return Err(PageError::Invalidated(name.to_string()));
		}
		Ok(())
	}

	/// Returns the page for `name`.
	///
	/// A name that is not itself a stored page but is declared as an alias of
	/// one yields [`Page::Alias`]. Any other valid name yields an ordinary
	/// page, defined or not.
	pub fn page(&self, name: &str) -> Result<Page> {
		validate_page_name(name)?;
		self.ensure_open(name)?;
		let store = &self.ctx.store;
		if !store.is_defined(name)?
			&& let Some(real) = store.resolve_match_term(name, MatchTermKind::ExplicitAlias)?
			&& real != name
		{
			let real = self.wiki_page(&real)?;
			return Ok(Page::Alias(Arc::new(AliasPage::new(name.to_string(), real))));
		}
		self.wiki_page(name).map(Page::Ordinary)
	}

	/// The ordinary page named `name`, without alias resolution.
	pub fn wiki_page(&self, name: &str) -> Result<Arc<WikiPage>> {
		validate_page_name(name)?;
		self.ensure_open(name)?;
		let mut pages = self.pages.lock();
		let page = pages.entry(name.to_string()).or_insert_with(|| {
			tracing::trace!(page = %name, "page created");
			WikiPage::new(name.to_string(), Arc::clone(&self.ctx))
		});
		Ok(Arc::clone(page))
	}

	/// The real page behind `name`: the page itself, or the page it aliases.
	pub fn resolve_page(&self, name: &str) -> Result<Arc<WikiPage>> {
		match self.page(name)? {
			Page::Ordinary(page) => Ok(page),
			Page::Alias(alias) => Ok(Arc::clone(alias.real_page())),
			Page::Functional(page) => Err(PageError::NotFound(page.name().to_string())),
		}
	}

	/// Functional page for `tag`, e.g. `global/TextBlocks`.
	///
	/// # Errors
	///
	/// [`PageError::NotFound`] for unknown tags.
	pub fn functional_page(&self, tag: &str) -> Result<Arc<FunctionalPage>> {
		let tag: FuncTag = tag.parse()?;
		self.ensure_open(tag.as_str())?;
		let mut pages = self.functional.lock();
		let page = pages
			.entry(tag)
			.or_insert_with(|| Arc::new(FunctionalPage::new(tag, Arc::clone(&self.ctx))));
		Ok(Arc::clone(page))
	}

	/// Whether `name` is a stored page or an alias of one.
	pub fn is_defined_link(&self, name: &str) -> Result<bool> {
		let store = &self.ctx.store;
		Ok(store.is_defined(name)? || store.resolve_match_term(name, MatchTermKind::ExplicitAlias)?.is_some())
	}

	/// Saves pending text of `name` and queues a background metadata update.
	pub fn enqueue_update(&self, name: &str) -> Result<()> {
		let page = self.resolve_page(name)?;
		page.save()?;
		page.initiate_update()
	}

	/// Runs a full update of `name` on the synchronous queue and waits for it.
	pub fn update_page_sync(&self, name: &str) -> Result<StageOutcome> {
		let page = self.resolve_page(name)?;
		let token = self.ctx.executor.cancellation_token();
		let queue = self.ctx.queue(QUEUE_SYNC);
		self.ctx.executor.execute(queue, move || page.run_update(UpdateStep::Full, &token))?
	}

	/// Deletes a page from the store and invalidates its cached state.
	pub fn delete_page(&self, name: &str) -> Result<()> {
		let page = self.resolve_page(name)?;
		if page.is_read_only_effective() {
			return Err(PageError::ReadOnly(page.name().to_string()));
		}
		self.pages.lock().remove(page.name());
		page.invalidate();
		self.ctx.store.delete_page(page.name())?;
		tracing::debug!(page = %page.name(), "page deleted");
		Ok(())
	}

	/// Jobs queued on the update executor.
	pub fn job_count(&self) -> usize {
		self.ctx.executor.job_count()
	}

	/// Blocks until the update queues are empty.
	///
	/// Each round submits an empty job behind the update queues and waits for
	/// it. Returns immediately when called from the worker.
	pub fn wait_idle(&self) -> Result<()> {
		let executor = &self.ctx.executor;
		if executor.is_worker_thread() {
			return Ok(());
		}
		let barrier = executor.queue_count() - 1;
		let update_queues = self.ctx.queue(QUEUE_PROPERTIES)..executor.queue_count();
		loop {
			executor.execute(barrier, || ())?;
			if executor.job_count_in(update_queues.clone()) == 0 {
				return Ok(());
			}
		}
	}

	/// Token that dies when the document is torn down.
	pub fn cancellation_token(&self) -> CancellationToken {
		self.ctx.executor.cancellation_token()
	}

	pub fn is_read_only_effective(&self) -> bool {
		self.ctx.is_read_only()
	}

	pub fn read_access_failed(&self) -> bool {
		self.ctx.read_access_failed()
	}

	pub fn write_access_failed(&self) -> bool {
		self.ctx.write_access_failed()
	}

	pub fn set_read_access_failed(&self, failed: bool) {
		if failed != self.ctx.read_access_failed() {
			tracing::warn!(failed, "store read access state changed");
		}
		self.ctx.set_read_access_failed(failed);
	}

	pub fn set_write_access_failed(&self, failed: bool) {
		if failed != self.ctx.write_access_failed() {
			tracing::warn!(failed, "store write access state changed");
		}
		self.ctx.set_write_access_failed(failed);
	}

	/// Hard-ends the executor and invalidates every cached page. Idempotent.
	pub fn teardown(&self) -> Result<()> {
		if self.torn_down.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		let ended = self.ctx.executor.end(true);

		let pages: Vec<_> = self.pages.lock().drain().map(|(_, page)| page).collect();
		for page in &pages {
			page.invalidate();
		}
		let functional: Vec<_> = self.functional.lock().drain().map(|(_, page)| page).collect();
		for page in &functional {
			page.invalidate();
		}
		tracing::debug!(pages = pages.len() + functional.len(), "document torn down");
		ended.map_err(PageError::from)
	}
}

impl Drop for Document {
	fn drop(&mut self) {
		if let Err(err) = self.teardown() {
			tracing::warn!(%err, "document teardown incomplete");
		}
	}
}

impl std::fmt::Debug for Document {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Document")
			.field("language", &self.ctx.config.language)
			.field("pages", &self.pages.lock().len())
			.field("jobs", &self.job_count())
			.finish()
	}
}
