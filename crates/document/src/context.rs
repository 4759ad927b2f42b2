use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use quire_primitives::BoundedLock;
use quire_syntax::Parser;
use quire_worker::JobExecutor;

use crate::config::DocumentConfig;
use crate::format::FormatResolver;
use crate::store::PageStore;

/// Queue for synchronous document calls.
pub const QUEUE_SYNC: usize = 0;
/// Queue for stage A (properties) jobs.
pub const QUEUE_PROPERTIES: usize = 1;
/// Queue for stage B (relations, todos, alias terms) jobs.
pub const QUEUE_RELATIONS: usize = 2;

/// Collaborators and flags shared by a document and all of its pages.
///
/// Passed explicitly to every page; nothing here is process-global.
pub(crate) struct DocumentContext {
	pub store: Arc<dyn PageStore>,
	pub parser: Arc<dyn Parser>,
	pub resolver: Arc<dyn FormatResolver>,
	pub config: DocumentConfig,
	pub executor: JobExecutor,
	read_access_failed: AtomicBool,
	write_access_failed: AtomicBool,
}

impl DocumentContext {
	pub fn new(store: Arc<dyn PageStore>, parser: Arc<dyn Parser>, resolver: Arc<dyn FormatResolver>, config: DocumentConfig) -> Self {
		let executor = JobExecutor::new(config.executor.clone());
		Self {
			store,
			parser,
			resolver,
			config,
			executor,
			read_access_failed: AtomicBool::new(false),
			write_access_failed: AtomicBool::new(false),
		}
	}

	/// Document-wide read-only state: configured, or after a failed read or
	/// write against the store.
	pub fn is_read_only(&self) -> bool {
		self.config.read_only || self.read_access_failed() || self.write_access_failed()
	}

	pub fn read_access_failed(&self) -> bool {
		self.read_access_failed.load(Ordering::SeqCst)
	}

	pub fn write_access_failed(&self) -> bool {
		self.write_access_failed.load(Ordering::SeqCst)
	}

	pub fn set_read_access_failed(&self, failed: bool) {
		self.read_access_failed.store(failed, Ordering::SeqCst);
	}

	pub fn set_write_access_failed(&self, failed: bool) {
		self.write_access_failed.store(failed, Ordering::SeqCst);
	}

	/// Clamps a logical queue to the configured queue count.
	pub fn queue(&self, queue: usize) -> usize {
		queue.min(self.executor.queue_count() - 1)
	}

	pub fn new_lock<T>(&self, name: &'static str, value: T) -> BoundedLock<T> {
		match self.config.lock_timeout() {
			Some(max_wait) => BoundedLock::new(name, max_wait, value),
			None => BoundedLock::unbounded(name, value),
		}
	}
}
