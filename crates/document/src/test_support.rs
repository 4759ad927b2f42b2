use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use quire_primitives::CancellationToken;
use quire_syntax::{FormatConfig, ParseError, Parser, SyntaxTree, WikiParser};
use quire_worker::ExecutorConfig;

use crate::config::DocumentConfig;
use crate::format::PropertyFormatResolver;
use crate::store::{MemoryStore, PageStore};
use crate::Document;

#[derive(Debug, Default)]
struct Gate {
	closed: bool,
	entered: usize,
}

/// Wiki parser that counts calls and can hold parses at their start.
#[derive(Debug)]
pub(crate) struct GatedParser {
	calls: AtomicUsize,
	gate: Mutex<Gate>,
	changed: Condvar,
	honor_token: bool,
}

impl GatedParser {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::with_token_handling(true))
	}

	/// A parser that never polls its token, so staleness is only caught when
	/// the tree is published.
	pub fn oblivious() -> Arc<Self> {
		Arc::new(Self::with_token_handling(false))
	}

	fn with_token_handling(honor_token: bool) -> Self {
		Self {
			calls: AtomicUsize::new(0),
			gate: Mutex::new(Gate::default()),
			changed: Condvar::new(),
			honor_token,
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn close(&self) {
		self.gate.lock().closed = true;
	}

	pub fn open(&self) {
		self.gate.lock().closed = false;
		self.changed.notify_all();
	}

	/// Waits until `count` parses have started.
	pub fn wait_entered(&self, count: usize) {
		let deadline = Instant::now() + Duration::from_secs(5);
		let mut gate = self.gate.lock();
		while gate.entered < count {
			assert!(Instant::now() < deadline, "parser never entered");
			self.changed.wait_for(&mut gate, Duration::from_millis(10));
		}
	}
}

impl Parser for GatedParser {
	fn parse(&self, language: &str, text: &str, format: &FormatConfig, token: &CancellationToken) -> Result<SyntaxTree, ParseError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		{
			let mut gate = self.gate.lock();
			gate.entered += 1;
			self.changed.notify_all();
			while gate.closed {
				self.changed.wait_for(&mut gate, Duration::from_millis(10));
			}
		}
		if self.honor_token {
			WikiParser.parse(language, text, format, token)
		} else {
			WikiParser.parse(language, text, format, &CancellationToken::always_live())
		}
	}
}

pub(crate) struct Fixture {
	pub doc: Document,
	pub store: Arc<MemoryStore>,
	pub parser: Arc<GatedParser>,
}

pub(crate) fn test_config() -> DocumentConfig {
	DocumentConfig {
		lock_timeout_ms: 2_000,
		executor: ExecutorConfig {
			execute_timeout_ms: 10_000,
			shutdown_timeout_ms: 10_000,
			..ExecutorConfig::default()
		},
		..DocumentConfig::default()
	}
}

pub(crate) fn fixture_with(config: DocumentConfig, parser: Arc<GatedParser>) -> Fixture {
	let store = Arc::new(MemoryStore::new());
	let doc = Document::new(
		Arc::clone(&store) as Arc<dyn PageStore>,
		Arc::clone(&parser) as Arc<dyn Parser>,
		Arc::new(PropertyFormatResolver),
		config,
	)
	.unwrap();
	Fixture { doc, store, parser }
}

pub(crate) fn fixture() -> Fixture {
	fixture_with(test_config(), GatedParser::new())
}

/// Stores `pages` and brings each one's metadata up to date.
pub(crate) fn seed(fx: &Fixture, pages: &[(&str, &str)]) {
	for (name, text) in pages {
		fx.store.set_content(name, text).unwrap();
	}
	for (name, _) in pages {
		fx.doc.update_page_sync(name).unwrap();
	}
}
