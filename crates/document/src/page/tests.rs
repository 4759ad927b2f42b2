use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use quire_primitives::CancellationToken;
use quire_syntax::wiki::WIKI_LANGUAGE;
use quire_syntax::{NodeKind, Parser, SyntaxTree, WikiParser};

use super::*;
use crate::config::DocumentConfig;
use crate::error::PageError;
use crate::store::PageStore;
use crate::test_support::{GatedParser, fixture, fixture_with, seed, test_config};

fn live() -> CancellationToken {
	CancellationToken::always_live()
}

fn links(tree: &SyntaxTree) -> Vec<String> {
	tree.iter_deep()
		.filter_map(|node| match &node.kind {
			NodeKind::WikiLink { target } => Some(target.clone()),
			_ => None,
		})
		.collect()
}

#[test]
fn tree_is_cached_until_text_changes() {
	let fx = fixture();
	fx.store.set_content("A", "a [[B]]").unwrap();
	let page = fx.doc.wiki_page("A").unwrap();

	let first = page.live_tree(&live()).unwrap();
	let second = page.live_tree(&live()).unwrap();
	assert!(SyntaxTree::same_tree(&first, &second));
	assert_eq!(fx.parser.calls(), 1);

	page.set_editor_text(Some("a [[C]]".into()), true).unwrap();
	assert_eq!(page.live_tree_if_available().unwrap(), None);
	assert_eq!(links(&page.live_tree(&live()).unwrap()), ["C"]);
	assert_eq!(fx.parser.calls(), 2);
}

#[test]
fn empty_text_skips_the_parser() {
	let fx = fixture();
	let page = fx.doc.wiki_page("Empty").unwrap();
	assert!(page.live_tree(&live()).unwrap().is_empty());
	assert_eq!(fx.parser.calls(), 0);
}

#[test]
fn edit_during_parse_cancels_the_parse() {
	let fx = fixture();
	fx.store.set_content("A", "a [[B]]").unwrap();
	let page = fx.doc.wiki_page("A").unwrap();

	fx.parser.close();
	let reader = {
		let page = Arc::clone(&page);
		thread::spawn(move || page.live_tree(&CancellationToken::always_live()))
	};
	fx.parser.wait_entered(1);
	page.set_editor_text(Some("b [[C]]".into()), true).unwrap();
	fx.parser.open();

	assert!(matches!(reader.join().unwrap(), Err(PageError::Stale)));
	assert_eq!(page.live_tree_if_available().unwrap(), None);
	assert_eq!(links(&page.live_tree(&live()).unwrap()), ["C"]);
}

#[test]
fn edit_during_parse_discards_the_result_at_publish() {
	let fx = fixture_with(test_config(), GatedParser::oblivious());
	fx.store.set_content("A", "a [[B]]").unwrap();
	let page = fx.doc.wiki_page("A").unwrap();

	fx.parser.close();
	let reader = {
		let page = Arc::clone(&page);
		thread::spawn(move || page.live_tree(&CancellationToken::always_live()))
	};
	fx.parser.wait_entered(1);
	page.set_editor_text(Some("b [[C]]".into()), true).unwrap();
	fx.parser.open();

	assert!(matches!(reader.join().unwrap(), Err(PageError::Stale)));
	assert_eq!(page.live_tree_if_available().unwrap(), None);
}

#[test]
fn lock_timeout_is_reported_and_leaves_state_intact() {
	let config = DocumentConfig {
		lock_timeout_ms: 50,
		..test_config()
	};
	let fx = fixture_with(config, GatedParser::new());
	fx.store.set_content("A", "text").unwrap();
	let page = fx.doc.wiki_page("A").unwrap();

	let (held_tx, held_rx) = mpsc::channel();
	let (release_tx, release_rx) = mpsc::channel::<()>();
	let holder = {
		let page = Arc::clone(&page);
		thread::spawn(move || {
			let _guard = page.core().guard().unwrap();
			held_tx.send(()).unwrap();
			release_rx.recv().unwrap();
		})
	};
	held_rx.recv().unwrap();

	let started = Instant::now();
	assert!(matches!(page.live_text(), Err(PageError::LockTimeout(_))));
	assert!(started.elapsed() >= Duration::from_millis(50));

	release_tx.send(()).unwrap();
	holder.join().unwrap();
	assert_eq!(page.live_text().unwrap(), "text");
}

#[test]
fn editor_detach_drops_unsaved_text() {
	let fx = fixture();
	fx.store.set_content("A", "stored").unwrap();
	let page = fx.doc.page("A").unwrap();
	let before = page.current_epoch().unwrap();

	page.set_editor_text(Some("draft".into()), true).unwrap();
	assert_eq!(page.live_text().unwrap(), "draft");
	assert!(page.dirty().unwrap().save);
	assert!(page.dirty_since().unwrap().save.is_some());

	page.set_editor_text(None, false).unwrap();
	assert_eq!(page.live_text().unwrap(), "stored");
	assert!(!page.dirty().unwrap().save);
	assert_ne!(page.current_epoch().unwrap(), before);
}

#[test]
fn edits_with_an_editor_attached_stay_in_the_editor() {
	let fx = fixture();
	fx.store.set_content("A", "stored").unwrap();
	let page = fx.doc.page("A").unwrap();

	page.set_editor_text(Some("draft".into()), false).unwrap();
	assert_eq!(page.dirty().unwrap(), DirtyFlags::default());
	page.append_live_text(" more").unwrap();
	assert_eq!(page.live_text().unwrap(), "draft more");
	assert_eq!(fx.store.content("A").unwrap().as_deref(), Some("stored"));

	assert!(page.save().unwrap());
	assert!(!page.save().unwrap());
	assert_eq!(fx.store.content("A").unwrap().as_deref(), Some("draft more"));
}

#[test]
fn edits_without_an_editor_are_written_through() {
	let fx = fixture();
	let page = fx.doc.page("New").unwrap();
	assert_eq!(page.live_text_no_template().unwrap(), None);

	page.append_live_text("first").unwrap();
	page.append_live_text(" second").unwrap();
	assert_eq!(fx.store.content("New").unwrap().as_deref(), Some("first second"));
	assert_eq!(page.live_text_no_template().unwrap().as_deref(), Some("first second"));
	assert!(!page.dirty().unwrap().save);

	page.replace_live_text("other").unwrap();
	assert_eq!(page.live_text().unwrap(), "other");
}

#[test]
fn external_change_is_picked_up_after_mark() {
	let fx = fixture();
	fx.store.set_content("A", "old").unwrap();
	let page = fx.doc.page("A").unwrap();
	assert_eq!(page.live_text().unwrap(), "old");

	fx.store.set_content("A", "new").unwrap();
	assert_eq!(page.live_text().unwrap(), "old");
	page.mark_text_changed().unwrap();
	assert_eq!(page.live_text().unwrap(), "new");
}

#[test]
fn read_only_document_ignores_mutations() {
	let config = DocumentConfig {
		read_only: true,
		..test_config()
	};
	let fx = fixture_with(config, GatedParser::new());
	fx.store.set_content("A", "fixed").unwrap();
	let page = fx.doc.page("A").unwrap();

	assert!(page.is_read_only_effective());
	page.append_live_text(" more").unwrap();
	page.replace_live_text("gone").unwrap();
	assert_eq!(page.live_text().unwrap(), "fixed");
	assert_eq!(page.dirty().unwrap(), DirtyFlags::default());
	assert!(matches!(fx.doc.delete_page("A"), Err(PageError::ReadOnly(_))));
}

#[test]
fn access_failures_make_pages_read_only() {
	let fx = fixture();
	let page = fx.doc.page("A").unwrap();
	assert!(!page.is_read_only_effective());

	fx.doc.set_write_access_failed(true);
	assert!(page.is_read_only_effective());
	fx.doc.set_write_access_failed(false);
	fx.doc.set_read_access_failed(true);
	assert!(page.is_read_only_effective());
	fx.doc.set_read_access_failed(false);
	assert!(!page.is_read_only_effective());
}

#[test]
fn alias_page_delegates_to_its_real_page() {
	let fx = fixture();
	seed(&fx, &[("Real", "[alias: Nick]\nsee [[X]]")]);

	let alias = fx.doc.page("Nick").unwrap();
	assert!(alias.is_alias());
	assert_eq!(alias.name(), "Nick");
	assert_eq!(alias.title(), "Nick");
	assert_eq!(alias.wiki_page().unwrap().name(), "Real");
	assert_eq!(alias.live_text().unwrap(), "[alias: Nick]\nsee [[X]]");

	alias.set_editor_text(Some("edited".into()), true).unwrap();
	let real = fx.doc.page("Real").unwrap();
	assert!(!real.is_alias());
	assert_eq!(real.live_text().unwrap(), "edited");
	assert_eq!(real.current_epoch().unwrap(), alias.current_epoch().unwrap());
	assert!(real.dirty().unwrap().save);
}

#[test]
fn invalidating_an_alias_keeps_the_real_page() {
	let fx = fixture();
	seed(&fx, &[("Real", "[alias: Nick]\nbody")]);

	let alias = fx.doc.page("Nick").unwrap();
	alias.invalidate();
	assert!(alias.is_invalid());
	assert!(matches!(alias.live_text(), Err(PageError::Invalidated(name)) if name == "Nick"));

	let real = fx.doc.page("Real").unwrap();
	assert!(!real.is_invalid());
	assert_eq!(real.live_text().unwrap(), "[alias: Nick]\nbody");
	assert!(!fx.doc.page("Nick").unwrap().is_invalid());
}

#[test]
fn invalidated_page_rejects_access() {
	let fx = fixture();
	fx.store.set_content("A", "text").unwrap();
	let page = fx.doc.wiki_page("A").unwrap();
	assert_eq!(page.live_text().unwrap(), "text");

	fx.doc.delete_page("A").unwrap();
	assert!(page.is_invalid());
	assert!(matches!(page.live_text(), Err(PageError::Invalidated(_))));
	assert_eq!(fx.store.content("A").unwrap(), None);

	let fresh = fx.doc.wiki_page("A").unwrap();
	assert!(!fresh.is_invalid());
	assert_eq!(fresh.live_text().unwrap(), "");
}

#[test]
fn anchors_and_timestamps() {
	let fx = fixture();
	fx.store.set_content("A", "anchor: top\ntext\nanchor: bottom").unwrap();
	let page = fx.doc.wiki_page("A").unwrap();
	assert_eq!(page.anchors().unwrap(), ["top", "bottom"]);

	let stored = fx.store.timestamps("A").unwrap().unwrap();
	assert_eq!(page.timestamps().unwrap(), stored);

	let before = chrono::Utc::now();
	let missing = fx.doc.wiki_page("Missing").unwrap().timestamps().unwrap();
	assert!(missing.modified >= before);
	assert_eq!(missing.created, missing.modified);
}

#[test]
fn functional_page_stores_plain_text_in_a_data_block() {
	let fx = fixture();
	let page = fx.doc.functional_page("wiki/PWL").unwrap();
	assert_eq!(page.tag(), FuncTag::WikiPersonalWordList);
	assert_eq!(page.title(), "<Wiki personal word list>");
	assert_eq!(page.live_text().unwrap(), "");

	page.replace_live_text("quire\n[[NotALink]]").unwrap();
	assert_eq!(fx.store.data_block("wiki/PWL").unwrap().as_deref(), Some("quire\n[[NotALink]]"));
	assert_eq!(page.dirty().unwrap(), DirtyFlags::default());

	let tree = page.live_tree(&live()).unwrap();
	assert_eq!(tree, SyntaxTree::plain("quire\n[[NotALink]]"));
	assert!(page.format().unwrap().no_format);
	assert_eq!(fx.parser.calls(), 0);

	page.replace_live_text("").unwrap();
	assert_eq!(fx.store.data_block("wiki/PWL").unwrap(), None);
}

#[test]
fn functional_tags_are_validated() {
	let fx = fixture();
	assert!(matches!(fx.doc.functional_page("wiki/Nope"), Err(PageError::NotFound(_))));
	for tag in FuncTag::ALL {
		assert_eq!(FuncTag::from_tag(tag.as_str()), Some(tag));
		assert!(fx.doc.functional_page(tag.as_str()).is_ok());
	}
}

#[test]
fn global_functional_pages_stay_writable() {
	let config = DocumentConfig {
		read_only: true,
		..test_config()
	};
	let fx = fixture_with(config, GatedParser::new());

	let local = fx.doc.functional_page("wiki/CCBlacklist").unwrap();
	local.replace_live_text("FooBar").unwrap();
	assert_eq!(fx.store.data_block("wiki/CCBlacklist").unwrap(), None);

	let global = fx.doc.functional_page("global/CCBlacklist").unwrap();
	assert!(!global.is_read_only_effective());
	global.replace_live_text("FooBar").unwrap();
	assert_eq!(fx.store.data_block("global/CCBlacklist").unwrap().as_deref(), Some("FooBar"));
}

#[derive(Debug, Clone)]
enum Op {
	Append(&'static str),
	Replace(&'static str),
	Attach(&'static str),
	Detach,
	MarkChanged,
	Tree,
}

fn op() -> impl Strategy<Value = Op> {
	let snippet = prop::sample::select(vec!["a [[B]]", " FooBar", "\n+ Head\n", "todo: x [p: 1]", "anchor: here\n", ""]);
	prop_oneof![
		snippet.clone().prop_map(Op::Append),
		snippet.clone().prop_map(Op::Replace),
		snippet.prop_map(Op::Attach),
		Just(Op::Detach),
		Just(Op::MarkChanged),
		Just(Op::Tree),
	]
}

fn expected_tree(page: &WikiPage) -> SyntaxTree {
	WikiParser
		.parse(WIKI_LANGUAGE, &page.live_text().unwrap(), &page.format().unwrap(), &live())
		.unwrap()
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(32))]

	#[test]
	fn cached_tree_always_matches_live_text(ops in prop::collection::vec(op(), 1..16)) {
		let fx = fixture();
		fx.store.set_content("P", "start [[Q]]").unwrap();
		let page = fx.doc.wiki_page("P").unwrap();

		for op in ops {
			match op {
				Op::Append(text) => page.append_live_text(text).unwrap(),
				Op::Replace(text) => page.replace_live_text(text).unwrap(),
				Op::Attach(text) => page.set_editor_text(Some(text.to_string()), true).unwrap(),
				Op::Detach => page.set_editor_text(None, false).unwrap(),
				Op::MarkChanged => page.mark_text_changed().unwrap(),
				Op::Tree => {
					let tree = page.live_tree(&live()).unwrap();
					prop_assert_eq!(tree, expected_tree(&page));
				}
			}
			if let Some(cached) = page.live_tree_if_available().unwrap() {
				prop_assert_eq!(cached, expected_tree(&page));
			}
		}
	}
}
