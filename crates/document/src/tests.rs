use pretty_assertions::assert_eq;
use quire_primitives::CancellationToken;
use quire_worker::ExecutorState;

use crate::config::DocumentConfig;
use crate::error::PageError;
use crate::page::DocPage;
use crate::pipeline::{StageOutcome, UpdateStep};
use crate::store::{MatchTermKind, MetadataState, PageStore, Relation};
use crate::test_support::{GatedParser, fixture, fixture_with, seed, test_config};

fn targets(relations: &[Relation]) -> Vec<&str> {
	relations.iter().map(|r| r.target.as_str()).collect()
}

#[test]
fn relations_follow_text_edits() {
	let fx = fixture();
	fx.store.set_content("A", "a [[B]]").unwrap();
	let page = fx.doc.page("A").unwrap();

	page.write_to_store().unwrap();
	fx.doc.wait_idle().unwrap();
	assert_eq!(targets(&fx.store.child_relations("A").unwrap()), ["B"]);
	assert_eq!(fx.store.metadata_state("A").unwrap(), MetadataState::UpToDate);
	assert!(!page.dirty().unwrap().update);

	page.replace_live_text("a [[C]]").unwrap();
	fx.doc.wait_idle().unwrap();
	assert_eq!(targets(&fx.store.child_relations("A").unwrap()), ["C"]);
	assert_eq!(fx.store.parent_relations("B").unwrap(), Vec::<String>::new());
	assert_eq!(fx.store.parent_relations("C").unwrap(), ["A"]);
}

#[test]
fn stages_are_idempotent() {
	let fx = fixture();
	seed(&fx, &[("A", "[color: red]\n[[B]] [[C]]\ntodo: call [[B]]\ntodo: call [[B]]")]);
	let snapshot = || {
		(
			fx.store.properties("A").unwrap(),
			fx.store.child_relations("A").unwrap(),
			fx.store.todos("A").unwrap(),
			fx.store.metadata_state("A").unwrap(),
		)
	};
	let first = snapshot();
	assert_eq!(first.2, ["todo: call [[B]]"]);
	assert_eq!(first.3, MetadataState::UpToDate);

	assert_eq!(fx.doc.update_page_sync("A").unwrap(), StageOutcome::Committed);
	assert_eq!(snapshot(), first);

	let page = fx.doc.wiki_page("A").unwrap();
	let token = CancellationToken::always_live();
	assert_eq!(page.run_update(UpdateStep::Properties, &token).unwrap(), StageOutcome::NotApplicable);
	assert_eq!(page.run_update(UpdateStep::Relations, &token).unwrap(), StageOutcome::NotApplicable);
	assert_eq!(snapshot(), first);
}

#[test]
fn stages_can_run_separately() {
	let fx = fixture();
	fx.store.set_content("A", "[k: v]\n[[B]]").unwrap();
	let page = fx.doc.wiki_page("A").unwrap();
	let token = CancellationToken::always_live();

	assert_eq!(page.run_update(UpdateStep::Relations, &token).unwrap(), StageOutcome::NotApplicable);
	assert_eq!(page.run_update(UpdateStep::Properties, &token).unwrap(), StageOutcome::Committed);
	assert_eq!(page.metadata_state().unwrap(), MetadataState::PropertiesProcessed);
	assert_eq!(page.properties().unwrap(), [("k".to_string(), "v".to_string())]);
	assert!(page.child_relations().unwrap().is_empty());

	assert_eq!(page.run_update(UpdateStep::Relations, &token).unwrap(), StageOutcome::Committed);
	assert_eq!(page.metadata_state().unwrap(), MetadataState::UpToDate);
	assert_eq!(targets(&page.child_relations().unwrap()), ["B"]);
}

#[test]
fn unsaved_text_updates_tables_but_not_the_state() {
	let fx = fixture();
	seed(&fx, &[("A", "[color: red]\n[[B]]")]);
	let page = fx.doc.wiki_page("A").unwrap();

	page.set_editor_text(Some("[color: blue]\n[[C]]".into()), true).unwrap();
	assert_eq!(fx.doc.update_page_sync("A").unwrap(), StageOutcome::Outdated);
	assert_eq!(page.properties().unwrap(), [("color".to_string(), "blue".to_string())]);
	assert_eq!(targets(&page.child_relations().unwrap()), ["C"]);
	assert!(page.dirty().unwrap().update);

	assert!(page.save().unwrap());
	assert_eq!(fx.store.metadata_state("A").unwrap(), MetadataState::Dirty);
	assert_eq!(fx.doc.update_page_sync("A").unwrap(), StageOutcome::Committed);
	assert_eq!(fx.store.metadata_state("A").unwrap(), MetadataState::UpToDate);
	assert!(!page.dirty().unwrap().update);
}

#[test]
fn properties_stage_writes_tables_while_unsaved() {
	let fx = fixture();
	fx.store.set_content("A", "[k: v]").unwrap();
	let page = fx.doc.wiki_page("A").unwrap();
	page.set_editor_text(Some("[k: w]".into()), true).unwrap();

	let outcome = page.run_update(UpdateStep::Properties, &CancellationToken::always_live()).unwrap();
	assert_eq!(outcome, StageOutcome::Outdated);
	assert_eq!(page.properties().unwrap(), [("k".to_string(), "w".to_string())]);
	assert_eq!(page.metadata_state().unwrap(), MetadataState::Dirty);
}

#[test]
fn undefined_and_read_only_pages_are_not_updated() {
	let fx = fixture();
	let token = CancellationToken::always_live();
	let missing = fx.doc.wiki_page("Missing").unwrap();
	assert_eq!(missing.run_update(UpdateStep::Full, &token).unwrap(), StageOutcome::NotApplicable);

	let config = DocumentConfig {
		read_only: true,
		..test_config()
	};
	let ro = fixture_with(config, GatedParser::new());
	ro.store.set_content("A", "[[B]]").unwrap();
	let page = ro.doc.wiki_page("A").unwrap();
	assert_eq!(page.run_update(UpdateStep::Full, &token).unwrap(), StageOutcome::NotApplicable);
	assert_eq!(ro.parser.calls(), 0);
}

#[test]
fn dead_token_abandons_the_update() {
	let fx = fixture();
	fx.store.set_content("A", "[[B]]").unwrap();
	let page = fx.doc.wiki_page("A").unwrap();
	let dead = CancellationToken::predicate(|| false);

	assert_eq!(page.run_update(UpdateStep::Full, &dead).unwrap(), StageOutcome::NotApplicable);
	assert_eq!(page.metadata_state().unwrap(), MetadataState::Dirty);
	assert_eq!(page.live_tree_if_available().unwrap(), None);
}

#[test]
fn alias_and_heading_terms_are_registered() {
	let config = DocumentConfig {
		headings_as_aliases_depth: 1,
		..test_config()
	};
	let fx = fixture_with(config, GatedParser::new());
	let page = fx.doc.page("Home").unwrap();
	page.replace_live_text("+ Welcome\n++ Details\n[alias: Start; bad|alias]").unwrap();
	fx.doc.wait_idle().unwrap();

	let mut terms: Vec<_> = fx
		.store
		.match_terms("Home")
		.unwrap()
		.into_iter()
		.map(|term| (term.kind, term.term))
		.collect();
	terms.sort_by(|a, b| a.1.cmp(&b.1));
	assert_eq!(
		terms,
		[
			(MatchTermKind::PageName, "Home".to_string()),
			(MatchTermKind::ExplicitAlias, "Start".to_string()),
			(MatchTermKind::Heading, "Welcome".to_string()),
		]
	);
	assert_eq!(fx.store.resolve_match_term("Start", MatchTermKind::ExplicitAlias).unwrap().as_deref(), Some("Home"));
}

#[test]
fn format_change_from_properties_reinitiates_the_update() {
	let fx = fixture();
	seed(&fx, &[("A", "FooBar")]);
	assert_eq!(targets(&fx.store.child_relations("A").unwrap()), ["FooBar"]);

	let page = fx.doc.page("A").unwrap();
	page.replace_live_text("FooBar\n[camelCaseWordsEnabled: false]").unwrap();
	fx.doc.wait_idle().unwrap();

	assert!(!page.format().unwrap().camel_case_links);
	assert!(fx.store.child_relations("A").unwrap().is_empty());
	assert_eq!(fx.store.metadata_state("A").unwrap(), MetadataState::UpToDate);
}

#[test]
fn property_or_global_falls_back_to_global_declarations() {
	let fx = fixture();
	seed(&fx, &[("Settings", "[global.child_sort_order: natural]"), ("A", "[child_sort_order: descending]"), ("B", "")]);

	let a = fx.doc.wiki_page("A").unwrap();
	let b = fx.doc.wiki_page("B").unwrap();
	assert_eq!(a.property_or_global("child_sort_order").unwrap().as_deref(), Some("descending"));
	assert_eq!(b.property_or_global("child_sort_order").unwrap().as_deref(), Some("natural"));
	assert_eq!(b.property_or_global("missing").unwrap(), None);
}

#[test]
fn children_follow_sort_order_and_positions() {
	let fx = fixture();
	seed(
		&fx,
		&[
			("Parent", "[[Zeta]] [[alpha]] [[Mid]] [[Parent]] [[Ghost]]"),
			("Zeta", ""),
			("alpha", ""),
			("Mid", "[tree_position: 1]\n[[Parent]] [[Leaf]]"),
			("Leaf", ""),
		],
	);

	assert_eq!(fx.doc.child_relations_tree_order("Parent", true).unwrap(), ["Mid", "alpha", "Zeta"]);
	assert_eq!(fx.doc.child_relations_tree_order("Parent", false).unwrap(), ["Mid", "alpha", "Ghost", "Zeta"]);

	let flat = fx.doc.flat_tree("Parent", false).unwrap();
	assert_eq!(
		flat,
		[
			("Parent".to_string(), 0),
			("Mid".to_string(), 1),
			("Leaf".to_string(), 2),
			("alpha".to_string(), 1),
			("Zeta".to_string(), 1),
		]
	);

	let parent = fx.doc.page("Parent").unwrap();
	parent
		.replace_live_text("[child_sort_order: natural]\n[[Zeta]] [[alpha]] [[Mid]] [[Parent]] [[Ghost]]")
		.unwrap();
	fx.doc.wait_idle().unwrap();
	assert_eq!(fx.doc.child_relations_tree_order("Parent", true).unwrap(), ["Mid", "Zeta", "alpha"]);
}

#[test]
fn flat_tree_lists_aliased_pages_once() {
	let fx = fixture();
	seed(&fx, &[("Root", "[[Nick]] [[Real]]"), ("Real", "[alias: Nick]")]);

	assert_eq!(fx.doc.flat_tree("Root", false).unwrap(), [("Root".to_string(), 0), ("Nick".to_string(), 1)]);
	assert_eq!(fx.doc.flat_tree("Root", true).unwrap(), [("Root".to_string(), 0), ("Real".to_string(), 1)]);
}

#[test]
fn teardown_invalidates_pages_and_stops_the_executor() {
	let fx = fixture();
	fx.store.set_content("A", "text").unwrap();
	let page = fx.doc.page("A").unwrap();
	assert_eq!(fx.doc.executor().state(), ExecutorState::Running);

	fx.doc.teardown().unwrap();
	assert!(page.is_invalid());
	assert!(matches!(page.live_text(), Err(PageError::Invalidated(_))));
	assert!(matches!(fx.doc.page("A"), Err(PageError::Invalidated(_))));
	assert_eq!(fx.doc.executor().state(), ExecutorState::Stopped);
	assert!(!fx.doc.cancellation_token().is_live());
	fx.doc.teardown().unwrap();
}

#[test]
fn invalid_names_are_rejected() {
	let fx = fixture();
	assert!(matches!(fx.doc.page("a|b"), Err(PageError::InvalidPageName(_))));
	assert!(matches!(fx.doc.page(""), Err(PageError::InvalidPageName(_))));
}

#[test]
fn job_count_drains_to_zero() {
	let fx = fixture();
	for i in 0..5 {
		let name = format!("P{i}");
		fx.store.set_content(&name, "[[X]]").unwrap();
		fx.doc.enqueue_update(&name).unwrap();
	}
	fx.doc.wait_idle().unwrap();
	assert_eq!(fx.doc.job_count(), 0);
	for i in 0..5 {
		assert_eq!(fx.store.metadata_state(&format!("P{i}")).unwrap(), MetadataState::UpToDate);
	}
}
