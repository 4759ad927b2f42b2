//! Two-stage metadata refresh.
//!
//! Stage A replaces the stored property table and marks the page
//! `PropertiesProcessed`. Stage B replaces links, todos and alias terms and
//! marks it `UpToDate`. The tables are written whenever the stage's token is
//! still live. The state mark is only set if the tree the tables came from is
//! still the page's cached tree, nothing is unsaved, and the format did not
//! change; otherwise the stage reports [`StageOutcome::Outdated`] and the
//! page stays update-dirty.
//!
//! Background updates run stage A on the properties queue; a committed
//! stage A enqueues stage B on the relations queue.

use std::sync::Arc;

use quire_primitives::CancellationToken;
use quire_syntax::{NodeKind, SyntaxTree};
use quire_worker::ExecutorError;
use rustc_hash::FxHashSet;

use crate::context::{QUEUE_PROPERTIES, QUEUE_RELATIONS};
use crate::error::{PageError, Result};
use crate::naming::is_valid_page_name;
use crate::page::{DocPage, WikiPage};
use crate::store::{MatchTerm, MatchTermKind, MetadataState, Properties, Relation, StoreError};

/// Property key declaring explicit aliases.
pub const ALIAS_KEY: &str = "alias";

/// Outdated background updates are retried this many times.
const MAX_ATTEMPTS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStep {
	/// Stage A, then stage B.
	Full,
	/// Stage A; requires the stored state `Dirty`.
	Properties,
	/// Stage B; requires the stored state `PropertiesProcessed`.
	Relations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
	Committed,
	/// The text, tree or format moved on before the commit.
	Outdated,
	/// Nothing to do for this page in its current state.
	NotApplicable,
}

/// Runs `step` against the page's current tree.
pub(crate) fn run_update(page: &WikiPage, step: UpdateStep, token: &CancellationToken) -> Result<StageOutcome> {
	if page.is_read_only_effective() || !page.is_defined()? {
		return Ok(StageOutcome::NotApplicable);
	}
	match run_steps(page, step, token) {
		Err(PageError::Stale | PageError::Store(StoreError::Undefined(_))) => {
			tracing::debug!(page = %page.name(), ?step, "update abandoned");
			Ok(StageOutcome::NotApplicable)
		}
		other => other,
	}
}

fn run_steps(page: &WikiPage, step: UpdateStep, token: &CancellationToken) -> Result<StageOutcome> {
	match step {
		UpdateStep::Properties if page.metadata_state()? != MetadataState::Dirty => return Ok(StageOutcome::NotApplicable),
		UpdateStep::Relations if page.metadata_state()? != MetadataState::PropertiesProcessed => {
			return Ok(StageOutcome::NotApplicable);
		}
		_ => {}
	}

	let epoch = page.current_epoch()?;
	let format = page.format()?;
	let tree = page.live_tree(token)?;
	if page.current_epoch()? != epoch {
		return Ok(StageOutcome::Outdated);
	}

	match step {
		UpdateStep::Properties => refresh_properties(page, &tree, token),
		UpdateStep::Relations => refresh_relations(page, &tree, token),
		UpdateStep::Full => {
			let properties = refresh_properties(page, &tree, token)?;
			if page.current_epoch()? != epoch {
				return Ok(StageOutcome::Outdated);
			}
			if !page.format()?.is_equivalent(&format) {
				tracing::debug!(page = %page.name(), "format changed by new properties");
				page.initiate_update()?;
				return Ok(StageOutcome::Outdated);
			}
			let relations = refresh_relations(page, &tree, token)?;
			Ok(if properties == StageOutcome::Committed { relations } else { StageOutcome::Outdated })
		}
	}
}

fn is_todo(kind: &NodeKind) -> bool {
	matches!(kind, NodeKind::TodoEntry { .. })
}

/// Property declarations outside todo entries, in text order.
fn extract_properties(tree: &SyntaxTree) -> Properties {
	tree.iter_deep_skipping(is_todo)
		.filter_map(|node| match &node.kind {
			NodeKind::Property { entries } => Some(entries.iter().cloned()),
			_ => None,
		})
		.flatten()
		.collect()
}

/// Stage A.
pub(crate) fn refresh_properties(page: &WikiPage, tree: &SyntaxTree, token: &CancellationToken) -> Result<StageOutcome> {
	let properties = extract_properties(tree);
	let store = page.store();
	token.check()?;
	store.update_properties(page.name(), &properties)?;
	let committed = page
		.core()
		.commit_if_current(page, tree, |_| Ok(store.set_metadata_state(page.name(), MetadataState::PropertiesProcessed)?))?;
	Ok(match committed {
		Some(()) => {
			tracing::trace!(page = %page.name(), count = properties.len(), "properties committed");
			StageOutcome::Committed
		}
		None => StageOutcome::Outdated,
	})
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Extracted {
	relations: Vec<Relation>,
	todos: Vec<String>,
	terms: Vec<MatchTerm>,
}

fn extract_relations(page: &str, tree: &SyntaxTree, heading_depth: u8) -> Extracted {
	let mut out = Extracted::default();
	let mut seen_targets = FxHashSet::default();
	let mut seen_todos = FxHashSet::default();

	for node in tree.iter_deep() {
		match &node.kind {
			NodeKind::WikiLink { target } => {
				if seen_targets.insert(target.as_str()) {
					out.relations.push(Relation {
						target: target.clone(),
						pos: node.pos,
					});
				}
			}
			NodeKind::TodoEntry { key, delimiter, value } => {
				let todo = format!("{key}{delimiter}{value}");
				if seen_todos.insert(todo.clone()) {
					out.todos.push(todo);
				}
			}
			NodeKind::Heading { level } if *level <= heading_depth => {
				let title = node.text.trim();
				if !title.is_empty() {
					out.terms.push(MatchTerm {
						term: title.to_string(),
						kind: MatchTermKind::Heading,
						page: page.to_string(),
						pos: Some(node.pos),
					});
				}
			}
			_ => {}
		}
	}

	for node in tree.iter_deep_skipping(is_todo) {
		let NodeKind::Property { entries } = &node.kind else { continue };
		for (_, alias) in entries.iter().filter(|(key, _)| key == ALIAS_KEY) {
			if !is_valid_page_name(alias) {
				tracing::debug!(page, alias = %alias, "ignoring invalid alias");
				continue;
			}
			out.terms.push(MatchTerm {
				term: alias.clone(),
				kind: MatchTermKind::ExplicitAlias,
				page: page.to_string(),
				pos: Some(node.pos),
			});
		}
	}
	out
}

/// Stage B.
pub(crate) fn refresh_relations(page: &WikiPage, tree: &SyntaxTree, token: &CancellationToken) -> Result<StageOutcome> {
	let extracted = extract_relations(page.name(), tree, page.ctx().config.headings_as_aliases_depth);
	let store = page.store();
	token.check()?;
	store.update_child_relations(page.name(), &extracted.relations)?;
	store.update_todos(page.name(), &extracted.todos)?;
	store.update_match_terms(page.name(), &[MatchTermKind::ExplicitAlias, MatchTermKind::Heading], &extracted.terms)?;
	let committed = page.core().commit_if_current(page, tree, |state| {
		store.set_metadata_state(page.name(), MetadataState::UpToDate)?;
		state.update_dirty_since = None;
		Ok(())
	})?;
	Ok(match committed {
		Some(()) => {
			tracing::trace!(page = %page.name(), relations = extracted.relations.len(), "relations committed");
			StageOutcome::Committed
		}
		None => StageOutcome::Outdated,
	})
}

/// Queues a background update of `page`.
pub(crate) fn schedule_update(page: &WikiPage) -> Result<()> {
	if page.is_read_only_effective() {
		return Ok(());
	}
	let Some(page) = page.arc() else {
		return Ok(());
	};
	enqueue_stage(page, UpdateStep::Properties, 0)
}

fn enqueue_stage(page: Arc<WikiPage>, step: UpdateStep, attempt: u8) -> Result<()> {
	let ctx = Arc::clone(page.ctx());
	let queue = match step {
		UpdateStep::Relations => ctx.queue(QUEUE_RELATIONS),
		UpdateStep::Full | UpdateStep::Properties => ctx.queue(QUEUE_PROPERTIES),
	};
	tracing::trace!(page = %page.name(), ?step, queue, attempt, "update queued");

	let submitted = ctx.executor.execute_async_with_cancellation(queue, move |token| {
		if let Err(err) = run_stage_job(&page, step, attempt, token) {
			if err.is_control_flow() {
				tracing::debug!(page = %page.name(), ?step, %err, "update job stopped");
			} else {
				tracing::warn!(page = %page.name(), ?step, %err, "update job failed");
			}
		}
	});
	match submitted {
		Ok(_) => Ok(()),
		Err(ExecutorError::Terminated) => {
			tracing::debug!(?step, "executor terminated; update dropped");
			Ok(())
		}
		Err(err) => Err(err.into()),
	}
}

fn run_stage_job(page: &Arc<WikiPage>, step: UpdateStep, attempt: u8, token: &CancellationToken) -> Result<()> {
	if page.is_invalid() {
		return Ok(());
	}
	match page.run_update(step, token)? {
		StageOutcome::Committed | StageOutcome::NotApplicable => {
			if step == UpdateStep::Properties && page.metadata_state()? == MetadataState::PropertiesProcessed {
				enqueue_stage(Arc::clone(page), UpdateStep::Relations, attempt)?;
			}
		}
		StageOutcome::Outdated => {
			let dirty = page.dirty()?;
			if dirty.update && !dirty.save && attempt + 1 < MAX_ATTEMPTS && token.is_live() {
				enqueue_stage(Arc::clone(page), UpdateStep::Properties, attempt + 1)?;
			}
		}
	}
	Ok(())
}
