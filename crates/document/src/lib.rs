//! Document cache and metadata update pipeline.
//!
//! A [`Document`] hands out [`Page`]s over a [`PageStore`]. Each page keeps
//! its live text, a parsed tree cached against the text's
//! [`ContentEpoch`](quire_primitives::ContentEpoch) and the resolved format,
//! and dirty marks for saving and for metadata. Metadata (properties, links,
//! todos, alias terms) is derived from the tree in two stages on the
//! document's background executor; every commit re-validates that the tree
//! still matches the text, so the store never holds metadata of text that no
//! longer exists.

pub mod config;
mod context;
mod document;
pub mod error;
pub mod format;
pub mod naming;
pub mod page;
pub mod pipeline;
pub mod store;
#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;
pub mod tree_order;

pub use config::{ConfigError, DocumentConfig};
pub use context::{QUEUE_PROPERTIES, QUEUE_RELATIONS, QUEUE_SYNC};
pub use document::Document;
pub use error::{PageError, Result};
pub use format::{FormatResolver, PropertyFormatResolver};
pub use page::{AliasPage, DirtyFlags, DirtySince, DocPage, FuncTag, FunctionalPage, Page, WikiPage};
pub use pipeline::{StageOutcome, UpdateStep};
pub use store::{MatchTerm, MatchTermKind, MemoryStore, MetadataState, PageStore, PageTimestamps, Relation, StoreError};
pub use tree_order::ChildSortOrder;
