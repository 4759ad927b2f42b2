//! Syntax layer: parsed page trees and the parser seam.
//!
//! The page cache never looks inside the parser. It hands over text, the
//! resolved [`FormatConfig`] and a cancellation token, and receives an
//! immutable [`SyntaxTree`] that is cheap to clone and share across threads.

/// Formatting configuration that influences parsing.
pub mod format;
/// Parser trait and errors.
pub mod parser;
/// Immutable syntax tree.
pub mod tree;
/// Built-in wiki markup parser.
pub mod wiki;

pub use format::FormatConfig;
pub use parser::{ParseError, Parser};
pub use tree::{NodeKind, SyntaxNode, SyntaxTree};
pub use wiki::WikiParser;
