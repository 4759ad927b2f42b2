use quire_primitives::{CancellationToken, NotCurrent};
use thiserror::Error;

use crate::{FormatConfig, SyntaxTree};

/// Errors produced while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
	/// The cancellation token fired; the text being parsed was superseded.
	#[error("parse abandoned: text is no longer current")]
	NotCurrent,
	/// No grammar is registered under the requested language name.
	#[error("unknown markup language: {0}")]
	UnknownLanguage(String),
}

impl From<NotCurrent> for ParseError {
	fn from(_: NotCurrent) -> Self {
		Self::NotCurrent
	}
}

/// Text-to-tree parser seam.
///
/// Implementations must be safe to call concurrently for different texts.
/// They are expected to poll `token` between internal steps and return
/// [`ParseError::NotCurrent`] once it fires; they need not be cancel-fast.
pub trait Parser: Send + Sync {
	fn parse(&self, language: &str, text: &str, format: &FormatConfig, token: &CancellationToken) -> Result<SyntaxTree, ParseError>;
}
