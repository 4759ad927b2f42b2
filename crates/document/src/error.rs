use quire_primitives::{DeadlockPreventionTimeout, NotCurrent};
use quire_syntax::ParseError;
use quire_worker::{ExecutorError, JobFailure};
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

pub type Result<T, E = PageError> = std::result::Result<T, E>;

/// Errors raised by page and document operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PageError {
	/// The text changed while derived data was being computed. Callers
	/// treat this as "try again later", not as a fault.
	#[error("computation is no longer current")]
	Stale,
	/// A page lock was not obtained in time.
	#[error(transparent)]
	LockTimeout(DeadlockPreventionTimeout),
	/// A synchronous executor call or an executor shutdown did not finish in
	/// time.
	#[error("executor wait exceeded: {0}")]
	ExecutorTimeout(DeadlockPreventionTimeout),
	#[error(transparent)]
	JobFailed(#[from] JobFailure),
	/// The update executor is torn down or misconfigured.
	#[error(transparent)]
	Executor(ExecutorError),
	#[error("page not found: {0}")]
	NotFound(String),
	#[error("invalid page name: {0:?}")]
	InvalidPageName(String),
	/// The page was deleted or its document torn down.
	#[error("page {0} was invalidated")]
	Invalidated(String),
	#[error("page {0} is read-only")]
	ReadOnly(String),
	#[error("no parser for language {0:?}")]
	UnknownLanguage(String),
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error(transparent)]
	Config(#[from] ConfigError),
}

impl PageError {
	/// True for outcomes that are normal control flow rather than faults:
	/// staleness, missing pages and invalidated pages.
	pub fn is_control_flow(&self) -> bool {
		matches!(self, Self::Stale | Self::NotFound(_) | Self::Invalidated(_))
	}
}

impl From<NotCurrent> for PageError {
	fn from(_: NotCurrent) -> Self {
		Self::Stale
	}
}

impl From<DeadlockPreventionTimeout> for PageError {
	fn from(err: DeadlockPreventionTimeout) -> Self {
		Self::LockTimeout(err)
	}
}

impl From<ParseError> for PageError {
	fn from(err: ParseError) -> Self {
		match err {
			ParseError::NotCurrent => Self::Stale,
			ParseError::UnknownLanguage(language) => Self::UnknownLanguage(language),
		}
	}
}

impl From<ExecutorError> for PageError {
	fn from(err: ExecutorError) -> Self {
		match err {
			ExecutorError::Timeout(timeout) => Self::ExecutorTimeout(timeout),
			ExecutorError::JobFailed(failure) => Self::JobFailed(failure),
			other => Self::Executor(other),
		}
	}
}
