use std::time::Duration;

use thiserror::Error;

/// A bounded wait elapsed before the awaited resource became available.
///
/// Raised instead of blocking forever. Callers must treat it as a fault of the
/// enclosing operation (a likely deadlock elsewhere), never retry silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("deadlock prevention timeout: {resource} not available within {waited:?}")]
pub struct DeadlockPreventionTimeout {
	/// Name of the lock or executor that was waited on.
	pub resource: String,
	/// How long the caller waited before giving up.
	pub waited: Duration,
}

impl DeadlockPreventionTimeout {
	pub fn new(resource: impl Into<String>, waited: Duration) -> Self {
		Self {
			resource: resource.into(),
			waited,
		}
	}
}

/// The computation was superseded (its token is no longer live).
///
/// This is control flow, not a fault: the result would be discarded anyway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("computation is no longer current")]
pub struct NotCurrent;
