use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::NotCurrent;

type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
enum Liveness {
	Always,
	Predicate { check: Predicate, inner: Option<Arc<CancellationToken>> },
	Owner(ThreadId),
}

/// Cooperative cancellation token.
///
/// Long-running work polls [`Self::is_live`] (or [`Self::check`]) at safe
/// points and abandons itself once the token reports dead. Nothing is ever
/// preempted.
///
/// Three flavors exist:
/// - always live, for synchronous callers that never cancel
/// - predicate, live while a caller-supplied condition holds (e.g. "the epoch
///   is unchanged"), optionally also requiring an inner token
/// - owner, live only when polled from one specific thread; a restarted worker
///   runs on a new thread, so callbacks captured by the old one die
#[derive(Clone)]
pub struct CancellationToken {
	liveness: Liveness,
}

impl CancellationToken {
	/// A token that never fires.
	pub const fn always_live() -> Self {
		Self { liveness: Liveness::Always }
	}

	/// A token live while `check` returns true.
	pub fn predicate(check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
		Self {
			liveness: Liveness::Predicate {
				check: Arc::new(check),
				inner: None,
			},
		}
	}

	/// A token live only on the thread `owner`.
	pub const fn owner(owner: ThreadId) -> Self {
		Self {
			liveness: Liveness::Owner(owner),
		}
	}

	/// A token live only on the calling thread.
	pub fn owner_current() -> Self {
		Self::owner(thread::current().id())
	}

	/// Composes `self` with an extra condition; the result is live only while
	/// both hold.
	pub fn and_predicate(self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
		if matches!(self.liveness, Liveness::Always) {
			return Self::predicate(check);
		}
		Self {
			liveness: Liveness::Predicate {
				check: Arc::new(check),
				inner: Some(Arc::new(self)),
			},
		}
	}

	/// Returns true while the guarded work should continue.
	pub fn is_live(&self) -> bool {
		match &self.liveness {
			Liveness::Always => true,
			Liveness::Predicate { check, inner } => inner.as_ref().is_none_or(|inner| inner.is_live()) && check(),
			Liveness::Owner(owner) => thread::current().id() == *owner,
		}
	}

	/// Fails with [`NotCurrent`] once the token is dead.
	pub fn check(&self) -> Result<(), NotCurrent> {
		if self.is_live() { Ok(()) } else { Err(NotCurrent) }
	}
}

impl Default for CancellationToken {
	fn default() -> Self {
		Self::always_live()
	}
}

impl fmt::Debug for CancellationToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.liveness {
			Liveness::Always => f.write_str("CancellationToken::AlwaysLive"),
			Liveness::Predicate { inner, .. } => f
				.debug_struct("CancellationToken::Predicate")
				.field("inner", inner)
				.finish_non_exhaustive(),
			Liveness::Owner(owner) => f.debug_tuple("CancellationToken::Owner").field(owner).finish(),
		}
	}
}
