use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::CancellationToken;

/// Generation handle for one version of a page's live text.
///
/// Epochs only support equality: an artifact built from epoch `e` is current
/// iff the page's current epoch equals `e`. There is no ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentEpoch(u64);

impl ContentEpoch {
	/// Raw generation value, for logging.
	pub const fn generation(self) -> u64 {
		self.0
	}
}

/// Per-page generation counter.
///
/// Minting happens under the owning page's lock; reads are lock-free so that
/// cancellation checks polled from a parser never contend with editors.
#[derive(Debug, Default)]
pub struct EpochClock {
	current: AtomicU64,
}

impl EpochClock {
	/// Creates a clock at its first generation.
	pub const fn new() -> Self {
		Self {
			current: AtomicU64::new(0),
		}
	}

	/// Returns the current epoch without minting.
	pub fn current(&self) -> ContentEpoch {
		ContentEpoch(self.current.load(Ordering::Acquire))
	}

	/// Mints a fresh epoch and makes it current.
	pub fn advance(&self) -> ContentEpoch {
		ContentEpoch(self.current.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
	}

	pub fn is_current(&self, epoch: ContentEpoch) -> bool {
		self.current() == epoch
	}

	/// Token that stays live while `epoch` is current. Dropping the clock
	/// kills the token.
	pub fn token(self: &Arc<Self>, epoch: ContentEpoch) -> CancellationToken {
		let clock = Arc::downgrade(self);
		CancellationToken::predicate(move || clock.upgrade().is_some_and(|c| c.is_current(epoch)))
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn advance_replaces_current() {
		let clock = EpochClock::new();
		let first = clock.current();
		let second = clock.advance();
		assert_ne!(first, second);
		assert_eq!(clock.current(), second);
	}

	#[test]
	fn token_dies_when_epoch_moves() {
		let clock = Arc::new(EpochClock::new());
		let token = clock.token(clock.current());
		assert!(token.is_live());
		clock.advance();
		assert!(!token.is_live());

		let token = clock.token(clock.current());
		drop(clock);
		assert!(!token.is_live());
	}

	proptest! {
		#[test]
		fn every_minted_epoch_is_fresh(steps in 1usize..200) {
			let clock = EpochClock::new();
			let mut seen = std::collections::HashSet::new();
			seen.insert(clock.current());
			for _ in 0..steps {
				prop_assert!(seen.insert(clock.advance()));
			}
		}
	}
}
