use std::time::{Duration, Instant};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::DeadlockPreventionTimeout;

/// First backoff slice when a contended lock is retried.
const INITIAL_BACKOFF: Duration = Duration::from_micros(500);
/// Longest single wait slice; keeps the waiter responsive to the deadline.
const MAX_BACKOFF: Duration = Duration::from_millis(20);

/// Guard returned by [`BoundedLock`]. Releases one hold when dropped.
///
/// The guard is `!Send`, so a hold can only be released on the thread that
/// took it.
pub type BoundedGuard<'a, T> = ReentrantMutexGuard<'a, T>;

/// Reentrant lock whose blocking acquisition fails after `max_wait`.
///
/// The owning thread may re-acquire without blocking; only the final release
/// hands the lock to another thread. A non-owner waits with exponential
/// backoff until the deadline and then fails with
/// [`DeadlockPreventionTimeout`], so a lost wakeup or a lock-order bug
/// surfaces as an error instead of a frozen application.
///
/// The lock hands out shared references only. Pair it with a `RefCell` (or
/// `Cell`) for state that is mutated while held.
pub struct BoundedLock<T> {
	name: &'static str,
	max_wait: Option<Duration>,
	inner: ReentrantMutex<T>,
}

impl<T> BoundedLock<T> {
	/// Creates a lock that gives up after `max_wait`.
	pub fn new(name: &'static str, max_wait: Duration, value: T) -> Self {
		Self {
			name,
			max_wait: Some(max_wait),
			inner: ReentrantMutex::new(value),
		}
	}

	/// Creates a lock that blocks without a deadline.
	pub fn unbounded(name: &'static str, value: T) -> Self {
		Self {
			name,
			max_wait: None,
			inner: ReentrantMutex::new(value),
		}
	}

	/// Returns the configured wait ceiling.
	pub fn max_wait(&self) -> Option<Duration> {
		self.max_wait
	}

	/// Returns the diagnostic name of this lock.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Single non-blocking attempt.
	pub fn try_acquire(&self) -> Option<BoundedGuard<'_, T>> {
		self.inner.try_lock()
	}

	/// Blocking acquisition, bounded by the configured wait.
	///
	/// Succeeds immediately when the current thread already holds the lock.
	///
	/// # Errors
	///
	/// Returns [`DeadlockPreventionTimeout`] once `max_wait` has elapsed.
	pub fn acquire(&self) -> Result<BoundedGuard<'_, T>, DeadlockPreventionTimeout> {
		if let Some(guard) = self.inner.try_lock() {
			return Ok(guard);
		}

		let Some(max_wait) = self.max_wait else {
			return Ok(self.inner.lock());
		};

		let started = Instant::now();
		let deadline = started + max_wait;
		let mut backoff = Backoff::new();

		loop {
			let remaining = deadline.saturating_duration_since(Instant::now());
			if remaining.is_zero() {
				let waited = started.elapsed();
				tracing::warn!(lock = self.name, ?waited, "bounded lock timed out");
				return Err(DeadlockPreventionTimeout::new(self.name, waited));
			}

			if let Some(guard) = self.inner.try_lock_for(backoff.next_slice(remaining)) {
				tracing::trace!(lock = self.name, waited = ?started.elapsed(), "bounded lock acquired after contention");
				return Ok(guard);
			}
		}
	}

	/// Runs `f` while holding the lock; the hold is released on every exit
	/// path, including unwinding.
	pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, DeadlockPreventionTimeout> {
		let guard = self.acquire()?;
		Ok(f(&guard))
	}

	/// Returns true if the calling thread currently holds the lock.
	pub fn is_held_by_current_thread(&self) -> bool {
		self.inner.is_owned_by_current_thread()
	}

	/// Returns true if any thread holds the lock.
	pub fn is_locked(&self) -> bool {
		self.inner.is_locked()
	}
}

impl<T> std::fmt::Debug for BoundedLock<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BoundedLock")
			.field("name", &self.name)
			.field("max_wait", &self.max_wait)
			.field("locked", &self.inner.is_locked())
			.finish()
	}
}

/// Wait slices for contended acquisition: doubling from
/// `INITIAL_BACKOFF`, capped at `MAX_BACKOFF`.
#[derive(Debug)]
struct Backoff {
	delay: Duration,
}

impl Backoff {
	fn new() -> Self {
		Self { delay: INITIAL_BACKOFF }
	}

	/// The next slice, never longer than `remaining`.
	fn next_slice(&mut self, remaining: Duration) -> Duration {
		let slice = self.delay.min(remaining);
		self.delay = (self.delay * 2).min(MAX_BACKOFF);
		slice
	}
}
