//! Concurrency primitives shared by the page cache and the update worker.
//!
//! - [`BoundedLock`] - reentrant lock that gives up after a deadline instead of hanging
//! - [`CancellationToken`] - cooperative cancellation polled by long-running work
//! - [`ContentEpoch`] - generation handle identifying one version of a page's text

/// Cooperative cancellation tokens.
pub mod cancel;
/// Content generation handles.
pub mod epoch;
/// Timeout and staleness errors.
pub mod error;
/// Reentrant lock with bounded waits.
pub mod lock;

pub use cancel::CancellationToken;
pub use epoch::{ContentEpoch, EpochClock};
pub use error::{DeadlockPreventionTimeout, NotCurrent};
pub use lock::{BoundedGuard, BoundedLock};
