use std::any::Any;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use quire_primitives::DeadlockPreventionTimeout;

use crate::{ExecutorError, JobFailure};

enum SlotState<R> {
	Pending,
	Ready(Result<R, JobFailure>),
	Taken,
}

/// Single-assignment result box shared by a job and its submitter.
pub(crate) struct ResultSlot<R> {
	state: Mutex<SlotState<R>>,
	ready: Condvar,
}

impl<R> ResultSlot<R> {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self {
			state: Mutex::new(SlotState::Pending),
			ready: Condvar::new(),
		})
	}

	fn fill(&self, outcome: Result<R, JobFailure>) {
		let mut state = self.state.lock();
		if matches!(*state, SlotState::Pending) {
			*state = SlotState::Ready(outcome);
			self.ready.notify_all();
		}
	}
}

/// Write side of a [`ResultSlot`], moved into the job closure.
///
/// Dropping it unfilled (the job was discarded) records
/// [`JobFailure::Discarded`], so a waiting submitter is released instead of
/// running into its timeout.
pub(crate) struct Completer<R> {
	slot: Option<Arc<ResultSlot<R>>>,
}

impl<R> Completer<R> {
	pub(crate) fn new(slot: Arc<ResultSlot<R>>) -> Self {
		Self { slot: Some(slot) }
	}

	pub(crate) fn complete(mut self, outcome: Result<R, Box<dyn Any + Send>>) {
		let Some(slot) = self.slot.take() else { return };
		let outcome = outcome.map_err(|payload| {
			let message = panic_message(payload.as_ref());
			tracing::warn!(%message, "executor job panicked");
			JobFailure::Panicked(message)
		});
		slot.fill(outcome);
	}
}

impl<R> Drop for Completer<R> {
	fn drop(&mut self) {
		if let Some(slot) = self.slot.take() {
			slot.fill(Err(JobFailure::Discarded));
		}
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

/// Handle to the result of an asynchronously submitted job.
///
/// The result is read at most once: both [`Self::try_take`] and
/// [`Self::wait`] consume the handle.
pub struct JobHandle<R> {
	slot: Arc<ResultSlot<R>>,
	resource: Arc<str>,
}

impl<R> JobHandle<R> {
	pub(crate) fn new(slot: Arc<ResultSlot<R>>, resource: Arc<str>) -> Self {
		Self { slot, resource }
	}

	/// Returns true once the job ran (or was discarded).
	pub fn is_finished(&self) -> bool {
		!matches!(*self.slot.state.lock(), SlotState::Pending)
	}

	/// Takes the outcome if the job has finished, otherwise hands the handle
	/// back for a later poll.
	pub fn try_take(self) -> Result<Result<R, JobFailure>, Self> {
		let mut state = self.slot.state.lock();
		match mem::replace(&mut *state, SlotState::Taken) {
			SlotState::Ready(outcome) => Ok(outcome),
			other => {
				*state = other;
				drop(state);
				Err(self)
			}
		}
	}

	/// Blocks until the job finishes or `timeout` elapses.
	///
	/// # Errors
	///
	/// [`ExecutorError::Timeout`] when the deadline passes, otherwise the
	/// job's own [`JobFailure`].
	pub fn wait(self, timeout: Duration) -> Result<R, ExecutorError> {
		let started = Instant::now();
		let deadline = started + timeout;
		let mut state = self.slot.state.lock();
		loop {
			match mem::replace(&mut *state, SlotState::Taken) {
				SlotState::Ready(outcome) => return outcome.map_err(ExecutorError::JobFailed),
				SlotState::Taken => unreachable!("job result slot read twice"),
				SlotState::Pending => {
					*state = SlotState::Pending;
					if self.slot.ready.wait_until(&mut state, deadline).timed_out() && matches!(*state, SlotState::Pending) {
						let waited = started.elapsed();
						tracing::warn!(executor = %self.resource, ?waited, "synchronous job exceeded its wait");
						return Err(DeadlockPreventionTimeout::new(self.resource.as_ref(), waited).into());
					}
				}
			}
		}
	}
}

impl<R> std::fmt::Debug for JobHandle<R> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("JobHandle")
			.field("executor", &self.resource)
			.field("finished", &self.is_finished())
			.finish()
	}
}
