//! Single worker thread over prioritized FIFO queues.
//!
//! Queue index 0 has the highest priority. The worker always takes the front
//! job of the lowest-indexed non-empty queue. Jobs run outside the queue
//! lock, one at a time, with the submitter's tracing span entered.
//!
//! Lifecycle:
//!
//! * `start` spawns the worker; queues exist from construction so work can be
//!   queued before the first start.
//! * soft `end` appends an end marker to the last queue. The worker re-queues
//!   the marker behind any remaining work and exits once it pops the marker
//!   with every queue empty.
//! * hard `end` drops all queues (pending jobs resolve to
//!   [`JobFailure::Discarded`](crate::JobFailure::Discarded)) and the worker
//!   exits after its current job. A later `start` allocates fresh queues.
//! * `pause` makes the worker exit after its current job while keeping the
//!   queues intact for the next `start`.

use std::collections::VecDeque;
use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use quire_primitives::{CancellationToken, DeadlockPreventionTimeout};

use crate::handle::{Completer, ResultSlot};
use crate::spawn::spawn_named_thread;
use crate::{ExecutorConfig, ExecutorError, JobHandle};

type JobFn = Box<dyn FnOnce(&CancellationToken) + Send>;

struct Job {
	run: JobFn,
	span: tracing::Span,
	/// Whether the job observes executor liveness through its token.
	cancellable: bool,
}

enum Item {
	Job(Job),
	End,
}

/// Observable lifecycle state of a [`JobExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
	/// No worker thread; queued jobs wait for `start`.
	Stopped,
	/// A worker thread is alive.
	Running,
	/// Paused by [`JobExecutor::pause`]; queues are preserved.
	Paused,
}

struct QueueState {
	queues: Option<Vec<VecDeque<Item>>>,
	paused: bool,
	worker: Option<ThreadId>,
}

impl QueueState {
	fn fresh_queues(count: usize) -> Vec<VecDeque<Item>> {
		(0..count).map(|_| VecDeque::new()).collect()
	}
}

struct Shared {
	name: Arc<str>,
	queue_count: usize,
	state: Mutex<QueueState>,
	/// Signalled when work, an end marker, or a stop request arrives.
	wake: Condvar,
	/// Signalled when the worker thread leaves its loop.
	exited: Condvar,
	/// Mirrors `queues.is_some()` for lock-free cancellation checks.
	live: AtomicBool,
	count_done: AtomicBool,
	done_jobs: AtomicU64,
}

/// Serial executor owning one dedicated worker thread.
///
/// All jobs run on that one thread, in priority then submission order.
pub struct JobExecutor {
	shared: Arc<Shared>,
	thread: Mutex<Option<JoinHandle<()>>>,
	config: ExecutorConfig,
}

impl JobExecutor {
	/// Creates a stopped executor with `config.queue_count` queues (at least
	/// one).
	pub fn new(config: ExecutorConfig) -> Self {
		let queue_count = config.queue_count.max(1);
		let shared = Arc::new(Shared {
			name: Arc::from(config.name.as_str()),
			queue_count,
			state: Mutex::new(QueueState {
				queues: Some(QueueState::fresh_queues(queue_count)),
				paused: false,
				worker: None,
			}),
			wake: Condvar::new(),
			exited: Condvar::new(),
			live: AtomicBool::new(true),
			count_done: AtomicBool::new(false),
			done_jobs: AtomicU64::new(0),
		});
		Self {
			shared,
			thread: Mutex::new(None),
			config,
		}
	}

	pub fn config(&self) -> &ExecutorConfig {
		&self.config
	}

	pub fn queue_count(&self) -> usize {
		self.shared.queue_count
	}

	/// Starts the worker thread. Idempotent while a worker is alive; clears a
	/// pending pause and re-allocates queues after a hard end.
	pub fn start(&self) -> Result<(), ExecutorError> {
		let mut state = self.shared.state.lock();
		state.paused = false;
		if state.queues.is_none() {
			state.queues = Some(QueueState::fresh_queues(self.shared.queue_count));
			self.shared.live.store(true, Ordering::SeqCst);
		}
		if state.worker.is_some() {
			return Ok(());
		}

		let shared = Arc::clone(&self.shared);
		let handle = spawn_named_thread(&self.config.name, move || run_worker(shared))?;
		state.worker = Some(handle.thread().id());
		drop(state);

		if let Some(previous) = self.thread.lock().replace(handle)
			&& previous.join().is_err()
		{
			tracing::warn!(executor = %self.shared.name, "previous worker thread panicked");
		}
		tracing::debug!(executor = %self.shared.name, "executor started");
		Ok(())
	}

	/// Stops the worker.
	///
	/// A soft end lets every queued job run first. A hard end discards queued
	/// jobs and makes the worker exit after its current job. Either way the
	/// call waits up to the shutdown timeout for the worker to leave, except
	/// when called from the worker itself.
	pub fn end(&self, hard: bool) -> Result<(), ExecutorError> {
		let mut state = self.shared.state.lock();
		let dropped = if hard {
			self.shared.live.store(false, Ordering::SeqCst);
			state.queues.take()
		} else {
			if state.worker.is_some()
				&& let Some(last) = state.queues.as_mut().and_then(|q| q.last_mut())
			{
				last.push_back(Item::End);
			}
			None
		};
		let worker = state.worker;
		self.shared.wake.notify_all();

		// Pending completers take their slot locks when dropped.
		MutexGuard::unlocked(&mut state, || drop(dropped));
		tracing::debug!(executor = %self.shared.name, hard, "executor end requested");

		match worker {
			Some(worker) if worker != thread::current().id() => {
				self.wait_for_exit(state, worker)?;
				self.join_worker();
				Ok(())
			}
			_ => Ok(()),
		}
	}

	/// Requests a pause. Returns `false` if no worker was running.
	///
	/// With `wait`, blocks until the worker has left (bounded by the shutdown
	/// timeout). Queued jobs survive and run after the next `start`.
	pub fn pause(&self, wait: bool) -> Result<bool, ExecutorError> {
		let mut state = self.shared.state.lock();
		let Some(worker) = state.worker else {
			return Ok(false);
		};
		state.paused = true;
		self.shared.wake.notify_all();
		tracing::debug!(executor = %self.shared.name, wait, "executor pause requested");

		if wait && worker != thread::current().id() {
			self.wait_for_exit(state, worker)?;
			self.join_worker();
		}
		Ok(true)
	}

	pub fn state(&self) -> ExecutorState {
		let state = self.shared.state.lock();
		match (state.worker, state.paused) {
			(Some(_), _) => ExecutorState::Running,
			(None, true) => ExecutorState::Paused,
			(None, false) => ExecutorState::Stopped,
		}
	}

	/// True iff the calling thread is this executor's worker.
	pub fn is_worker_thread(&self) -> bool {
		self.shared.state.lock().worker == Some(thread::current().id())
	}

	/// Runs `f` on the worker and waits for its value.
	///
	/// Called from the worker itself, `f` runs inline so nested synchronous
	/// submission cannot self-deadlock.
	///
	/// # Errors
	///
	/// [`ExecutorError::Timeout`] if the job does not finish within the
	/// configured execute timeout; the job may still run later.
	pub fn execute<R, F>(&self, queue: usize, f: F) -> Result<R, ExecutorError>
	where
		F: FnOnce() -> R + Send + 'static,
		R: Send + 'static,
	{
		if self.is_worker_thread() {
			return Ok(f());
		}
		self.submit(queue, false, move |_| f())?.wait(self.config.execute_timeout())
	}

	/// Queues `f` and returns a handle to its eventual result.
	pub fn execute_async<R, F>(&self, queue: usize, f: F) -> Result<JobHandle<R>, ExecutorError>
	where
		F: FnOnce() -> R + Send + 'static,
		R: Send + 'static,
	{
		self.submit(queue, false, move |_| f())
	}

	/// Like [`Self::execute_async`], but `f` receives a token that dies when
	/// the executor is hard-ended.
	pub fn execute_async_with_cancellation<R, F>(&self, queue: usize, f: F) -> Result<JobHandle<R>, ExecutorError>
	where
		F: FnOnce(&CancellationToken) -> R + Send + 'static,
		R: Send + 'static,
	{
		self.submit(queue, true, f)
	}

	fn submit<R, F>(&self, queue: usize, cancellable: bool, f: F) -> Result<JobHandle<R>, ExecutorError>
	where
		F: FnOnce(&CancellationToken) -> R + Send + 'static,
		R: Send + 'static,
	{
		let count = self.shared.queue_count;
		if queue >= count {
			return Err(ExecutorError::NoSuchQueue { index: queue, count });
		}

		let slot = ResultSlot::new();
		let completer = Completer::new(Arc::clone(&slot));
		let run: JobFn = Box::new(move |token: &CancellationToken| {
			let outcome = catch_unwind(AssertUnwindSafe(|| f(token)));
			completer.complete(outcome);
		});
		let job = Job {
			run,
			span: tracing::Span::current(),
			cancellable,
		};

		let mut state = self.shared.state.lock();
		let queues = state.queues.as_mut().ok_or(ExecutorError::Terminated)?;
		queues[queue].push_back(Item::Job(job));
		self.shared.wake.notify_one();
		drop(state);

		tracing::trace!(executor = %self.shared.name, queue, "job queued");
		Ok(JobHandle::new(slot, Arc::clone(&self.shared.name)))
	}

	/// Number of queued jobs across all queues. End markers do not count.
	pub fn job_count(&self) -> usize {
		self.job_count_in(0..self.shared.queue_count)
	}

	/// Number of queued jobs in the queues with indices in `range`.
	pub fn job_count_in(&self, range: Range<usize>) -> usize {
		let state = self.shared.state.lock();
		let Some(queues) = state.queues.as_ref() else {
			return 0;
		};
		let end = range.end.min(queues.len());
		let start = range.start.min(end);
		queues[start..end]
			.iter()
			.flat_map(|q| q.iter())
			.filter(|item| matches!(item, Item::Job(_)))
			.count()
	}

	/// Discards every queued job of one queue. End markers stay queued.
	pub fn clear_queue(&self, queue: usize) -> Result<usize, ExecutorError> {
		let count = self.shared.queue_count;
		if queue >= count {
			return Err(ExecutorError::NoSuchQueue { index: queue, count });
		}
		let mut state = self.shared.state.lock();
		let Some(queues) = state.queues.as_mut() else {
			return Ok(0);
		};
		let (kept, dropped): (VecDeque<_>, VecDeque<_>) = queues[queue].drain(..).partition(|item| matches!(item, Item::End));
		queues[queue] = kept;
		drop(state);

		let cleared = dropped.len();
		drop(dropped);
		tracing::debug!(executor = %self.shared.name, queue, cleared, "queue cleared");
		Ok(cleared)
	}

	/// Starts counting finished jobs.
	pub fn start_done_job_count(&self) {
		self.shared.count_done.store(true, Ordering::SeqCst);
	}

	pub fn stop_done_job_count(&self) {
		self.shared.count_done.store(false, Ordering::SeqCst);
	}

	pub fn reset_done_job_count(&self) {
		self.shared.done_jobs.store(0, Ordering::SeqCst);
	}

	pub fn done_job_count(&self) -> u64 {
		self.shared.done_jobs.load(Ordering::SeqCst)
	}

	/// Token that stays live while this executor's queues exist, i.e. until a
	/// hard end.
	pub fn cancellation_token(&self) -> CancellationToken {
		shared_token(&self.shared)
	}

	/// Token that is live only on the current worker thread, if one runs.
	pub fn owner_token(&self) -> Option<CancellationToken> {
		self.shared.state.lock().worker.map(CancellationToken::owner)
	}

	fn wait_for_exit(&self, mut state: MutexGuard<'_, QueueState>, worker: ThreadId) -> Result<(), ExecutorError> {
		let started = Instant::now();
		let timeout = self.config.shutdown_timeout();
		let deadline = started + timeout;
		while state.worker == Some(worker) {
			if self.shared.exited.wait_until(&mut state, deadline).timed_out() && state.worker == Some(worker) {
				let waited = started.elapsed();
				tracing::warn!(executor = %self.shared.name, ?waited, "worker did not exit in time");
				return Err(DeadlockPreventionTimeout::new(self.shared.name.as_ref(), waited).into());
			}
		}
		Ok(())
	}

	fn join_worker(&self) {
		let Some(handle) = self.thread.lock().take() else { return };
		if handle.join().is_err() {
			tracing::warn!(executor = %self.shared.name, "worker thread panicked");
		}
	}
}

impl Drop for JobExecutor {
	fn drop(&mut self) {
		let dropped = {
			let mut state = self.shared.state.lock();
			self.shared.live.store(false, Ordering::SeqCst);
			self.shared.wake.notify_all();
			state.queues.take()
		};
		drop(dropped);
	}
}

impl std::fmt::Debug for JobExecutor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("JobExecutor")
			.field("name", &self.shared.name)
			.field("state", &self.state())
			.field("jobs", &self.job_count())
			.finish()
	}
}

fn shared_token(shared: &Arc<Shared>) -> CancellationToken {
	let weak = Arc::downgrade(shared);
	CancellationToken::predicate(move || weak.upgrade().is_some_and(|s| s.live.load(Ordering::SeqCst)))
}

/// Clears the worker registration and wakes exit waiters, also on unwind.
struct ExitGuard {
	shared: Arc<Shared>,
}

impl Drop for ExitGuard {
	fn drop(&mut self) {
		let mut state = self.shared.state.lock();
		if state.worker == Some(thread::current().id()) {
			state.worker = None;
		}
		self.shared.exited.notify_all();
		tracing::debug!(executor = %self.shared.name, "worker exited");
	}
}

fn next_job(shared: &Shared) -> Option<Job> {
	let mut state = shared.state.lock();
	loop {
		if state.paused {
			return None;
		}
		let queues = state.queues.as_mut()?;
		let next = queues.iter_mut().find_map(VecDeque::pop_front);
		let Some(item) = next else {
			shared.wake.wait(&mut state);
			continue;
		};
		match item {
			Item::Job(job) => return Some(job),
			Item::End if queues.iter().all(VecDeque::is_empty) => return None,
			Item::End => {
				if let Some(last) = queues.last_mut() {
					last.push_back(Item::End);
				}
			}
		}
	}
}

fn run_worker(shared: Arc<Shared>) {
	let _exit = ExitGuard { shared: Arc::clone(&shared) };
	let live_token = shared_token(&shared);
	let always = CancellationToken::always_live();

	while let Some(job) = next_job(&shared) {
		let Job { run, span, cancellable } = job;
		let token = if cancellable { &live_token } else { &always };
		{
			let _entered = span.enter();
			run(token);
		}
		if shared.count_done.load(Ordering::SeqCst) {
			shared.done_jobs.fetch_add(1, Ordering::SeqCst);
		}
	}
}
