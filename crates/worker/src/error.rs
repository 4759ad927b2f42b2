use quire_primitives::DeadlockPreventionTimeout;
use thiserror::Error;

/// Why a submitted job produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobFailure {
	/// The job panicked; the payload message is kept when it was a string.
	#[error("job panicked: {0}")]
	Panicked(String),
	/// The job was dropped unrun (hard end or queue cleared).
	#[error("job discarded before it ran")]
	Discarded,
}

/// Errors surfaced by [`crate::JobExecutor`] operations.
#[derive(Debug, Error)]
pub enum ExecutorError {
	/// A bounded wait elapsed: a synchronous job did not finish, or the
	/// worker did not exit. Fatal for this executor; do not retry silently.
	#[error(transparent)]
	Timeout(#[from] DeadlockPreventionTimeout),
	/// The submitted job failed.
	#[error(transparent)]
	JobFailed(#[from] JobFailure),
	/// The queues were dropped by a hard end.
	#[error("executor queues were torn down")]
	Terminated,
	/// The queue index is outside the configured range.
	#[error("no queue with index {index} (executor has {count})")]
	NoSuchQueue { index: usize, count: usize },
	/// The worker thread could not be spawned.
	#[error("failed to spawn worker thread: {0}")]
	Spawn(#[from] std::io::Error),
}
