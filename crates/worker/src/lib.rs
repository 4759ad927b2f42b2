//! Dedicated-thread job executor.
//!
//! One [`JobExecutor`] owns exactly one worker thread fed from a fixed set of
//! prioritized FIFO queues. Lower queue indices always drain first. Work can be
//! submitted synchronously ([`JobExecutor::execute`], bounded wait) or
//! asynchronously ([`JobExecutor::execute_async`], returns a [`JobHandle`]).
//!
//! The executor never dies from a job failure: panics are caught and stored
//! in the job's result slot.

mod config;
mod error;
mod executor;
mod handle;
mod spawn;

pub use config::ExecutorConfig;
pub use error::{ExecutorError, JobFailure};
pub use executor::{ExecutorState, JobExecutor};
pub use handle::JobHandle;
