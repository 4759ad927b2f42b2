use std::time::Duration;

use serde::Deserialize;

/// Executor tuning; deserializes from a kebab-case table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExecutorConfig {
	/// Worker thread name; also used in timeout errors.
	pub name: String,
	/// Number of priority queues; index 0 drains first.
	pub queue_count: usize,
	/// Ceiling for a synchronous [`crate::JobExecutor::execute`] call.
	pub execute_timeout_ms: u64,
	/// Ceiling for waiting on the worker to exit in `end` and `pause`.
	pub shutdown_timeout_ms: u64,
}

impl ExecutorConfig {
	pub fn execute_timeout(&self) -> Duration {
		Duration::from_millis(self.execute_timeout_ms)
	}

	pub fn shutdown_timeout(&self) -> Duration {
		Duration::from_millis(self.shutdown_timeout_ms)
	}
}

impl Default for ExecutorConfig {
	fn default() -> Self {
		Self {
			name: "quire-update".to_string(),
			queue_count: 3,
			execute_timeout_ms: 240_000,
			shutdown_timeout_ms: 120_000,
		}
	}
}
