use std::thread::{Builder, JoinHandle};

/// Spawns the dedicated named OS thread backing an executor.
pub(crate) fn spawn_named_thread<F>(name: &str, f: F) -> std::io::Result<JoinHandle<()>>
where
	F: FnOnce() + Send + 'static,
{
	tracing::trace!(thread = name, "worker.spawn_named_thread");
	Builder::new().name(name.to_string()).spawn(f)
}
