//! Run the blocking lifecycle calls on tokio's blocking pool.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::supervisor::ProcessSupervisor;

async fn run_blocking<T, F>(supervisor: Arc<ProcessSupervisor>, op: F) -> Result<T>
where
	T: Send + 'static,
	F: FnOnce(&ProcessSupervisor) -> Result<T> + Send + 'static,
{
	let id = supervisor.id();
	tokio::task::spawn_blocking(move || op(&supervisor))
		.await
		.map_err(|e| Error::Worker(format!("[{}] {}", id, e)))?
}

pub async fn start(supervisor: Arc<ProcessSupervisor>) -> Result<()> {
	run_blocking(supervisor, |s| s.start()).await
}

pub async fn stop(supervisor: Arc<ProcessSupervisor>, grace: Duration) -> Result<()> {
	run_blocking(supervisor, move |s| s.stop(grace)).await
}

pub async fn wait_for(supervisor: Arc<ProcessSupervisor>) -> Result<i32> {
	run_blocking(supervisor, |s| s.wait_for()).await
}
