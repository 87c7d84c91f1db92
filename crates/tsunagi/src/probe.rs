use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fmt;
use std::process::Command;

use crate::error::{Error, Result};

/// `ps` state codes that count as a live process.
pub const ACTIVE_STATES: &[char] = &['U', 'I', 'R', 'S', 'D'];

/// Raw state token reported by the host for one pid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStatus(String);

impl ProcStatus {
	pub fn new(code: impl Into<String>) -> Self {
		Self(code.into())
	}

	pub fn code(&self) -> &str {
		&self.0
	}

	pub fn is_alive(&self) -> bool {
		self.0.starts_with(ACTIVE_STATES)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
	/// SIGTERM
	Graceful,
	/// SIGKILL
	Forceful,
}

impl Termination {
	pub fn signal(&self) -> Signal {
		match self {
			Termination::Graceful => Signal::SIGTERM,
			Termination::Forceful => Signal::SIGKILL,
		}
	}
}

/// Host process-table access: state queries and termination signals.
pub trait LivenessProbe: fmt::Debug + Send + Sync {
	/// `Ok(None)` when the host has no entry for `pid`.
	fn status(&self, pid: u32) -> Result<Option<ProcStatus>>;

	fn signal(&self, pid: u32, termination: Termination) -> Result<()>;

	fn is_alive(&self, pid: u32) -> Result<bool> {
		Ok(self.status(pid)?.is_some_and(|s| s.is_alive()))
	}

	fn is_gone(&self, pid: u32) -> Result<bool> {
		Ok(self.status(pid)?.is_none())
	}
}

/// Queries `ps -o state= -p <pid>` and signals through `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PsProbe;

impl LivenessProbe for PsProbe {
	fn status(&self, pid: u32) -> Result<Option<ProcStatus>> {
		let probe_error = |reason: String| Error::Probe { pid, reason };

		let output = Command::new("ps")
			.args(["-o", "state=", "-p", &pid.to_string()])
			.output()
			.map_err(|e| probe_error(format!("cannot run ps: {}", e)))?;

		let stdout = String::from_utf8_lossy(&output.stdout);
		let line = stdout
			.lines()
			.map(str::trim)
			.find(|l| !l.is_empty() && *l != "STAT");

		match output.status.code() {
			Some(0) => {}
			Some(1) => return Ok(None),
			code => {
				let stderr = String::from_utf8_lossy(&output.stderr);
				tracing::error!(pid, ?code, "ps failed: {}", stderr.trim());
				return Err(probe_error(format!(
					"ps exited with {:?}: {}",
					code,
					stderr.trim()
				)));
			}
		}

		match line {
			Some(code) => {
				tracing::trace!(pid, status = code, "process status");
				Ok(Some(ProcStatus::new(code)))
			}
			None => Err(probe_error("ps produced no output".into())),
		}
	}

	fn signal(&self, pid: u32, termination: Termination) -> Result<()> {
		let signal = termination.signal();
		tracing::debug!(pid, ?signal, "sending signal");
		let raw = match i32::try_from(pid) {
			Ok(raw) if raw > 0 => raw,
			_ => return Err(Error::Signal { pid, source: Errno::EINVAL }),
		};
		match kill(Pid::from_raw(raw), signal) {
			Ok(()) | Err(Errno::ESRCH) => Ok(()),
			Err(source) => Err(Error::Signal { pid, source }),
		}
	}
}
