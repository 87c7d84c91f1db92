use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::SupervisorConfig;
use crate::control::{ControlDirectory, ControlFile};
use crate::error::{Error, Result};
use crate::output;
use crate::probe::{LivenessProbe, Termination};
use crate::script;
use crate::tail::CachedTailReader;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
	#[default]
	Idle,
	Starting,
	Active,
	Stopping,
}

#[derive(Debug, Default)]
struct Runtime {
	phase: Phase,
	pid: Option<u32>,
	wrapper_pid: Option<u32>,
	exit_code: Option<i32>,
	terminated: bool,
}

/// Supervises one external process through its control directory.
///
/// `start`, `stop`, `restart` and `destroy` are serialized per supervisor.
/// Queries (`is_active`, `wait_for`, `exit_value`, `tail`) never take the
/// lifecycle lock, so a `wait_for` in one thread does not block a `stop` in
/// another.
#[derive(Debug)]
pub struct ProcessSupervisor {
	id: Uuid,
	config: SupervisorConfig,
	probe: Arc<dyn LivenessProbe>,
	handle: RwLock<ProcessHandle>,
	runtime: Mutex<Runtime>,
	lifecycle: Mutex<()>,
	tails: Mutex<HashMap<Stream, Arc<CachedTailReader>>>,
}

impl ProcessSupervisor {
	pub fn new(handle: ProcessHandle, config: SupervisorConfig, probe: Arc<dyn LivenessProbe>) -> Self {
		Self {
			id: handle.id(),
			config,
			probe,
			handle: RwLock::new(handle),
			runtime: Mutex::new(Runtime::default()),
			lifecycle: Mutex::new(()),
			tails: Mutex::new(HashMap::new()),
		}
	}

	/// Regain supervision of a process launched by an earlier controller,
	/// using only the control directory left under `home`.
	pub fn acquire_from(
		home: &Path,
		config: SupervisorConfig,
		probe: Arc<dyn LivenessProbe>,
	) -> Result<Self> {
		let id = ControlDirectory::find_id(home)?;
		let mut handle = ProcessHandle::with_id(id);
		handle.working_dir = Some(home.to_path_buf());

		let supervisor = Self::new(handle, config, probe);
		let control = ControlDirectory::new(home, id);
		{
			let mut rt = supervisor.runtime.lock();
			rt.wrapper_pid = control.read_pid(ControlFile::WrapperPid)?;
			rt.pid = control.read_pid(ControlFile::Pid)?;
			rt.exit_code = control.read_record(ControlFile::ExitValue)?;
			if rt.pid.is_some() {
				rt.phase = Phase::Active;
			}
			rt.terminated = rt.exit_code.is_some();
		}
		tracing::debug!(id = %id, home = %home.display(), "acquired process");
		Ok(supervisor)
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn config(&self) -> &SupervisorConfig {
		&self.config
	}

	pub fn handle(&self) -> ProcessHandle {
		self.handle.read().clone()
	}

	pub fn command(&self) -> Vec<String> {
		self.handle.read().command.clone()
	}

	pub fn working_dir(&self) -> Option<PathBuf> {
		self.handle.read().working_dir.clone()
	}

	pub fn environment(&self) -> Option<HashMap<String, String>> {
		self.handle.read().environment.clone()
	}

	pub fn set_command<I, S>(&self, command: I)
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.handle.write().command = command.into_iter().map(Into::into).collect();
	}

	pub fn add_command(&self, piece: impl Into<String>) {
		self.handle.write().add_command(piece);
	}

	pub fn set_working_dir(&self, dir: impl AsRef<Path>) {
		self.handle.write().working_dir = Some(dir.as_ref().to_path_buf());
		self.tails.lock().clear();
	}

	pub fn set_environment(&self, environment: Option<HashMap<String, String>>) {
		self.handle.write().environment = environment;
	}

	pub fn configure_from(&self, other: &ProcessHandle) {
		self.handle.write().configure_from(other);
		self.tails.lock().clear();
	}

	pub fn is_same_configuration(&self, other: &ProcessHandle) -> bool {
		self.handle.read().is_same_configuration(other)
	}

	pub fn pid(&self) -> Option<u32> {
		self.runtime.lock().pid
	}

	pub fn wrapper_pid(&self) -> Option<u32> {
		self.runtime.lock().wrapper_pid
	}

	pub fn state(&self) -> ProcessState {
		let rt = self.runtime.lock();
		if rt.terminated {
			return ProcessState::Terminated;
		}
		match rt.phase {
			Phase::Starting => ProcessState::Starting,
			Phase::Active => ProcessState::Active,
			Phase::Stopping => ProcessState::Stopping,
			Phase::Idle if self.handle.read().is_configured() => ProcessState::Configured,
			Phase::Idle => ProcessState::Unconfigured,
		}
	}

	pub fn status(&self) -> ProcessStatus {
		let state = self.state();
		let rt = self.runtime.lock();
		ProcessStatus {
			id: self.id,
			state,
			pid: rt.pid,
			wrapper_pid: rt.wrapper_pid,
			exit_code: rt.exit_code,
			working_dir: self.working_dir(),
		}
	}

	pub fn control_directory(&self) -> Result<ControlDirectory> {
		let dir = self
			.working_dir()
			.ok_or_else(|| Error::Configuration("working directory is not set".into()))?;
		Ok(ControlDirectory::new(dir, self.id))
	}

	pub fn control_file(&self, file: ControlFile) -> Result<PathBuf> {
		Ok(self.control_directory()?.file(file))
	}

	// --- lifecycle ---

	pub fn start(&self) -> Result<()> {
		let _guard = self.lifecycle.lock();
		self.start_locked()
	}

	pub fn stop(&self, grace: Duration) -> Result<()> {
		let _guard = self.lifecycle.lock();
		self.stop_locked(grace)
	}

	pub fn stop_default(&self) -> Result<()> {
		self.stop(self.config.default_stop_timeout())
	}

	pub fn restart(&self, grace: Duration) -> Result<()> {
		let _guard = self.lifecycle.lock();
		self.stop_locked(grace)?;
		self.start_locked()
	}

	pub fn restart_default(&self) -> Result<()> {
		self.restart(self.config.default_stop_timeout())
	}

	/// Stop the process and delete its working directory tree.
	pub fn destroy(&self) -> Result<()> {
		let _guard = self.lifecycle.lock();
		self.stop_locked(self.config.default_stop_timeout())?;
		self.tails.lock().clear();
		if let Some(dir) = self.working_dir() {
			match fs::remove_dir_all(&dir) {
				Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
				_ => {}
			}
			tracing::debug!(id = %self.id, dir = %dir.display(), "destroyed");
		}
		Ok(())
	}

	fn start_locked(&self) -> Result<()> {
		if self.is_active()? {
			return Ok(());
		}

		let handle = self.handle();
		let dir = handle
			.working_dir
			.clone()
			.ok_or_else(|| Error::Configuration("working directory is not set".into()))?;
		if handle.command.is_empty() {
			return Err(Error::Configuration("command is empty".into()));
		}

		*self.runtime.lock() = Runtime {
			phase: Phase::Starting,
			..Runtime::default()
		};

		let control = ControlDirectory::new(&dir, self.id);
		match self.launch(&handle, &control) {
			Ok((pid, wrapper_pid)) => {
				let mut rt = self.runtime.lock();
				rt.pid = Some(pid);
				rt.wrapper_pid = Some(wrapper_pid);
				rt.phase = Phase::Active;
				drop(rt);
				for tail in self.tails.lock().values() {
					tail.invalidate();
				}
				tracing::debug!(id = %self.id, pid, wrapper_pid, "started");
				Ok(())
			}
			Err(e) => {
				tracing::warn!(id = %self.id, "start failed: {}", e);
				let mut rt = self.runtime.lock();
				rt.phase = Phase::Idle;
				rt.terminated = true;
				Err(e)
			}
		}
	}

	fn launch(&self, handle: &ProcessHandle, control: &ControlDirectory) -> Result<(u32, u32)> {
		control.initialize()?;
		script::write(control, &handle.command)?;
		tracing::debug!(
			id = %self.id,
			command = ?handle.command,
			dir = %control.home().display(),
			env = ?handle.environment,
			"executing"
		);
		self.execute(
			control.home(),
			&control.relative(ControlFile::Script),
			handle.environment.as_ref(),
		)?;
		self.await_stream_files(control)?;
		let wrapper_pid = self.await_pid(control, ControlFile::WrapperPid)?;
		let pid = self.await_pid(control, ControlFile::Pid)?;
		Ok((pid, wrapper_pid))
	}

	fn execute(
		&self,
		dir: &Path,
		script: &Path,
		environment: Option<&HashMap<String, String>>,
	) -> Result<()> {
		let mut cmd = Command::new("/bin/sh");
		cmd.arg(script)
			.current_dir(dir)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.process_group(0);
		if let Some(env) = environment {
			cmd.envs(env);
		}

		let mut child = cmd.spawn()?;
		if let Some(stdout) = child.stdout.take() {
			output::drain(self.id, "stdout", stdout)?;
		}
		if let Some(stderr) = child.stderr.take() {
			output::drain(self.id, "stderr", stderr)?;
		}

		let status = child.wait()?;
		if !status.success() {
			tracing::warn!(id = %self.id, ?status, "launch script exited abnormally");
		}
		Ok(())
	}

	fn await_stream_files(&self, control: &ControlDirectory) -> Result<()> {
		let stdout = control.file(ControlFile::StdOut);
		let stderr = control.file(ControlFile::StdErr);
		for _ in 0..=self.config.startup_poll_attempts {
			if stdout.exists() && stderr.exists() {
				return Ok(());
			}
			thread::sleep(self.config.poll_interval());
		}
		Err(Error::Startup {
			id: self.id,
			reason: format!("output files never appeared in {}", control.path().display()),
		})
	}

	fn await_pid(&self, control: &ControlDirectory, file: ControlFile) -> Result<u32> {
		for _ in 0..=self.config.pid_poll_attempts {
			if let Some(pid) = control.read_pid(file)? {
				return Ok(pid);
			}
			thread::sleep(self.config.poll_interval());
		}
		Err(Error::Startup {
			id: self.id,
			reason: format!("{} was never written", control.file(file).display()),
		})
	}

	fn stop_locked(&self, grace: Duration) -> Result<()> {
		if self.is_dead()? {
			return Ok(());
		}
		let Some(pid) = self.pid() else {
			return Ok(());
		};

		tracing::debug!(id = %self.id, pid, "stopping");
		self.runtime.lock().phase = Phase::Stopping;
		let result = self.escalate(pid, grace);
		if result.is_err() {
			self.runtime.lock().phase = Phase::Active;
		}
		result
	}

	fn escalate(&self, pid: u32, grace: Duration) -> Result<()> {
		self.probe.signal(pid, Termination::Graceful)?;
		if self.poll_dead(grace, self.config.stop_poll_interval())? {
			return Ok(());
		}

		tracing::info!(
			id = %self.id,
			pid,
			command = ?self.command(),
			"cannot stop with SIGTERM, resorting to SIGKILL"
		);
		self.probe.signal(pid, Termination::Forceful)?;
		if self.poll_dead(self.config.kill_settle(), self.config.poll_interval())? {
			return Ok(());
		}

		Err(Error::CannotStop {
			id: self.id,
			pid,
			command: self.command().join(" "),
		})
	}

	/// Poll until the process is gone or `window` has elapsed.
	fn poll_dead(&self, window: Duration, interval: Duration) -> Result<bool> {
		let deadline = Instant::now() + window;
		loop {
			if self.is_dead()? {
				return Ok(true);
			}
			let now = Instant::now();
			if now >= deadline {
				return Ok(false);
			}
			thread::sleep(interval.min(deadline - now));
		}
	}

	/// True once the host no longer lists the real pid. Never started counts as dead.
	fn is_dead(&self) -> Result<bool> {
		let pid = {
			let rt = self.runtime.lock();
			if rt.terminated {
				return Ok(true);
			}
			match rt.pid {
				Some(pid) => pid,
				None => return Ok(true),
			}
		};
		if self.probe.is_gone(pid)? {
			self.mark_terminated();
			return Ok(true);
		}
		Ok(false)
	}

	fn mark_terminated(&self) {
		let mut rt = self.runtime.lock();
		if !rt.terminated {
			tracing::debug!(id = %self.id, pid = ?rt.pid, "terminated");
		}
		rt.terminated = true;
		rt.phase = Phase::Idle;
	}

	// --- queries ---

	/// A confirmed termination is final until the next `start`, so a reused
	/// pid is never reported as this process.
	pub fn is_active(&self) -> Result<bool> {
		let pid = {
			let rt = self.runtime.lock();
			match rt.pid {
				Some(pid) if !rt.terminated => pid,
				_ => return Ok(false),
			}
		};
		match self.probe.status(pid)? {
			None => {
				self.mark_terminated();
				Ok(false)
			}
			Some(status) => Ok(status.is_alive()),
		}
	}

	/// Block until the process exits and return its exit code.
	pub fn wait_for(&self) -> Result<i32> {
		loop {
			if let Some(code) = self.wait_until(None)? {
				return Ok(code);
			}
		}
	}

	/// Like [`ProcessSupervisor::wait_for`], but gives up with `Ok(None)` once
	/// `timeout` has elapsed and the process is still running.
	pub fn wait_for_timeout(&self, timeout: Duration) -> Result<Option<i32>> {
		self.wait_until(Some(Instant::now() + timeout))
	}

	fn wait_until(&self, deadline: Option<Instant>) -> Result<Option<i32>> {
		let watched = {
			let rt = self.runtime.lock();
			if rt.terminated && rt.exit_code.is_some() {
				return Ok(rt.exit_code);
			}
			rt.wrapper_pid.or(rt.pid)
		};
		let Some(watched) = watched else {
			return Err(Error::NotStarted(self.id));
		};

		while self.probe.is_alive(watched)? {
			if deadline.is_some_and(|d| Instant::now() >= d) {
				return Ok(None);
			}
			thread::sleep(self.config.poll_interval());
		}

		let control = self.control_directory()?;
		self.settle_exit_record(&control)?;
		self.is_dead()?;
		self.exit_value().map(Some)
	}

	fn settle_exit_record(&self, control: &ControlDirectory) -> Result<()> {
		for _ in 0..self.config.exit_settle_attempts {
			if control.read_record::<i32>(ControlFile::ExitValue)?.is_some() {
				break;
			}
			thread::sleep(self.config.poll_interval());
		}
		Ok(())
	}

	/// Exit code of a terminated process, without blocking on the process.
	pub fn exit_value(&self) -> Result<i32> {
		let terminated = {
			let rt = self.runtime.lock();
			if let Some(code) = rt.exit_code {
				return Ok(code);
			}
			if rt.pid.is_none() {
				return Err(Error::NotStarted(self.id));
			}
			rt.terminated
		};

		let control = self.control_directory()?;
		if terminated {
			self.settle_exit_record(&control)?;
		}
		match control.read_record::<i32>(ControlFile::ExitValue)? {
			Some(code) => {
				let mut rt = self.runtime.lock();
				rt.exit_code = Some(code);
				rt.terminated = true;
				rt.phase = Phase::Idle;
				Ok(code)
			}
			// the wrapper writes the record just before it exits
			None if terminated => match self.wrapper_pid() {
				Some(wrapper) if !self.probe.is_gone(wrapper)? => Err(Error::NotYetTerminated(self.id)),
				_ => Err(Error::CorruptState {
					path: control.file(ControlFile::ExitValue),
					content: String::new(),
				}),
			},
			None => Err(Error::NotYetTerminated(self.id)),
		}
	}

	// --- streams ---

	/// The stdin sink, opened for appending.
	pub fn stdin(&self) -> Result<File> {
		let path = self.existing_control_file(ControlFile::StdIn)?;
		Ok(OpenOptions::new().append(true).open(path)?)
	}

	pub fn stdout(&self) -> Result<File> {
		self.open_stream(Stream::Stdout)
	}

	pub fn stderr(&self) -> Result<File> {
		self.open_stream(Stream::Stderr)
	}

	fn open_stream(&self, stream: Stream) -> Result<File> {
		let path = self.existing_control_file(stream_file(stream))?;
		Ok(File::open(path)?)
	}

	fn existing_control_file(&self, file: ControlFile) -> Result<PathBuf> {
		let path = self.control_file(file)?;
		if !path.exists() {
			return Err(Error::NotStarted(self.id));
		}
		Ok(path)
	}

	/// Shared tail cache over one of the captured streams.
	pub fn tail_reader(&self, stream: Stream) -> Result<Arc<CachedTailReader>> {
		let path = self.existing_control_file(stream_file(stream))?;
		let mut tails = self.tails.lock();
		let reader = tails.entry(stream).or_insert_with(|| {
			Arc::new(CachedTailReader::new(
				path,
				self.config.tail.freshness(),
				self.config.tail.max_lines,
			))
		});
		Ok(Arc::clone(reader))
	}

	/// At most `n` of the latest lines written to `stream`.
	pub fn tail(&self, stream: Stream, n: usize) -> Result<Vec<String>> {
		if n == 0 {
			return Ok(Vec::new());
		}
		self.tail_reader(stream)?.tail(n)
	}
}

fn stream_file(stream: Stream) -> ControlFile {
	match stream {
		Stream::Stdout => ControlFile::StdOut,
		Stream::Stderr => ControlFile::StdErr,
	}
}

impl PartialEq for ProcessSupervisor {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for ProcessSupervisor {}

impl fmt::Display for ProcessSupervisor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let dir = self.working_dir();
		write!(f, "ProcessSupervisor{{{}}} home dir: ", self.id)?;
		match dir {
			Some(dir) => write!(f, "{}", dir.display())?,
			None => write!(f, "-")?,
		}
		match self.pid() {
			Some(pid) => write!(f, " pid: {}", pid),
			None => write!(f, " pid: -"),
		}
	}
}
