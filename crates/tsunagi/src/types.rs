use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Identity and launch configuration of one supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
	id: Uuid,
	pub command: Vec<String>,
	pub working_dir: Option<PathBuf>,
	pub environment: Option<HashMap<String, String>>,
}

impl ProcessHandle {
	pub fn new() -> Self {
		Self::with_id(Uuid::new_v4())
	}

	pub fn with_id(id: Uuid) -> Self {
		Self {
			id,
			command: Vec::new(),
			working_dir: None,
			environment: None,
		}
	}

	pub fn builder() -> ProcessHandleBuilder {
		ProcessHandleBuilder::default()
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn add_command(&mut self, piece: impl Into<String>) {
		self.command.push(piece.into());
	}

	/// A non-empty command and a working directory are both set.
	pub fn is_configured(&self) -> bool {
		!self.command.is_empty() && self.working_dir.is_some()
	}

	/// New handle with a fresh id and a deep copy of this configuration.
	pub fn duplicate(&self) -> Self {
		Self {
			id: Uuid::new_v4(),
			command: self.command.clone(),
			working_dir: self.working_dir.clone(),
			environment: self.environment.clone(),
		}
	}

	/// Copy command, environment and working directory from `other`, keeping this id.
	pub fn configure_from(&mut self, other: &ProcessHandle) {
		self.command = other.command.clone();
		self.working_dir = other.working_dir.clone();
		self.environment = other.environment.clone();
	}

	pub fn is_same_configuration(&self, other: &ProcessHandle) -> bool {
		self.command == other.command
			&& self.working_dir == other.working_dir
			&& self.environment == other.environment
	}
}

impl Default for ProcessHandle {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Debug, Default)]
pub struct ProcessHandleBuilder {
	id: Option<Uuid>,
	command: Vec<String>,
	working_dir: Option<PathBuf>,
	environment: Option<HashMap<String, String>>,
}

impl ProcessHandleBuilder {
	pub fn id(mut self, id: Uuid) -> Self {
		self.id = Some(id);
		self
	}

	pub fn command<I, S>(mut self, command: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.command = command.into_iter().map(Into::into).collect();
		self
	}

	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.command.push(arg.into());
		self
	}

	pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
		self.working_dir = Some(dir.as_ref().to_path_buf());
		self
	}

	pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.environment
			.get_or_insert_with(HashMap::new)
			.insert(key.into(), value.into());
		self
	}

	pub fn environment(mut self, environment: HashMap<String, String>) -> Self {
		self.environment = Some(environment);
		self
	}

	pub fn build(self) -> ProcessHandle {
		ProcessHandle {
			id: self.id.unwrap_or_else(Uuid::new_v4),
			command: self.command,
			working_dir: self.working_dir,
			environment: self.environment,
		}
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
	Unconfigured,
	Configured,
	Starting,
	Active,
	Stopping,
	Terminated,
}

impl ProcessState {
	pub fn is_running(&self) -> bool {
		matches!(self, ProcessState::Active)
	}
}

/// Output streams captured into the control directory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
	Stdout,
	Stderr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessStatus {
	pub id: Uuid,
	pub state: ProcessState,
	pub pid: Option<u32>,
	pub wrapper_pid: Option<u32>,
	pub exit_code: Option<i32>,
	pub working_dir: Option<PathBuf>,
}
