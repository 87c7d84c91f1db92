use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("cannot acquire process from {}: {reason}", .home.display())]
	Acquisition { home: PathBuf, reason: String },

	#[error("process [{id}] did not start: {reason}")]
	Startup { id: Uuid, reason: String },

	#[error("cannot stop process [{id}] pid={pid} {command}")]
	CannotStop { id: Uuid, pid: u32, command: String },

	#[error("status query for pid={pid} failed: {reason}")]
	Probe { pid: u32, reason: String },

	#[error("corrupt control file {}: {content:?}", .path.display())]
	CorruptState { path: PathBuf, content: String },

	#[error("process [{0}] has not terminated")]
	NotYetTerminated(Uuid),

	#[error("process [{0}] has not been started")]
	NotStarted(Uuid),

	#[error("cannot signal pid={pid}: {source}")]
	Signal {
		pid: u32,
		#[source]
		source: nix::Error,
	},

	#[error("unsupported platform: {0}")]
	UnsupportedPlatform(String),

	#[error("invalid config {}: {reason}", .path.display())]
	InvalidConfig { path: PathBuf, reason: String },

	#[error("worker task failed: {0}")]
	Worker(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl Error {
	pub fn code(&self) -> &'static str {
		match self {
			Error::Configuration(_) => "TSU001",
			Error::Acquisition { .. } => "TSU002",
			Error::Startup { .. } => "TSU003",
			Error::CannotStop { .. } => "TSU004",
			Error::Probe { .. } => "TSU005",
			Error::CorruptState { .. } => "TSU006",
			Error::NotYetTerminated(_) => "TSU007",
			Error::NotStarted(_) => "TSU008",
			Error::Signal { .. } => "TSU009",
			Error::UnsupportedPlatform(_) => "TSU010",
			Error::InvalidConfig { .. } => "TSU011",
			Error::Worker(_) => "TSU012",
			Error::Io(_) => "TSU999",
		}
	}

	/// True for conditions a caller is expected to poll past.
	pub fn is_not_ready(&self) -> bool {
		matches!(self, Error::NotYetTerminated(_) | Error::NotStarted(_))
	}
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_codes() {
		let id = Uuid::nil();
		assert_eq!(Error::Configuration("x".into()).code(), "TSU001");
		assert_eq!(Error::NotYetTerminated(id).code(), "TSU007");
		assert_eq!(
			Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).code(),
			"TSU999"
		);
	}

	#[test]
	fn test_error_display() {
		let err = Error::CorruptState {
			path: PathBuf::from("/tmp/.control-x/pid"),
			content: "abc".into(),
		};
		assert_eq!(err.to_string(), "corrupt control file /tmp/.control-x/pid: \"abc\"");

		let err = Error::Acquisition {
			home: PathBuf::from("/srv/app"),
			reason: "no control directory".into(),
		};
		assert_eq!(
			err.to_string(),
			"cannot acquire process from /srv/app: no control directory"
		);
	}

	#[test]
	fn test_not_ready() {
		assert!(Error::NotYetTerminated(Uuid::nil()).is_not_ready());
		assert!(Error::NotStarted(Uuid::nil()).is_not_ready());
		assert!(!Error::Configuration("x".into()).is_not_ready());
	}
}
