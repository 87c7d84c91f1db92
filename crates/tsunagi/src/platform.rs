use std::path::Path;
use std::sync::Arc;

use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::probe::{LivenessProbe, PsProbe};
use crate::supervisor::ProcessSupervisor;
use crate::types::ProcessHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
	/// Any host with a POSIX `sh`, `ps` and `kill(2)`.
	Unix,
}

impl Platform {
	pub fn current() -> Result<Self> {
		Self::from_os(std::env::consts::OS)
	}

	pub fn from_os(os: &str) -> Result<Self> {
		match os {
			"linux" | "macos" | "freebsd" | "netbsd" | "openbsd" | "dragonfly" | "solaris"
			| "illumos" => Ok(Platform::Unix),
			other => Err(Error::UnsupportedPlatform(other.to_string())),
		}
	}

	pub fn probe(&self) -> Arc<dyn LivenessProbe> {
		match self {
			Platform::Unix => Arc::new(PsProbe),
		}
	}
}

/// Creates supervisors that share one platform probe and one config.
#[derive(Debug, Clone)]
pub struct ProcessFactory {
	config: SupervisorConfig,
	probe: Arc<dyn LivenessProbe>,
}

impl ProcessFactory {
	pub fn new(config: SupervisorConfig) -> Result<Self> {
		let platform = Platform::current()?;
		tracing::debug!(?platform, "selected platform");
		Ok(Self::for_platform(platform, config))
	}

	pub fn for_platform(platform: Platform, config: SupervisorConfig) -> Self {
		Self::with_probe(config, platform.probe())
	}

	pub fn with_probe(config: SupervisorConfig, probe: Arc<dyn LivenessProbe>) -> Self {
		Self { config, probe }
	}

	pub fn config(&self) -> &SupervisorConfig {
		&self.config
	}

	pub fn create(&self) -> ProcessSupervisor {
		self.create_with(ProcessHandle::new())
	}

	pub fn create_with(&self, handle: ProcessHandle) -> ProcessSupervisor {
		ProcessSupervisor::new(handle, self.config.clone(), Arc::clone(&self.probe))
	}

	pub fn acquire_from(&self, home: &Path) -> Result<ProcessSupervisor> {
		ProcessSupervisor::acquire_from(home, self.config.clone(), Arc::clone(&self.probe))
	}
}
