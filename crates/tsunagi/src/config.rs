use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Polling bounds and intervals for a supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupervisorConfig {
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_startup_poll_attempts")]
	pub startup_poll_attempts: u32,
	#[serde(default = "default_pid_poll_attempts")]
	pub pid_poll_attempts: u32,
	#[serde(default = "default_stop_poll_interval_ms")]
	pub stop_poll_interval_ms: u64,
	#[serde(default = "default_kill_settle_ms")]
	pub kill_settle_ms: u64,
	#[serde(default = "default_exit_settle_attempts")]
	pub exit_settle_attempts: u32,
	#[serde(default = "default_stop_timeout_secs")]
	pub default_stop_timeout_secs: u64,
	#[serde(default)]
	pub tail: TailConfig,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
			startup_poll_attempts: default_startup_poll_attempts(),
			pid_poll_attempts: default_pid_poll_attempts(),
			stop_poll_interval_ms: default_stop_poll_interval_ms(),
			kill_settle_ms: default_kill_settle_ms(),
			exit_settle_attempts: default_exit_settle_attempts(),
			default_stop_timeout_secs: default_stop_timeout_secs(),
			tail: TailConfig::default(),
		}
	}
}

fn default_poll_interval_ms() -> u64 {
	10
}
fn default_startup_poll_attempts() -> u32 {
	150
}
fn default_pid_poll_attempts() -> u32 {
	1000
}
fn default_stop_poll_interval_ms() -> u64 {
	100
}
fn default_kill_settle_ms() -> u64 {
	1000
}
fn default_exit_settle_attempts() -> u32 {
	10
}
fn default_stop_timeout_secs() -> u64 {
	10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TailConfig {
	#[serde(default = "default_max_lines")]
	pub max_lines: usize,
	#[serde(default = "default_freshness_ms")]
	pub freshness_ms: u64,
}

impl Default for TailConfig {
	fn default() -> Self {
		Self {
			max_lines: default_max_lines(),
			freshness_ms: default_freshness_ms(),
		}
	}
}

fn default_max_lines() -> usize {
	1000
}
fn default_freshness_ms() -> u64 {
	1000
}

impl TailConfig {
	pub fn freshness(&self) -> Duration {
		Duration::from_millis(self.freshness_ms)
	}
}

impl SupervisorConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn stop_poll_interval(&self) -> Duration {
		Duration::from_millis(self.stop_poll_interval_ms)
	}

	pub fn kill_settle(&self) -> Duration {
		Duration::from_millis(self.kill_settle_ms)
	}

	pub fn default_stop_timeout(&self) -> Duration {
		Duration::from_secs(self.default_stop_timeout_secs)
	}

	pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
		toml::from_str(content)
	}

	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)?;
		Self::from_toml_str(&content).map_err(|e| Error::InvalidConfig {
			path: path.to_path_buf(),
			reason: e.to_string(),
		})
	}

	/// Like [`SupervisorConfig::load`], but a missing or broken file yields the defaults.
	pub fn load_or_default(path: &Path) -> Self {
		if !path.exists() {
			return Self::default();
		}
		match Self::load(path) {
			Ok(config) => config,
			Err(e) => {
				tracing::warn!("failed to load {}: {}", path.display(), e);
				Self::default()
			}
		}
	}
}
