//! # tsunagi
//!
//! Out-of-band process supervision for Rust.
//!
//! Launch a process detached from the controller, observe and stop it, and
//! reattach to it from a fresh controller after a restart. All coordination
//! goes through a control directory under the process's working directory,
//! so no native child handle is ever needed.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tsunagi::{ProcessFactory, ProcessHandle, Stream, SupervisorConfig};
//!
//! # fn main() -> tsunagi::Result<()> {
//! let factory = ProcessFactory::new(SupervisorConfig::default())?;
//! let worker = factory.create_with(
//!     ProcessHandle::builder()
//!         .command(["sleep", "60"])
//!         .working_dir("/tmp/worker")
//!         .build(),
//! );
//! worker.start()?;
//!
//! // later, from another controller instance
//! let again = factory.acquire_from(std::path::Path::new("/tmp/worker"))?;
//! assert_eq!(again.pid(), worker.pid());
//! println!("{:?}", again.tail(Stream::Stdout, 20)?);
//! again.stop(Duration::from_secs(1))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod nonblocking;
pub mod output;
pub mod platform;
pub mod probe;
pub mod script;
pub mod supervisor;
pub mod tail;
pub mod types;

pub use config::{SupervisorConfig, TailConfig};
pub use control::{ControlDirectory, ControlFile, CONTROL_DIR_PREFIX};
pub use error::{Error, Result};
pub use platform::{Platform, ProcessFactory};
pub use probe::{LivenessProbe, ProcStatus, PsProbe, Termination};
pub use supervisor::ProcessSupervisor;
pub use tail::CachedTailReader;
pub use types::*;
