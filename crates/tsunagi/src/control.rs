//! On-disk layout of a control directory.
//!
//! ```text
//! <home>/.control-<id>/
//!   std.in  std.out  std.err  pid  wrapper.pid  exit.value  run.sh
//! ```

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

pub const CONTROL_DIR_PREFIX: &str = ".control-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlFile {
	StdIn,
	StdOut,
	StdErr,
	Pid,
	WrapperPid,
	ExitValue,
	Script,
}

impl ControlFile {
	pub fn file_name(&self) -> &'static str {
		match self {
			ControlFile::StdIn => "std.in",
			ControlFile::StdOut => "std.out",
			ControlFile::StdErr => "std.err",
			ControlFile::Pid => "pid",
			ControlFile::WrapperPid => "wrapper.pid",
			ControlFile::ExitValue => "exit.value",
			ControlFile::Script => "run.sh",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDirectory {
	home: PathBuf,
	id: Uuid,
}

impl ControlDirectory {
	pub fn new(home: impl Into<PathBuf>, id: Uuid) -> Self {
		Self {
			home: home.into(),
			id,
		}
	}

	pub fn name_for(id: Uuid) -> String {
		format!("{}{}", CONTROL_DIR_PREFIX, id)
	}

	pub fn home(&self) -> &Path {
		&self.home
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn path(&self) -> PathBuf {
		self.home.join(Self::name_for(self.id))
	}

	pub fn file(&self, file: ControlFile) -> PathBuf {
		self.path().join(file.file_name())
	}

	/// Path of `file` relative to the home directory, as the launch script sees it.
	pub fn relative(&self, file: ControlFile) -> PathBuf {
		Path::new(&Self::name_for(self.id)).join(file.file_name())
	}

	pub fn exists(&self) -> bool {
		self.path().is_dir()
	}

	/// Wipe any previous run and lay down a fresh directory with an empty stdin sink.
	pub fn initialize(&self) -> io::Result<()> {
		self.remove()?;
		fs::create_dir_all(self.path())?;
		File::create(self.file(ControlFile::StdIn))?;
		Ok(())
	}

	pub fn remove(&self) -> io::Result<()> {
		match fs::remove_dir_all(self.path()) {
			Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
			_ => Ok(()),
		}
	}

	/// Parse an integer record. `None` while the file is missing or still empty.
	pub fn read_record<T: FromStr>(&self, file: ControlFile) -> Result<Option<T>> {
		let path = self.file(file);
		let content = match fs::read_to_string(&path) {
			Ok(c) => c,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		let first = content.lines().next().unwrap_or("").trim();
		if first.is_empty() {
			return Ok(None);
		}
		first.parse().map(Some).map_err(|_| Error::CorruptState {
			path,
			content: first.to_string(),
		})
	}

	/// Read a pid record. Zero and values outside the positive `pid_t` range
	/// are corrupt, since `kill(2)` would treat them as a process group.
	pub fn read_pid(&self, file: ControlFile) -> Result<Option<u32>> {
		match self.read_record::<u32>(file)? {
			Some(pid) if pid == 0 || pid > i32::MAX as u32 => Err(Error::CorruptState {
				path: self.file(file),
				content: pid.to_string(),
			}),
			pid => Ok(pid),
		}
	}

	/// Id of the one control directory under `home`.
	pub fn find_id(home: &Path) -> Result<Uuid> {
		let acquisition = |reason: String| Error::Acquisition {
			home: home.to_path_buf(),
			reason,
		};

		if !home.is_dir() {
			return Err(acquisition("not a directory".into()));
		}

		let mut found = Vec::new();
		for entry in fs::read_dir(home)? {
			let name = entry?.file_name().to_string_lossy().to_string();
			if let Some(suffix) = name.strip_prefix(CONTROL_DIR_PREFIX) {
				found.push(suffix.to_string());
			}
		}

		match found.as_slice() {
			[] => Err(acquisition("no control directory".into())),
			[suffix] => Uuid::parse_str(suffix)
				.map_err(|e| acquisition(format!("bad control directory id {:?}: {}", suffix, e))),
			many => Err(acquisition(format!("{} control directories", many.len()))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_layout() {
		let id = Uuid::new_v4();
		let control = ControlDirectory::new("/srv/app", id);
		let dir = PathBuf::from(format!("/srv/app/.control-{}", id));
		assert_eq!(control.path(), dir);
		assert_eq!(control.file(ControlFile::WrapperPid), dir.join("wrapper.pid"));
		assert_eq!(
			control.relative(ControlFile::ExitValue),
			PathBuf::from(format!(".control-{}/exit.value", id))
		);
	}

	#[test]
	fn test_initialize_discards_previous_run() {
		let home = tempfile::tempdir().unwrap();
		let control = ControlDirectory::new(home.path(), Uuid::new_v4());
		control.initialize().unwrap();
		fs::write(control.file(ControlFile::Pid), "123\n").unwrap();

		control.initialize().unwrap();
		assert!(control.exists());
		assert!(!control.file(ControlFile::Pid).exists());
		assert_eq!(fs::metadata(control.file(ControlFile::StdIn)).unwrap().len(), 0);

		control.remove().unwrap();
		assert!(!control.exists());
		control.remove().unwrap();
	}

	#[test]
	fn test_read_record() {
		let home = tempfile::tempdir().unwrap();
		let control = ControlDirectory::new(home.path(), Uuid::new_v4());
		control.initialize().unwrap();

		assert_eq!(control.read_record::<u32>(ControlFile::Pid).unwrap(), None);
		fs::write(control.file(ControlFile::Pid), "").unwrap();
		assert_eq!(control.read_record::<u32>(ControlFile::Pid).unwrap(), None);
		fs::write(control.file(ControlFile::Pid), "4242\n").unwrap();
		assert_eq!(control.read_record::<u32>(ControlFile::Pid).unwrap(), Some(4242));
		fs::write(control.file(ControlFile::ExitValue), "-1\n").unwrap();
		assert_eq!(control.read_record::<i32>(ControlFile::ExitValue).unwrap(), Some(-1));

		fs::write(control.file(ControlFile::Pid), "garbage\n").unwrap();
		let err = control.read_record::<u32>(ControlFile::Pid).unwrap_err();
		assert!(matches!(err, Error::CorruptState { ref content, .. } if content == "garbage"));
	}

	#[test]
	fn test_read_pid_rejects_group_targets() {
		let home = tempfile::tempdir().unwrap();
		let control = ControlDirectory::new(home.path(), Uuid::new_v4());
		control.initialize().unwrap();

		assert_eq!(control.read_pid(ControlFile::Pid).unwrap(), None);
		fs::write(control.file(ControlFile::Pid), "4242\n").unwrap();
		assert_eq!(control.read_pid(ControlFile::Pid).unwrap(), Some(4242));

		for bad in ["0", "4294967295", "2147483648"] {
			fs::write(control.file(ControlFile::Pid), bad).unwrap();
			let err = control.read_pid(ControlFile::Pid).unwrap_err();
			assert!(matches!(err, Error::CorruptState { ref content, .. } if content == bad), "{}", bad);
		}
	}

	#[test]
	fn test_find_id() {
		let home = tempfile::tempdir().unwrap();
		assert!(matches!(
			ControlDirectory::find_id(home.path()),
			Err(Error::Acquisition { .. })
		));

		let id = Uuid::new_v4();
		ControlDirectory::new(home.path(), id).initialize().unwrap();
		fs::write(home.path().join("unrelated.txt"), "x").unwrap();
		assert_eq!(ControlDirectory::find_id(home.path()).unwrap(), id);

		ControlDirectory::new(home.path(), Uuid::new_v4()).initialize().unwrap();
		let err = ControlDirectory::find_id(home.path()).unwrap_err();
		assert!(err.to_string().contains("2 control directories"), "{}", err);
	}

	#[test]
	fn test_find_id_rejects_bad_suffix() {
		let home = tempfile::tempdir().unwrap();
		fs::create_dir(home.path().join(".control-")).unwrap();
		assert!(matches!(
			ControlDirectory::find_id(home.path()),
			Err(Error::Acquisition { .. })
		));
		assert!(matches!(
			ControlDirectory::find_id(&home.path().join("missing")),
			Err(Error::Acquisition { .. })
		));
	}
}
