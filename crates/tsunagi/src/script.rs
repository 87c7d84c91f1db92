//! Launch script generation.
//!
//! The generated script redirects its own output into the control directory,
//! backgrounds the command under `nohup` with stdin read from the sink, and
//! records the command's pid, its exit code, and the pid of the backgrounded
//! subshell that waits on it:
//!
//! ```text
//! #!/bin/sh
//! exec 1> .control-<id>/std.out
//! exec 2> .control-<id>/std.err
//! (nohup <cmd...> < .control-<id>/std.in & x=$!; echo $x > .control-<id>/pid; wait $x; echo $? > .control-<id>/exit.value)&
//! echo $! > .control-<id>/wrapper.pid
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::control::{ControlDirectory, ControlFile};
use crate::error::Result;

pub fn render(control: &ControlDirectory, command: &[String]) -> String {
	let rel = |file: ControlFile| quote_path(&control.relative(file));

	let mut script = String::from("#!/bin/sh\n");
	let _ = writeln!(script, "exec 1> {}", rel(ControlFile::StdOut));
	let _ = writeln!(script, "exec 2> {}", rel(ControlFile::StdErr));

	script.push_str("(nohup ");
	for part in command {
		script.push_str(&quote(part));
		script.push(' ');
	}
	let _ = writeln!(
		script,
		"< {} & x=$!; echo $x > {}; wait $x; echo $? > {})&",
		rel(ControlFile::StdIn),
		rel(ControlFile::Pid),
		rel(ControlFile::ExitValue),
	);
	let _ = writeln!(script, "echo $! > {}", rel(ControlFile::WrapperPid));
	script
}

/// Write the script into the control directory and return its absolute path.
pub fn write(control: &ControlDirectory, command: &[String]) -> Result<PathBuf> {
	let path = control.file(ControlFile::Script);
	fs::write(&path, render(control, command))?;
	Ok(path)
}

/// Quote one word for POSIX `sh`.
pub fn quote(word: &str) -> String {
	let safe = !word.is_empty()
		&& word
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
	if safe {
		return word.to_string();
	}
	format!("'{}'", word.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
	quote(&path.to_string_lossy())
}
