use parking_lot::RwLock;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::Result;

const CHUNK_SIZE: u64 = 8 * 1024;
const NEVER: u64 = 0;

/// Serves the last lines of a growing file from a cache that is reloaded at
/// most once per freshness interval.
///
/// A caller that finds the cache stale tries the write lock without
/// blocking; whoever wins reloads, everyone else reads the previous snapshot.
#[derive(Debug)]
pub struct CachedTailReader {
	path: PathBuf,
	max_lines: usize,
	freshness: Duration,
	epoch: Instant,
	// nanos since `epoch` of the last reload, offset by one so that 0 means never
	refreshed_at: AtomicU64,
	lines: RwLock<Vec<String>>,
}

impl CachedTailReader {
	pub fn new(path: impl Into<PathBuf>, freshness: Duration, max_lines: usize) -> Self {
		Self {
			path: path.into(),
			max_lines,
			freshness,
			epoch: Instant::now(),
			refreshed_at: AtomicU64::new(NEVER),
			lines: RwLock::new(Vec::with_capacity(max_lines)),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn max_lines(&self) -> usize {
		self.max_lines
	}

	/// At most `n` of the most recent lines, oldest first.
	pub fn tail(&self, n: usize) -> Result<Vec<String>> {
		if n == 0 {
			return Ok(Vec::new());
		}
		let n = n.min(self.max_lines);

		if self.is_stale() {
			if let Some(mut lines) = self.lines.try_write() {
				if self.is_stale() {
					*lines = read_last_lines(&self.path, self.max_lines)?;
					self.mark_fresh();
				}
			}
		}

		let lines = self.lines.read();
		let start = lines.len().saturating_sub(n);
		Ok(lines[start..].to_vec())
	}

	/// Force the next call to reload.
	pub fn invalidate(&self) {
		self.refreshed_at.store(NEVER, Ordering::Release);
	}

	pub fn is_stale(&self) -> bool {
		let at = self.refreshed_at.load(Ordering::Acquire);
		if at == NEVER {
			return true;
		}
		let age = self.now().saturating_sub(at);
		age >= self.freshness.as_nanos() as u64
	}

	fn mark_fresh(&self) {
		self.refreshed_at.store(self.now(), Ordering::Release);
	}

	fn now(&self) -> u64 {
		self.epoch.elapsed().as_nanos() as u64 + 1
	}
}

/// Last `max` lines of `path` in file order, read backwards from the end.
pub fn read_last_lines(path: &Path, max: usize) -> Result<Vec<String>> {
	let mut newest_first = Vec::new();
	if max == 0 {
		return Ok(newest_first);
	}

	let mut file = File::open(path)?;
	let len = file.metadata()?.len();
	if len == 0 {
		return Ok(newest_first);
	}

	let mut pos = len;
	let mut fragment: Vec<u8> = Vec::new();
	let mut at_end = true;

	while pos > 0 {
		let start = pos.saturating_sub(CHUNK_SIZE);
		let mut chunk = vec![0u8; (pos - start) as usize];
		file.seek(SeekFrom::Start(start))?;
		file.read_exact(&mut chunk)?;
		chunk.extend_from_slice(&fragment);
		fragment = chunk;
		pos = start;

		while let Some(idx) = fragment.iter().rposition(|&b| b == b'\n') {
			let line = &fragment[idx + 1..];
			if at_end && line.is_empty() {
				// trailing newline terminates the last line
			} else {
				newest_first.push(decode(line));
				if newest_first.len() == max {
					newest_first.reverse();
					return Ok(newest_first);
				}
			}
			at_end = false;
			fragment.truncate(idx);
		}
		at_end = false;
	}

	newest_first.push(decode(&fragment));
	newest_first.reverse();
	Ok(newest_first)
}

fn decode(line: &[u8]) -> String {
	let line = line.strip_suffix(b"\r").unwrap_or(line);
	String::from_utf8_lossy(line).into_owned()
}
