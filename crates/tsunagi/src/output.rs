use std::io::{self, BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};
use uuid::Uuid;

/// Drain a launcher pipe on a background thread so the script never blocks
/// on a full pipe buffer. Lines are logged at debug level.
pub fn drain<R>(id: Uuid, label: &'static str, reader: R) -> io::Result<JoinHandle<()>>
where
	R: Read + Send + 'static,
{
	thread::Builder::new()
		.name(format!("tsunagi-drain-{}-{}", label, id))
		.spawn(move || {
			let mut lines = BufReader::new(reader).lines();
			loop {
				match lines.next() {
					None => break,
					Some(Ok(line)) => tracing::debug!(id = %id, stream = label, "{}", line),
					Some(Err(e)) if is_closed(&e) => {
						tracing::debug!(id = %id, stream = label, "launcher stream closed");
						break;
					}
					Some(Err(e)) => {
						tracing::error!(id = %id, stream = label, "failed reading launcher output: {}", e);
						break;
					}
				}
			}
		})
}

fn is_closed(e: &io::Error) -> bool {
	matches!(
		e.kind(),
		io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset
	) || e.raw_os_error() == Some(nix::libc::EBADF)
}
