use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tsunagi::*;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_dir(name: &str) -> std::path::PathBuf {
	let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
	let dir = std::env::temp_dir().join(format!("tsunagi-test-{}-{}-{}", std::process::id(), n, name));
	let _ = std::fs::remove_dir_all(&dir);
	let _ = std::fs::create_dir_all(&dir);
	dir
}

fn factory() -> ProcessFactory {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
	ProcessFactory::new(SupervisorConfig::default()).unwrap()
}

fn supervisor(name: &str, command: &[&str]) -> (ProcessSupervisor, std::path::PathBuf) {
	let dir = temp_dir(name);
	let handle = ProcessHandle::builder()
		.command(command.iter().copied())
		.working_dir(&dir)
		.build();
	(factory().create_with(handle), dir)
}

// --- Short-lived processes ---

#[test]
fn echo_exits_cleanly() {
	let (sup, dir) = supervisor("echo", &["echo", "hello-tsunagi"]);
	sup.start().unwrap();
	assert!(sup.pid().is_some());
	assert!(sup.wrapper_pid().is_some());

	assert_eq!(sup.wait_for().unwrap(), 0);
	assert!(!sup.is_active().unwrap());
	assert_eq!(sup.exit_value().unwrap(), 0);
	assert_eq!(sup.state(), ProcessState::Terminated);

	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn exit_code_is_reported() {
	let (sup, dir) = supervisor("exit-code", &["sh", "-c", "exit 3"]);
	sup.start().unwrap();
	assert_eq!(sup.wait_for().unwrap(), 3);
	assert_eq!(sup.status().exit_code, Some(3));

	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn output_is_captured() {
	let (sup, dir) = supervisor("output", &["sh", "-c", "echo one; echo two; echo oops >&2"]);
	sup.start().unwrap();
	sup.wait_for().unwrap();

	assert_eq!(sup.tail(Stream::Stdout, 10).unwrap(), vec!["one", "two"]);
	assert_eq!(sup.tail(Stream::Stdout, 1).unwrap(), vec!["two"]);
	let stderr = sup.tail(Stream::Stderr, 10).unwrap();
	assert!(stderr.iter().any(|l| l == "oops"), "stderr was: {:?}", stderr);

	let mut text = String::new();
	std::io::Read::read_to_string(&mut sup.stdout().unwrap(), &mut text).unwrap();
	assert_eq!(text, "one\ntwo\n");

	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn arguments_with_spaces_and_quotes() {
	let (sup, dir) = supervisor("quoting", &["echo", "it's a test", "$HOME"]);
	sup.start().unwrap();
	sup.wait_for().unwrap();
	assert_eq!(sup.tail(Stream::Stdout, 1).unwrap(), vec!["it's a test $HOME"]);

	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn runs_in_working_directory() {
	let (sup, dir) = supervisor("cwd", &["ls", "-a"]);
	std::fs::write(dir.join("marker.txt"), "x").unwrap();
	sup.start().unwrap();
	sup.wait_for().unwrap();

	let listing = sup.tail(Stream::Stdout, 100).unwrap();
	assert!(listing.iter().any(|l| l == "marker.txt"), "listing: {:?}", listing);
	assert!(listing.iter().any(|l| l.starts_with(CONTROL_DIR_PREFIX)));

	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn passes_env_vars() {
	let dir = temp_dir("env");
	let handle = ProcessHandle::builder()
		.command(["sh", "-c", "echo $TSUNAGI_TEST_VAR"])
		.working_dir(&dir)
		.env("TSUNAGI_TEST_VAR", "hello123")
		.build();
	let sup = factory().create_with(handle);
	sup.start().unwrap();
	sup.wait_for().unwrap();
	assert_eq!(sup.tail(Stream::Stdout, 1).unwrap(), vec!["hello123"]);

	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn control_directory_layout() {
	let (sup, dir) = supervisor("layout", &["true"]);
	sup.start().unwrap();
	sup.wait_for().unwrap();

	let control = sup.control_directory().unwrap();
	assert_eq!(control.path(), dir.join(format!(".control-{}", sup.id())));
	for file in [
		ControlFile::StdIn,
		ControlFile::StdOut,
		ControlFile::StdErr,
		ControlFile::Pid,
		ControlFile::WrapperPid,
		ControlFile::ExitValue,
		ControlFile::Script,
	] {
		assert!(control.file(file).exists(), "missing {}", file.file_name());
	}
	assert_eq!(ControlDirectory::find_id(&dir).unwrap(), sup.id());

	// the stdin sink accepts writes even though nothing reads it
	writeln!(sup.stdin().unwrap(), "ignored").unwrap();

	let _ = std::fs::remove_dir_all(&dir);
}

// --- Long-running processes ---

#[test]
fn stop_long_running_process() {
	let (sup, dir) = supervisor("stop", &["sleep", "60"]);
	sup.start().unwrap();
	assert!(sup.is_active().unwrap());
	assert_eq!(sup.state(), ProcessState::Active);
	assert!(sup.wait_for_timeout(Duration::from_millis(100)).unwrap().is_none());

	let started = Instant::now();
	sup.stop(Duration::from_secs(1)).unwrap();
	assert!(started.elapsed() < Duration::from_secs(3));
	assert!(!sup.is_active().unwrap());
	assert_eq!(sup.wait_for().unwrap(), 143);

	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stop_escalates_when_term_is_ignored() {
	let (sup, dir) = supervisor("ignore-term", &["sh", "-c", "trap '' TERM; sleep 5"]);
	sup.start().unwrap();
	assert!(sup.is_active().unwrap());

	sup.stop(Duration::from_millis(300)).unwrap();
	assert!(!sup.is_active().unwrap());
	assert_eq!(sup.wait_for().unwrap(), 137);

	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn start_is_idempotent_while_active() {
	let (sup, dir) = supervisor("idempotent", &["sleep", "60"]);
	sup.start().unwrap();
	let pid = sup.pid();
	sup.start().unwrap();
	assert_eq!(sup.pid(), pid);

	sup.stop(Duration::from_secs(1)).unwrap();
	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn restart_gives_new_pid() {
	let (sup, dir) = supervisor("restart", &["sleep", "60"]);
	sup.start().unwrap();
	let first = sup.pid().unwrap();

	sup.restart(Duration::from_secs(1)).unwrap();
	let second = sup.pid().unwrap();
	assert_ne!(first, second);
	assert!(sup.is_active().unwrap());

	sup.stop(Duration::from_secs(1)).unwrap();
	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn reacquire_from_working_directory() {
	let (sup, dir) = supervisor("acquire", &["sleep", "60"]);
	sup.start().unwrap();

	let again = factory().acquire_from(&dir).unwrap();
	assert_eq!(again, sup);
	assert_eq!(again.pid(), sup.pid());
	assert_eq!(again.wrapper_pid(), sup.wrapper_pid());
	assert!(again.is_active().unwrap());

	again.stop(Duration::from_secs(1)).unwrap();
	assert!(!sup.is_active().unwrap());
	assert_eq!(sup.wait_for().unwrap(), 143);

	let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn destroy_removes_working_directory() {
	let (sup, dir) = supervisor("destroy", &["sleep", "60"]);
	sup.start().unwrap();
	sup.destroy().unwrap();
	assert!(!dir.exists());
	assert!(!sup.is_active().unwrap());
}

// --- Async adapter ---

#[tokio::test]
async fn nonblocking_lifecycle() {
	let (sup, dir) = supervisor("async", &["sleep", "60"]);
	let sup = Arc::new(sup);

	nonblocking::start(Arc::clone(&sup)).await.unwrap();
	assert!(sup.is_active().unwrap());

	let waiter = tokio::spawn(nonblocking::wait_for(Arc::clone(&sup)));
	nonblocking::stop(Arc::clone(&sup), Duration::from_secs(1)).await.unwrap();
	assert_eq!(waiter.await.unwrap().unwrap(), 143);

	let _ = std::fs::remove_dir_all(&dir);
}
