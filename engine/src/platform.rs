//! Platform capabilities the controller depends on.
//!
//! The controller never touches processes, clocks or the desktop directly. It
//! is handed:
//! - a `Clock` for timestamps,
//! - a `Launcher` that starts the worker and returns a `JobHandle`,
//! - an `Opener` for "show this file/folder" requests.
//!
//! Process notifications come back as `PlatformEvent`s over a channel, which
//! the event loop feeds into `JobController::handle_event`.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};
use crate::config::{PanelConfig, HOSTS, PROCESS_COUNT};

/// Source of wall-clock time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<OsString>,
}

impl LaunchCommand {
    /// `<launcher> -hosts <HOSTS> -np <PROCESS_COUNT> <worker> <input> <output>`
    pub fn mpi(launcher: &str, worker: &Path, input: &Path, output: &Path) -> Self {
        LaunchCommand {
            program: launcher.to_string(),
            args: vec![
                OsString::from("-hosts"),
                OsString::from(HOSTS),
                OsString::from("-np"),
                OsString::from(PROCESS_COUNT.to_string()),
                worker.as_os_str().to_os_string(),
                input.as_os_str().to_os_string(),
                output.as_os_str().to_os_string(),
            ],
        }
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }
}

/// A launched worker process.
pub trait JobHandle {
    /// OS process id.
    fn id(&self) -> u32;

    /// Fire-and-forget termination. Death is learned later via `Exited`.
    fn terminate(&mut self) -> io::Result<()>;
}

/// Starts worker processes.
pub trait Launcher {
    fn spawn(&mut self, command: &LaunchCommand) -> io::Result<Box<dyn JobHandle>>;
}

/// Hands a path to the OS default handler.
pub trait Opener {
    fn open(&self, path: &Path) -> io::Result<()>;
}

/// Notifications about a launched process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// A bounded, not necessarily line-aligned, chunk of stdout.
    Output(Vec<u8>),
    /// stdout reached end of stream.
    OutputClosed,
    /// The process terminated. `code` is None when killed by a signal.
    Exited { code: Option<i32> },
}

/// How often the exit watcher polls a running child.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Launches real OS processes and reports on them through a channel.
pub struct ProcessLauncher {
    events: Sender<PlatformEvent>,
    chunk_size: usize,
    drain_timeout: Duration,
}

impl ProcessLauncher {
    pub fn new(events: Sender<PlatformEvent>, chunk_size: usize, drain_timeout: Duration) -> Self {
        ProcessLauncher {
            events,
            chunk_size: chunk_size.max(1),
            drain_timeout,
        }
    }

    pub fn from_config(config: &PanelConfig, events: Sender<PlatformEvent>) -> Self {
        Self::new(
            events,
            config.read_chunk_size,
            Duration::from_millis(config.exit_drain_timeout_ms),
        )
    }
}

impl Launcher for ProcessLauncher {
    fn spawn(&mut self, command: &LaunchCommand) -> io::Result<Box<dyn JobHandle>> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let pid = child.id();
        let Some(stdout) = child.stdout.take() else {
            discard_child(&mut child);
            return Err(io::Error::new(io::ErrorKind::Other, "worker stdout was not captured"));
        };

        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || drain_stderr(stderr, pid));
        }

        let slot = Arc::new(Mutex::new(ChildSlot {
            child,
            reaped: false,
        }));

        let (drained_tx, drained_rx) = crossbeam_channel::bounded::<()>(1);

        let events = self.events.clone();
        let chunk_size = self.chunk_size;
        thread::spawn(move || {
            pump_stdout(stdout, chunk_size, &events);
            let _ = drained_tx.send(());
        });

        let events = self.events.clone();
        let drain_timeout = self.drain_timeout;
        let watched = Arc::clone(&slot);
        thread::spawn(move || watch_exit(watched, drained_rx, drain_timeout, &events));

        debug!(pid, command = %command.display(), "worker launched");
        Ok(Box::new(ProcessHandle { pid, slot }))
    }
}

/// Kill and reap a child that will not be supervised.
fn discard_child(child: &mut Child) {
    let pid = child.id();
    if let Err(e) = child.kill() {
        warn!(pid, error = %e, "could not kill worker");
    }
    if let Err(e) = child.wait() {
        warn!(pid, error = %e, "could not reap worker");
    }
}

/// Read stderr to end of stream so the worker never blocks on a full pipe.
///
/// Lines are raw bytes; anything that is not UTF-8 is logged lossily.
fn drain_stderr(stderr: ChildStderr, pid: u32) {
    for line in BufReader::new(stderr).split(b'\n') {
        match line {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                debug!(pid, "worker stderr: {}", text.trim_end_matches('\r'));
            }
            Err(e) => {
                warn!(pid, error = %e, "reading worker stderr failed");
                break;
            }
        }
    }
}

/// Read stdout in bounded chunks until end of stream.
fn pump_stdout(mut stdout: ChildStdout, chunk_size: usize, events: &Sender<PlatformEvent>) {
    let mut buf = vec![0u8; chunk_size];
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if events.send(PlatformEvent::Output(buf[..n].to_vec())).is_err() {
                    // Nobody is listening any more
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "reading worker stdout failed");
                break;
            }
        }
    }
    let _ = events.send(PlatformEvent::OutputClosed);
}

/// A child shared by its exit watcher and its handle.
///
/// Reaping only happens with the lock held, so a handle that sees
/// `reaped == false` under the lock still owns a live pid.
#[derive(Debug)]
struct ChildSlot {
    child: Child,
    reaped: bool,
}

fn lock_slot(slot: &Mutex<ChildSlot>) -> MutexGuard<'_, ChildSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait for the process, give stdout a bounded chance to drain, then report.
fn watch_exit(
    slot: Arc<Mutex<ChildSlot>>,
    drained: Receiver<()>,
    drain_timeout: Duration,
    events: &Sender<PlatformEvent>,
) {
    let code = loop {
        let polled = {
            let mut guard = lock_slot(&slot);
            let polled = guard.child.try_wait();
            if !matches!(polled, Ok(None)) {
                guard.reaped = true;
            }
            polled
        };
        match polled {
            Ok(Some(status)) => break status.code(),
            Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
            Err(e) => {
                warn!(error = %e, "waiting for worker failed");
                break None;
            }
        }
    };

    if drained.recv_timeout(drain_timeout).is_err() {
        debug!("worker stdout still open after exit; reporting exit anyway");
    }

    let _ = events.send(PlatformEvent::Exited { code });
}

/// Handle to a process started by `ProcessLauncher`.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    slot: Arc<Mutex<ChildSlot>>,
}

impl JobHandle for ProcessHandle {
    fn id(&self) -> u32 {
        self.pid
    }

    /// Sends SIGKILL unless the worker has already been reaped.
    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let slot = lock_slot(&self.slot);
        if slot.reaped {
            debug!(pid = self.pid, "worker already exited; nothing to signal");
            return Ok(());
        }

        let pid = i32::try_from(self.pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        kill(Pid::from_raw(pid), Signal::SIGKILL).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        let mut slot = lock_slot(&self.slot);
        if slot.reaped {
            return Ok(());
        }
        slot.child.kill()
    }
}

/// Opens paths with the desktop's default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl Opener for SystemOpener {
    fn open(&self, path: &Path) -> io::Result<()> {
        let mut command = opener_command(path);
        command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        command.spawn().map(|_| ())
    }
}

fn opener_command(path: &Path) -> Command {
    if cfg!(target_os = "macos") {
        let mut command = Command::new("open");
        command.arg(path);
        command
    } else if cfg!(windows) {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]).arg(path);
        command
    } else {
        let mut command = Command::new("xdg-open");
        command.arg(path);
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpi_command_uses_fixed_hosts_and_process_count() {
        let command = LaunchCommand::mpi(
            "mpiexec",
            Path::new("/opt/arch_test"),
            Path::new("/data/in"),
            Path::new("/data/out"),
        );

        assert_eq!(command.program, "mpiexec");
        assert_eq!(
            command.display(),
            "mpiexec -hosts pc1,pc2,pc3 -np 32 /opt/arch_test /data/in /data/out"
        );
    }

    #[cfg(unix)]
    fn collect_until_exit(rx: &Receiver<PlatformEvent>) -> Vec<PlatformEvent> {
        let mut events = Vec::new();
        loop {
            let event = rx
                .recv_timeout(Duration::from_secs(10))
                .expect("Timed out waiting for worker events");
            let done = matches!(event, PlatformEvent::Exited { .. });
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_process_launcher_streams_output_then_exit() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut launcher = ProcessLauncher::new(tx, 8, Duration::from_secs(5));
        let command = LaunchCommand {
            program: "/bin/sh".to_string(),
            args: vec![
                OsString::from("-c"),
                OsString::from("printf 'Terminó imagen 1\\nTerminó imagen 2\\n'; echo oops >&2; exit 3"),
            ],
        };

        let handle = launcher.spawn(&command).expect("Failed to spawn shell");
        assert!(handle.id() > 0);

        let events = collect_until_exit(&rx);
        let output: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                PlatformEvent::Output(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .flatten()
            .collect();

        assert_eq!(
            String::from_utf8(output).expect("utf8"),
            "Terminó imagen 1\nTerminó imagen 2\n"
        );
        // Chunks are bounded by the configured size
        assert!(events.iter().all(|e| match e {
            PlatformEvent::Output(bytes) => bytes.len() <= 8,
            _ => true,
        }));
        let closed_at = events
            .iter()
            .position(|e| *e == PlatformEvent::OutputClosed)
            .expect("OutputClosed missing");
        assert_eq!(closed_at, events.len() - 2);
        assert_eq!(events.last(), Some(&PlatformEvent::Exited { code: Some(3) }));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_handle_terminate_kills_worker() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut launcher = ProcessLauncher::new(tx, 4096, Duration::from_millis(500));
        let command = LaunchCommand {
            program: "/bin/sh".to_string(),
            args: vec![OsString::from("-c"), OsString::from("exec sleep 30")],
        };

        let mut handle = launcher.spawn(&command).expect("Failed to spawn shell");
        handle.terminate().expect("Failed to send signal");

        let events = collect_until_exit(&rx);
        assert_eq!(events.last(), Some(&PlatformEvent::Exited { code: None }));
    }

    #[cfg(unix)]
    #[test]
    fn test_undecodable_stderr_does_not_stall_worker() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut launcher = ProcessLauncher::new(tx, 4096, Duration::from_secs(5));
        let script = "printf '\\377\\n' >&2; sleep 0.3; \
            i=0; while [ $i -lt 200 ]; do echo \"diagnostico $i\" >&2; i=$((i+1)); done; \
            echo 'Terminó imagen 1'; exit 0";
        let command = LaunchCommand {
            program: "/bin/sh".to_string(),
            args: vec![OsString::from("-c"), OsString::from(script)],
        };

        let _handle = launcher.spawn(&command).expect("Failed to spawn shell");
        let events = collect_until_exit(&rx);

        let output: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                PlatformEvent::Output(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(String::from_utf8_lossy(&output), "Terminó imagen 1\n");
        assert_eq!(events.last(), Some(&PlatformEvent::Exited { code: Some(0) }));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_after_exit_does_not_signal_reaped_pid() {
        let (tx, rx) = crossbeam_channel::unbounded();
        // The background sleep keeps stdout open, holding back `Exited`
        let mut launcher = ProcessLauncher::new(tx, 4096, Duration::from_secs(5));
        let command = LaunchCommand {
            program: "/bin/sh".to_string(),
            args: vec![OsString::from("-c"), OsString::from("sleep 2 & exit 0")],
        };

        let mut handle = launcher.spawn(&command).expect("Failed to spawn shell");
        thread::sleep(Duration::from_millis(500));
        assert!(
            !rx.try_iter().any(|e| matches!(e, PlatformEvent::Exited { .. })),
            "exit should still be held back"
        );

        handle.terminate().expect("terminate after exit should be a no-op");

        let events = collect_until_exit(&rx);
        assert_eq!(events.last(), Some(&PlatformEvent::Exited { code: Some(0) }));
    }

    #[cfg(unix)]
    #[test]
    fn test_discard_child_kills_and_reaps() {
        let mut child = Command::new("/bin/sh")
            .args(["-c", "exec sleep 30"])
            .spawn()
            .expect("Failed to spawn shell");

        discard_child(&mut child);

        let status = child
            .try_wait()
            .expect("try_wait failed")
            .expect("child should already be reaped");
        assert_eq!(status.code(), None);
    }

    #[test]
    fn test_process_launcher_reports_spawn_failure() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut launcher = ProcessLauncher::new(tx, 4096, Duration::from_millis(100));
        let command = LaunchCommand {
            program: "/definitely/not/a/launcher".to_string(),
            args: Vec::new(),
        };

        assert!(launcher.spawn(&command).is_err());
    }
}
