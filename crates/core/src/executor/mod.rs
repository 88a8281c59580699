//! Running diagnostic commands against the monitored target.
//!
//! Agents only see [`CommandExecutor`]; whether the command runs on this host
//! or over ssh is decided once by the supervisor.

pub mod local;
pub mod remote;

pub use local::LocalExecutor;
pub use remote::RemoteExecutor;

use crate::error::{CoreError, Result};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Minimum wait for stdout to close once the child has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(50);

/// Executes a command string on a fixed target and returns its stdout.
pub trait CommandExecutor: Send + Sync {
    /// Run `command` and return its standard output split into lines.
    ///
    /// A non-zero exit status is not an error: whatever was printed is
    /// returned and callers decide whether it is usable.
    fn execute(&self, command: &str) -> Result<Vec<String>>;

    /// Run `command` and return its output as one string.
    fn execute_joined(&self, command: &str) -> Result<String> {
        Ok(self.execute(command)?.join("\n"))
    }

    /// Address or hostname identifying the target, used to key its store.
    fn target_name(&self) -> String;
}

/// A child process that ran to completion within its deadline.
pub(crate) struct Finished {
    pub status: ExitStatus,
    pub stdout: String,
}

impl Finished {
    pub fn lines(&self) -> Vec<String> {
        self.stdout.lines().map(str::to_string).collect()
    }
}

/// Spawn `command` and wait at most `timeout` for it.
///
/// The child is placed in its own process group so that on expiry the shell
/// and everything it started are killed together.
pub(crate) fn run_bounded(command: &mut Command, timeout: Duration) -> Result<Finished> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn()?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| CoreError::connection("child stdout was not captured"))?;

    // Drain the pipe concurrently so a chatty child never blocks on a full buffer.
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            kill_group(&mut child);
            let _ = child.wait();
            return Err(expired(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    };

    // The shell may be gone while something it started still holds stdout.
    let drain = deadline.saturating_duration_since(Instant::now()).max(DRAIN_GRACE);
    let bytes = match rx.recv_timeout(drain) {
        Ok(bytes) => bytes,
        Err(RecvTimeoutError::Timeout) => {
            kill_group(&mut child);
            return Err(expired(timeout));
        }
        Err(RecvTimeoutError::Disconnected) => {
            return Err(CoreError::connection("stdout reader thread panicked"));
        }
    };

    Ok(Finished {
        status,
        stdout: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

fn expired(timeout: Duration) -> CoreError {
    CoreError::connection(format!(
        "command did not finish within {} ms",
        timeout.as_millis()
    ))
}

/// Kill `child` and every process left in its group.
#[cfg(unix)]
pub(crate) fn kill_group(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let group = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(group, Signal::SIGKILL) {
        debug!(pid = child.id(), error = %e, "killpg failed, killing child only");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_group(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(pid = child.id(), error = %e, "failed to kill timed out child");
    }
}
