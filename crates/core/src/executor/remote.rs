use super::{kill_group, run_bounded, CommandExecutor, Finished};
use crate::config::TargetConfig;
use crate::error::{CoreError, Result};
use parking_lot::Mutex;
use std::fs;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Exit status OpenSSH reserves for its own failures.
const SSH_FAILURE_STATUS: i32 = 255;

const MASTER_POLL: Duration = Duration::from_millis(50);

/// Runs commands on a remote host over one authenticated OpenSSH session.
///
/// `connect` starts a control master that logs in once; every command is
/// then multiplexed over its socket without authenticating again. Password
/// authentication of the master goes through `sshpass -e`, which reads the
/// secret from the `SSHPASS` environment variable so it never shows up in
/// `ps`. Without a secret the client runs in batch mode and relies on keys
/// or an agent.
///
/// A master that dies mid-run is re-established before the next command.
#[derive(Debug)]
pub struct RemoteExecutor {
    target: TargetConfig,
    timeout: Duration,
    control_dir: TempDir,
    master: Mutex<Option<Child>>,
}

impl RemoteExecutor {
    /// Open a session to `target` so that unreachable hosts and bad
    /// credentials are reported before any agent starts.
    pub fn connect(target: TargetConfig, timeout: Duration) -> Result<Self> {
        let executor = Self::new(target, timeout)?;
        {
            let mut master = executor.master.lock();
            executor.open_master(&mut master)?;
        }
        info!(destination = %executor.destination(), "remote session established");
        Ok(executor)
    }

    fn new(target: TargetConfig, timeout: Duration) -> Result<Self> {
        if target.host.is_empty() || target.username.is_empty() {
            return Err(CoreError::connection(
                "remote target needs both a host and a username",
            ));
        }
        let control_dir = tempfile::Builder::new().prefix("pimon-ssh-").tempdir()?;

        Ok(Self {
            target,
            timeout,
            control_dir,
            master: Mutex::new(None),
        })
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.target.username, self.target.host)
    }

    fn control_path(&self) -> PathBuf {
        self.control_dir.path().join("master.sock")
    }

    /// The long-lived login that owns the control socket.
    fn master_command(&self) -> Command {
        let mut cmd = match &self.target.secret {
            Some(secret) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg("ssh").env("SSHPASS", secret);
                cmd.args(["-o", "NumberOfPasswordPrompts=1"]);
                cmd
            }
            None => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-o", "BatchMode=yes"]);
                cmd
            }
        };

        cmd.args(["-M", "-N", "-S"])
            .arg(self.control_path())
            .args(["-o", "ControlPersist=no"])
            .args(["-o", "ServerAliveInterval=15", "-o", "ServerAliveCountMax=3"]);
        self.connection_args(&mut cmd);
        cmd.arg(self.destination());
        cmd
    }

    /// One command multiplexed over the master's socket.
    ///
    /// Batch mode keeps a missing master from turning into a password prompt.
    fn session_command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-S")
            .arg(self.control_path())
            .args(["-o", "ControlMaster=no", "-o", "BatchMode=yes"]);
        self.connection_args(&mut cmd);
        cmd.arg(self.destination()).arg("--").arg(remote_command);
        cmd
    }

    fn check_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-S")
            .arg(self.control_path())
            .args(["-O", "check"])
            .arg(self.destination());
        cmd
    }

    fn connection_args(&self, cmd: &mut Command) {
        let connect_secs = self.timeout.as_secs().max(1);
        cmd.args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg("-o")
            .arg(format!("ConnectTimeout={connect_secs}"))
            .arg("-p")
            .arg(self.target.port.to_string());
    }

    /// Replace whatever is in `slot` with a freshly authenticated master.
    fn open_master(&self, slot: &mut Option<Child>) -> Result<()> {
        if let Some(mut old) = slot.take() {
            kill_group(&mut old);
            let _ = old.wait();
        }
        let _ = fs::remove_file(self.control_path());

        let mut cmd = self.master_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let mut master = cmd.spawn().map_err(|e| {
            CoreError::connection(format!("failed to start ssh client: {e}"))
        })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = master.try_wait()? {
                return Err(CoreError::connection(format!(
                    "cannot reach {} ({status})",
                    self.destination()
                )));
            }
            if self.control_path().exists() && self.master_ready() {
                debug!(pid = master.id(), "ssh control master ready");
                *slot = Some(master);
                return Ok(());
            }
            if Instant::now() >= deadline {
                kill_group(&mut master);
                let _ = master.wait();
                return Err(CoreError::connection(format!(
                    "timed out connecting to {}",
                    self.destination()
                )));
            }
            thread::sleep(MASTER_POLL);
        }
    }

    fn master_ready(&self) -> bool {
        run_bounded(&mut self.check_command(), self.timeout)
            .map(|finished| finished.status.success())
            .unwrap_or(false)
    }

    /// Make sure a live master is available, reconnecting if it died.
    fn ensure_session(&self) -> Result<()> {
        let mut master = self.master.lock();
        let alive = match master.as_mut() {
            Some(child) => child.try_wait()?.is_none(),
            None => false,
        };
        if alive {
            return Ok(());
        }

        warn!(destination = %self.destination(), "remote session lost, reconnecting");
        self.open_master(&mut master)
    }
}

/// Split ssh's own failures from the remote command's exit status.
///
/// A non-zero status of the remote command is not an error: whatever it
/// printed is returned and the parser decides whether it is usable.
fn command_output(finished: Finished, command: &str, destination: &str) -> Result<Vec<String>> {
    match finished.status.code() {
        Some(SSH_FAILURE_STATUS) => Err(CoreError::connection(format!(
            "ssh to {destination} failed while running {command:?}"
        ))),
        Some(0) => Ok(finished.lines()),
        _ => {
            debug!(command, status = %finished.status, "remote command exited unsuccessfully");
            Ok(finished.lines())
        }
    }
}

impl CommandExecutor for RemoteExecutor {
    fn execute(&self, command: &str) -> Result<Vec<String>> {
        self.ensure_session()?;

        let mut cmd = self.session_command(command);
        let finished = run_bounded(&mut cmd, self.timeout).map_err(|e| match e {
            CoreError::Io(io) => CoreError::connection(format!("failed to start ssh client: {io}")),
            other => other,
        })?;
        command_output(finished, command, &self.destination())
    }

    fn target_name(&self) -> String {
        self.target.host.clone()
    }
}

impl Drop for RemoteExecutor {
    fn drop(&mut self) {
        if let Some(mut master) = self.master.get_mut().take() {
            kill_group(&mut master);
            let _ = master.wait();
            debug!(destination = %self.destination(), "remote session closed");
        }
    }
}
