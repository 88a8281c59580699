use super::{run_bounded, CommandExecutor};
use crate::error::Result;
use std::process::Command;
use std::time::Duration;
use sysinfo::System;
use tracing::debug;

/// Runs commands on this host through `sh -c`.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    timeout: Duration,
}

impl LocalExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandExecutor for LocalExecutor {
    fn execute(&self, command: &str) -> Result<Vec<String>> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);

        let finished = run_bounded(&mut cmd, self.timeout)?;
        if !finished.status.success() {
            debug!(command, status = %finished.status, "local command exited unsuccessfully");
        }
        Ok(finished.lines())
    }

    fn target_name(&self) -> String {
        System::host_name().unwrap_or_else(|| "localhost".to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn runs_shell_pipelines() {
        let exec = LocalExecutor::new(Duration::from_secs(5));
        let lines = exec.execute("printf 'USER PID\\nroot 1\\n' | grep -v USER").unwrap();
        assert_eq!(lines, vec!["root 1"]);
    }

    #[test]
    fn missing_tool_yields_empty_output() {
        let exec = LocalExecutor::new(Duration::from_secs(5));
        let lines = exec.execute("definitely-not-a-real-tool-xyz").unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn joined_output_keeps_line_breaks() {
        let exec = LocalExecutor::new(Duration::from_secs(5));
        assert_eq!(exec.execute_joined("echo a; echo b").unwrap(), "a\nb");
    }

    #[test]
    fn slow_command_times_out() {
        let exec = LocalExecutor::new(Duration::from_millis(100));
        let err = exec.execute("sleep 10").err().unwrap();
        assert!(matches!(err, CoreError::Connection(_)));
    }

    #[test]
    fn target_is_never_empty() {
        let exec = LocalExecutor::new(Duration::from_secs(1));
        assert!(!exec.target_name().is_empty());
    }
}
