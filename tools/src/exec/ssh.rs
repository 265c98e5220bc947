//! One secure-shell subprocess per command.

use std::time::Duration;

use outpost_types::{ExecOutput, RemotePath};

use super::{CommandExecutor, ExecFut, scoped_command};
use crate::ToolError;
use crate::process::{ProcessError, run_captured};
use crate::transport::{SshTarget, TransportError};

/// Default cap on each of stdout and stderr.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SshExecutor {
    target: SshTarget,
    max_output_bytes: usize,
}

impl SshExecutor {
    #[must_use]
    pub fn new(target: SshTarget) -> Self {
        Self {
            target,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }
}

impl CommandExecutor for SshExecutor {
    fn execute<'a>(
        &'a self,
        command: &'a str,
        cwd: Option<&'a RemotePath>,
        timeout: Duration,
    ) -> ExecFut<'a> {
        Box::pin(async move {
            let remote = scoped_command(command, cwd)?;
            tracing::debug!(ssh = %self.target.label(), "running command over ssh");
            let output = run_captured(
                self.target.command(&remote),
                None,
                self.max_output_bytes,
                timeout,
            )
            .await
            .map_err(|e| match e {
                ProcessError::TimedOut(elapsed) => ToolError::TimedOut { elapsed },
                ProcessError::Spawn { .. } => ToolError::Transport(TransportError::Unreachable {
                    message: e.to_string(),
                }),
                ProcessError::Io(_) => ToolError::ExecutionFailed {
                    tool: "bash".to_string(),
                    message: e.to_string(),
                },
            })?;

            if self.target.is_connection_failure(output.code) {
                return Err(ToolError::Transport(TransportError::Unreachable {
                    message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                }));
            }

            Ok(ExecOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                // Killed by a signal: report it the way a shell would.
                exit_code: output.code.unwrap_or(-1),
            })
        })
    }
}
