//! Remote command execution.
//!
//! Two implementations share one contract: run a command string on the remote
//! host, optionally in a working directory, and return its captured output and
//! exit code, or fail with [`ToolError::TimedOut`].

mod sentinel;
mod ssh;

pub use sentinel::{DEFAULT_POLL_INTERVAL, DEFAULT_SENTINEL_DIR, SentinelExecutor};
pub use ssh::{DEFAULT_MAX_OUTPUT_BYTES, SshExecutor};

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use outpost_types::{ExecOutput, RemotePath};

use crate::ToolError;

pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(120);

pub type ExecFut<'a> = Pin<Box<dyn Future<Output = Result<ExecOutput, ToolError>> + Send + 'a>>;

pub trait CommandExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        command: &'a str,
        cwd: Option<&'a RemotePath>,
        timeout: Duration,
    ) -> ExecFut<'a>;
}

/// Quote one word for a POSIX shell.
pub(crate) fn shell_quote(raw: &str) -> Result<String, ToolError> {
    shlex::try_quote(raw)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ToolError::BadArgs {
            message: format!("cannot pass {raw:?} to the remote shell: {e}"),
        })
}

/// `sh -c <command>`, preceded by a `cd` when a working directory is given.
///
/// The command runs in its own `sh` so an `exit` inside it only ends that
/// process.
pub(crate) fn scoped_command(command: &str, cwd: Option<&RemotePath>) -> Result<String, ToolError> {
    let body = format!("sh -c {}", shell_quote(command)?);
    Ok(match cwd {
        Some(dir) => format!("cd {} && exec {body}", shell_quote(dir.as_str())?),
        None => format!("exec {body}"),
    })
}
