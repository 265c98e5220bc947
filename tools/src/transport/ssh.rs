//! File primitive over plain `ssh` subprocesses.
//!
//! Each operation is one `ssh` invocation running a short POSIX shell snippet
//! on the remote host. Listing fetches candidate files with `find` and applies
//! the glob locally so pattern semantics match the other transports.

use std::time::Duration;

use outpost_types::{RemoteLocator, RemotePath};
use tokio::process::Command;

use super::{RemoteFs, TransportError, TransportFut};
use crate::glob;
use crate::process::{CapturedOutput, ProcessError, run_captured};

/// Exit status `ssh` itself uses for connection failures.
const SSH_CONNECTION_FAILED: i32 = 255;
/// Exit status our read snippet uses for a missing file.
const READ_MISSING: i32 = 3;

/// Default cap on one file read or one directory listing.
pub const DEFAULT_MAX_FILE_BYTES: usize = 64 * 1024 * 1024;

/// How to reach the remote host.
///
/// `command("x")` runs `program args... x`. For ssh the args end with the
/// destination, so `x` is executed by the remote login shell.
#[derive(Debug, Clone)]
pub struct SshTarget {
    program: String,
    args: Vec<String>,
    host: Option<String>,
}

impl SshTarget {
    /// `binary [extra_args] -T host`.
    #[must_use]
    pub fn ssh(binary: impl Into<String>, extra_args: &[String], host: impl Into<String>) -> Self {
        let host = host.into();
        let mut args = extra_args.to_vec();
        args.push("-T".to_string());
        args.push(host.clone());
        Self {
            program: binary.into(),
            args,
            host: Some(host),
        }
    }

    /// Run snippets with a local `sh -c` instead of a remote host.
    #[must_use]
    pub fn local_shell() -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string()],
            host: None,
        }
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    #[must_use]
    pub fn label(&self) -> String {
        match &self.host {
            Some(host) => format!("{} {host}", self.program),
            None => self.program.clone(),
        }
    }

    #[must_use]
    pub fn command(&self, remote_command: &str) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(remote_command);
        command
    }

    /// Whether a finished invocation failed to reach the host at all.
    #[must_use]
    pub fn is_connection_failure(&self, code: Option<i32>) -> bool {
        self.host.is_some() && code == Some(SSH_CONNECTION_FAILED)
    }
}

/// File primitive over ssh.
///
/// `max_bytes` bounds a single read or listing. Anything larger is an error,
/// never a silently shortened result.
#[derive(Debug, Clone)]
pub struct SshFs {
    target: SshTarget,
    timeout: Duration,
    max_bytes: usize,
}

impl SshFs {
    #[must_use]
    pub fn new(target: SshTarget, timeout: Duration, max_bytes: usize) -> Self {
        Self {
            target,
            timeout,
            max_bytes,
        }
    }

    async fn run(
        &self,
        locator: &RemoteLocator,
        script: &str,
        stdin: Option<&[u8]>,
    ) -> Result<CapturedOutput, TransportError> {
        tracing::debug!(ssh = %self.target.label(), %locator, "ssh file op");
        let output = run_captured(self.target.command(script), stdin, self.max_bytes, self.timeout)
            .await
            .map_err(|e| match e {
                ProcessError::Spawn { .. } => TransportError::Unreachable {
                    message: e.to_string(),
                },
                ProcessError::Io(_) | ProcessError::TimedOut(_) => TransportError::io(locator, e),
            })?;
        if self.target.is_connection_failure(output.code) {
            return Err(TransportError::Unreachable {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

fn quote(locator: &RemoteLocator, raw: &str) -> Result<String, TransportError> {
    shlex::try_quote(raw)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| TransportError::io(locator, e))
}

fn failure(locator: &RemoteLocator, output: &CapturedOutput) -> TransportError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = match output.code {
        Some(code) if stderr.trim().is_empty() => format!("exit code {code}"),
        Some(code) => format!("exit code {code}: {}", stderr.trim()),
        None => "terminated by signal".to_string(),
    };
    TransportError::io(locator, message)
}

impl RemoteFs for SshFs {
    fn read<'a>(&'a self, locator: &'a RemoteLocator) -> TransportFut<'a, Vec<u8>> {
        Box::pin(async move {
            let path = quote(locator, locator.path.as_str())?;
            let script = format!("[ -f {path} ] || exit {READ_MISSING}; exec cat -- {path}");
            let output = self.run(locator, &script, None).await?;
            match output.code {
                Some(0) if output.stdout_truncated => Err(TransportError::io(
                    locator,
                    format!("file is larger than the {} byte read limit", self.max_bytes),
                )),
                Some(0) => Ok(output.stdout),
                Some(READ_MISSING) => Err(TransportError::not_found(locator)),
                _ => Err(failure(locator, &output)),
            }
        })
    }

    fn write<'a>(
        &'a self,
        locator: &'a RemoteLocator,
        content: &'a [u8],
    ) -> TransportFut<'a, ()> {
        Box::pin(async move {
            let path = quote(locator, locator.path.as_str())?;
            let parent = locator.path.parent().unwrap_or_else(RemotePath::root);
            let parent = quote(locator, parent.as_str())?;
            let script = format!("mkdir -p -- {parent} && cat > {path}");
            let output = self.run(locator, &script, Some(content)).await?;
            if output.code == Some(0) {
                Ok(())
            } else {
                Err(failure(locator, &output))
            }
        })
    }

    fn list<'a>(
        &'a self,
        base: &'a RemoteLocator,
        pattern: &'a str,
        limit: usize,
    ) -> TransportFut<'a, Vec<RemotePath>> {
        Box::pin(async move {
            let glob_set =
                glob::compile(pattern).map_err(|message| TransportError::InvalidPattern { message })?;
            let dir = quote(base, base.path.as_str())?;
            let script = format!(
                "[ -d {dir} ] || exit {READ_MISSING}; find {dir} -name .git -prune -o -type f -print"
            );
            let output = self.run(base, &script, None).await?;
            match output.code {
                Some(0) => {}
                Some(READ_MISSING) => return Err(TransportError::not_found(base)),
                _ => return Err(failure(base, &output)),
            }
            let listing = String::from_utf8_lossy(&output.stdout);
            // The last line of a cut-off listing is a partial path.
            let complete = if output.stdout_truncated {
                listing.rfind('\n').map_or("", |end| &listing[..=end])
            } else {
                &listing
            };
            let found: Vec<RemotePath> = complete
                .lines()
                .filter_map(|line| RemotePath::new(line).ok())
                .filter(|path| {
                    path.strip_prefix(&base.path)
                        .is_some_and(|rel| !rel.is_empty() && glob_set.is_match(rel))
                })
                .take(limit)
                .collect();
            if output.stdout_truncated && found.len() < limit {
                return Err(TransportError::io(
                    base,
                    format!(
                        "listing exceeds the {} byte limit; search a narrower directory",
                        self.max_bytes
                    ),
                ));
            }
            Ok(found)
        })
    }
}
