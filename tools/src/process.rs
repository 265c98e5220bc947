//! Shared subprocess management utilities.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// RAII guard that kills a child process (and its process group on Unix) on drop.
///
/// Wrap a spawned `tokio::process::Child` immediately after `spawn()` to ensure
/// cleanup if the owning future is cancelled or times out. Call `disarm()`
/// after the process exits normally to prevent the kill.
pub struct ChildGuard {
    child: Option<tokio::process::Child>,
}

impl ChildGuard {
    #[must_use]
    pub fn new(child: tokio::process::Child) -> Self {
        Self { child: Some(child) }
    }

    /// The guarded child, or `None` once disarmed.
    pub fn child_mut(&mut self) -> Option<&mut tokio::process::Child> {
        self.child.as_mut()
    }

    pub fn disarm(&mut self) {
        self.child = None;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                #[allow(clippy::cast_possible_wrap)]
                let pgid = pid as i32;
                // SAFETY: killpg only sends a signal; the pid came from a child we spawned.
                unsafe {
                    if libc::killpg(pgid, libc::SIGKILL) == -1 {
                        let _ = child.start_kill();
                    }
                }
            }
            let _ = child.try_wait();
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
            let _ = child.try_wait();
        }
    }
}

/// Put the child process in its own session (Unix only) so the entire process
/// group can be killed via `killpg` in `ChildGuard::drop`.
#[cfg(unix)]
pub fn set_new_session(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    // SAFETY: the closure only calls async-signal-safe libc functions.
    unsafe {
        cmd.as_std_mut().pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            // Linux-only: the child dies with us instead of lingering on the remote link.
            #[cfg(target_os = "linux")]
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("process timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

/// Output of a finished subprocess. Streams are capped at the byte limit
/// passed to [`run_captured`]; bytes past the cap are drained and dropped,
/// and the matching `*_truncated` flag is set.
#[derive(Debug, Default)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

/// Spawn `command`, feed it `stdin`, and collect its output.
///
/// The child runs in its own session and is killed (with its process group)
/// if `timeout` elapses or the returned future is dropped.
pub async fn run_captured(
    mut command: Command,
    stdin: Option<&[u8]>,
    max_bytes: usize,
    timeout: Duration,
) -> Result<CapturedOutput, ProcessError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    set_new_session(&mut command);

    let child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    let mut guard = ChildGuard::new(child);

    let run = async {
        let Some(child) = guard.child_mut() else {
            return Err(ProcessError::Io(std::io::Error::other("child already reaped")));
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(read_capped(stdout, max_bytes));
        let stderr_task = tokio::spawn(read_capped(stderr, max_bytes));

        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // A child that exits without reading stdin closes the pipe early;
            // its exit status reports the real failure.
            if let Err(e) = pipe.write_all(bytes).await {
                tracing::debug!(program = %program, "stdin write failed: {e}");
            }
            drop(pipe);
        }

        let status = child.wait().await?;
        let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
        let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();
        Ok(CapturedOutput {
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
            code: status.code(),
        })
    };

    let output = match tokio::time::timeout(timeout, run).await {
        Ok(result) => result?,
        Err(_) => return Err(ProcessError::TimedOut(timeout)),
    };
    guard.disarm();
    Ok(output)
}

/// Read a stream to the end, keeping at most `max_collect` bytes. The flag
/// reports whether anything past the cap was dropped.
async fn read_capped<R: AsyncRead + Unpin + Send + 'static>(
    reader: Option<R>,
    max_collect: usize,
) -> (Vec<u8>, bool) {
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };
    let mut buf = [0u8; 4096];
    let mut collected = Vec::new();
    let mut truncated = false;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let take = max_collect.saturating_sub(collected.len()).min(n);
        collected.extend_from_slice(&buf[..take]);
        if take < n {
            truncated = true;
        }
    }
    (collected, truncated)
}
